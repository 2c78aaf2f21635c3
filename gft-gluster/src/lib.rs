// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Adapter layer over the `gluster` admin CLI.
//!
//! Two shapes appear throughout:
//!
//! - *Verb wrappers* return the raw [`CmdOutput`] triple untouched. A
//!   non-zero rc is never converted to `Err`; negative tests assert on it.
//! - *Parsed accessors* run the verb with `--xml`, parse the `<cliOutput>`
//!   document and return `Ok(Some(view))`, or `Ok(None)` when the rc was
//!   non-zero or the structure was not recognizable. They never return a
//!   partially populated view.
//!
//! `Err` at this boundary always means the transport failed, not the verb.

pub mod brick;
pub mod fsops;
pub mod heal;
pub mod mount;
pub mod peer;
pub mod proc;
pub mod profile;
pub mod quota;
pub mod rebalance;
pub mod snapshot;
pub mod volume;
pub mod xml;

pub use gft_cmd::CmdOutput;
pub use gft_ssh::{RemoteExec, SshError};

use xml::XmlNode;

/// Build the admin CLI invocation. `--mode=script` suppresses the
/// interactive y/n prompts of destructive verbs.
pub(crate) fn gluster_cmd(args: &str) -> String {
    format!("gluster --mode=script {}", args)
}

/// Run an admin verb on the management node, returning the raw triple.
pub async fn gluster(
    exec: &dyn RemoteExec,
    mnode: &str,
    args: &str,
) -> Result<CmdOutput, SshError> {
    let cmd = gluster_cmd(args);

    tracing::debug!(%mnode, %cmd, "gluster verb");

    exec.run(mnode, &cmd).await
}

/// Run an admin verb with `--xml` and hand back the parsed `<cliOutput>`
/// root, or `None` when the verb failed or the output was not XML.
pub(crate) async fn gluster_xml(
    exec: &dyn RemoteExec,
    mnode: &str,
    args: &str,
) -> Result<Option<XmlNode>, SshError> {
    let out = gluster(exec, mnode, &format!("{} --xml", args)).await?;

    if !out.success() {
        tracing::debug!(%args, rc = out.rc, "xml verb failed");

        return Ok(None);
    }

    Ok(xml::parse_cli_output(&out.stdout))
}
