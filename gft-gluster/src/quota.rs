// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Quota verbs and the parsed `quota list` view.

use crate::{gluster, gluster_xml, xml::XmlNode, CmdOutput, RemoteExec, SshError};
use gft_wire_types::{QuotaLimit, QuotaList};

pub async fn quota_enable(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume quota {} enable", volname)).await
}

pub async fn quota_disable(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume quota {} disable", volname)).await
}

/// Set a usage limit on `path` (absolute, relative to the volume root).
/// `limit` is the CLI spelling, e.g. `100MB`.
pub async fn quota_limit_usage(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    path: &str,
    limit: &str,
) -> Result<CmdOutput, SshError> {
    gluster(
        exec,
        mnode,
        &format!("volume quota {} limit-usage {} {}", volname, path, limit),
    )
    .await
}

pub async fn quota_remove(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    path: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume quota {} remove {}", volname, path)).await
}

/// Seconds before a soft-limit crossing is re-checked. 0 makes enforcement
/// immediate, which the quota scenarios rely on.
pub async fn quota_soft_timeout(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    seconds: u64,
) -> Result<CmdOutput, SshError> {
    gluster(
        exec,
        mnode,
        &format!("volume quota {} soft-timeout {}", volname, seconds),
    )
    .await
}

pub async fn quota_hard_timeout(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    seconds: u64,
) -> Result<CmdOutput, SshError> {
    gluster(
        exec,
        mnode,
        &format!("volume quota {} hard-timeout {}", volname, seconds),
    )
    .await
}

fn yes_no(s: Option<&str>) -> Option<bool> {
    match s? {
        "Yes" => Some(true),
        "No" => Some(false),
        _ => None,
    }
}

fn limit_from_node(node: &XmlNode) -> Option<(String, QuotaLimit)> {
    let path = node.text_of("path")?.to_string();

    // soft_limit_percent prints as "80%".
    let soft: u8 = node
        .text_of("soft_limit_percent")?
        .trim_end_matches('%')
        .parse()
        .ok()?;

    let limit = QuotaLimit {
        hard_limit: node.parse_of("hard_limit")?,
        soft_limit_pct: soft,
        used: node.parse_of("used_space")?,
        available: node.parse_of("avail_space")?,
        sl_exceeded: yes_no(node.text_of("sl_exceeded"))?,
        hl_exceeded: yes_no(node.text_of("hl_exceeded"))?,
    };

    Some((path, limit))
}

/// Parse a `volQuota` document.
pub fn parse_quota_list(root: &XmlNode) -> Option<QuotaList> {
    let quota = root.child("volQuota")?;

    quota
        .children_named("limit")
        .map(|l| limit_from_node(l))
        .collect()
}

/// Parsed `volume quota <vol> list --xml`, keyed by path.
pub async fn get_quota_list(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<Option<QuotaList>, SshError> {
    let root = gluster_xml(exec, mnode, &format!("volume quota {} list", volname)).await?;

    Ok(root.as_ref().and_then(parse_quota_list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_cli_output;

    static QUOTA_LIST_FIXTURE: &str = include_str!("fixtures/quota_list.xml");

    #[test]
    fn parses_quota_list() {
        let root = parse_cli_output(QUOTA_LIST_FIXTURE).unwrap();
        let list = parse_quota_list(&root).unwrap();

        assert_eq!(list.len(), 2);

        let root_limit = &list["/"];
        assert_eq!(root_limit.hard_limit, 104857600);
        assert_eq!(root_limit.soft_limit_pct, 80);
        assert_eq!(root_limit.used, 104857600);
        assert_eq!(root_limit.available, 0);
        assert!(root_limit.sl_exceeded);
        assert!(root_limit.hl_exceeded);

        let dir_limit = &list["/dir1"];
        assert_eq!(dir_limit.used, 1048576);
        assert!(!dir_limit.hl_exceeded);
    }

    #[test]
    fn unknown_flag_text_fails_the_parse() {
        let doc = QUOTA_LIST_FIXTURE.replace("<hl_exceeded>Yes</hl_exceeded>", "<hl_exceeded>Maybe</hl_exceeded>");
        let root = parse_cli_output(&doc).unwrap();

        assert!(parse_quota_list(&root).is_none());
    }
}
