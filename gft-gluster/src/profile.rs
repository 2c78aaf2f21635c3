// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! `volume profile` verbs. Output is asserted raw by the tests that use
//! profiling; no parsed view exists.

use crate::{gluster, CmdOutput, RemoteExec, SshError};

pub async fn profile_start(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume profile {} start", volname)).await
}

pub async fn profile_stop(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume profile {} stop", volname)).await
}

pub async fn profile_info(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume profile {} info", volname)).await
}
