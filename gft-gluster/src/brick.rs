// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Brick membership verbs: add, remove, replace, reset, and direct brick
//! process manipulation.

use crate::{gluster, gluster_xml, volume::get_volume_status, CmdOutput, RemoteExec, SshError};
use gft_wire_types::{BrickRef, RebalanceState};

fn brick_args(bricks: &[BrickRef]) -> String {
    bricks
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `add-brick`. `replica` is passed when the expansion changes (or must
/// restate) the replica count, e.g. growing a replica 2 to replica 3.
pub async fn add_brick(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    bricks: &[BrickRef],
    replica: Option<usize>,
    force: bool,
) -> Result<CmdOutput, SshError> {
    let mut args = format!("volume add-brick {}", volname);

    if let Some(r) = replica {
        args.push_str(&format!(" replica {}", r));
    }

    args.push_str(&format!(" {}", brick_args(bricks)));

    if force {
        args.push_str(" force");
    }

    gluster(exec, mnode, &args).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveBrickOp {
    Start,
    Stop,
    Commit,
    Force,
    Status,
}

impl RemoveBrickOp {
    fn token(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Commit => "commit",
            Self::Force => "force",
            Self::Status => "status",
        }
    }
}

pub async fn remove_brick(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    bricks: &[BrickRef],
    replica: Option<usize>,
    op: RemoveBrickOp,
) -> Result<CmdOutput, SshError> {
    let replica = replica
        .map(|r| format!(" replica {}", r))
        .unwrap_or_default();

    gluster(
        exec,
        mnode,
        &format!(
            "volume remove-brick {}{} {} {}",
            volname,
            replica,
            brick_args(bricks),
            op.token()
        ),
    )
    .await
}

/// Aggregate state of a running `remove-brick`, from
/// `remove-brick ... status --xml`. The document is the rebalance one.
pub async fn get_remove_brick_status(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    bricks: &[BrickRef],
) -> Result<Option<RebalanceState>, SshError> {
    let root = gluster_xml(
        exec,
        mnode,
        &format!(
            "volume remove-brick {} {} status",
            volname,
            brick_args(bricks)
        ),
    )
    .await?;

    let state = root.as_ref().and_then(|r| {
        let agg = r.descend(&["volRemoveBrick", "aggregate"])?;

        agg.text_of("statusStr")
            .or_else(|| agg.text_of("status"))?
            .parse()
            .ok()
    });

    Ok(state)
}

/// `replace-brick ... commit force`, the only replace form the CLI
/// still supports.
pub async fn replace_brick_commit_force(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    src: &BrickRef,
    dst: &BrickRef,
) -> Result<CmdOutput, SshError> {
    gluster(
        exec,
        mnode,
        &format!(
            "volume replace-brick {} {} {} commit force",
            volname, src, dst
        ),
    )
    .await
}

pub async fn reset_brick_start(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    brick: &BrickRef,
) -> Result<CmdOutput, SshError> {
    gluster(
        exec,
        mnode,
        &format!("volume reset-brick {} {} start", volname, brick),
    )
    .await
}

pub async fn reset_brick_commit(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    brick: &BrickRef,
    force: bool,
) -> Result<CmdOutput, SshError> {
    let force = if force { " force" } else { "" };

    gluster(
        exec,
        mnode,
        &format!(
            "volume reset-brick {} {} {} commit{}",
            volname, brick, brick, force
        ),
    )
    .await
}

/// Kill the brick process directly on its host. Used to simulate a brick
/// failure; `volume start force` brings it back.
pub async fn kill_brick(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    brick: &BrickRef,
) -> Result<bool, SshError> {
    let status = match get_volume_status(exec, mnode, volname).await? {
        Some(x) => x,
        None => return Ok(false),
    };

    let pid = match status.brick(brick).and_then(|b| b.pid) {
        Some(x) => x,
        None => {
            tracing::warn!(%brick, "no pid in volume status; already down?");

            return Ok(false);
        }
    };

    let out = exec
        .run(&brick.host, &format!("kill -9 {}", pid))
        .await?;

    Ok(out.success())
}

/// Every listed brick shows online with a pid.
pub async fn are_bricks_online(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    bricks: &[BrickRef],
) -> Result<bool, SshError> {
    let status = match get_volume_status(exec, mnode, volname).await? {
        Some(x) => x,
        None => return Ok(false),
    };

    let all = bricks.iter().all(|b| {
        status
            .brick(b)
            .map(|s| s.online && s.pid.is_some())
            .unwrap_or(false)
    });

    Ok(all)
}

/// Every listed brick shows offline. A brick missing from the status
/// output entirely does NOT count as offline; that is a parse/topology
/// problem the caller should see as `false`.
pub async fn are_bricks_offline(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    bricks: &[BrickRef],
) -> Result<bool, SshError> {
    let status = match get_volume_status(exec, mnode, volname).await? {
        Some(x) => x,
        None => return Ok(false),
    };

    let all = bricks
        .iter()
        .all(|b| status.brick(b).map(|s| !s.online).unwrap_or(false));

    Ok(all)
}
