// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Snapshot verbs, parsed snapshot views, and the external
//! `snap_scheduler.py` front-end.

use crate::{gluster, gluster_xml, xml::XmlNode, CmdOutput, RemoteExec, SshError};
use gft_wire_types::{SnapBrickStatus, SnapInfo, SnapStatus, SnapVolume};

/// `snapshot create <snap> <vol> [no-timestamp] [description ...]`.
///
/// `no-timestamp` keeps the snap name literal, which the harness needs to
/// address snaps it created.
pub async fn snap_create(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    snapname: &str,
    description: Option<&str>,
) -> Result<CmdOutput, SshError> {
    let mut args = format!("snapshot create {} {} no-timestamp", snapname, volname);

    if let Some(d) = description {
        args.push_str(&format!(" description \"{}\"", d));
    }

    gluster(exec, mnode, &args).await
}

pub async fn snap_activate(
    exec: &dyn RemoteExec,
    mnode: &str,
    snapname: &str,
    force: bool,
) -> Result<CmdOutput, SshError> {
    let force = if force { " force" } else { "" };

    gluster(exec, mnode, &format!("snapshot activate {}{}", snapname, force)).await
}

pub async fn snap_deactivate(
    exec: &dyn RemoteExec,
    mnode: &str,
    snapname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("snapshot deactivate {}", snapname)).await
}

pub async fn snap_delete(
    exec: &dyn RemoteExec,
    mnode: &str,
    snapname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("snapshot delete {}", snapname)).await
}

/// Delete every snapshot of one volume.
pub async fn snap_delete_by_volume(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("snapshot delete volume {}", volname)).await
}

pub async fn snap_delete_all(exec: &dyn RemoteExec, mnode: &str) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, "snapshot delete all").await
}

/// `snapshot restore`; the volume must be stopped first.
pub async fn snap_restore(
    exec: &dyn RemoteExec,
    mnode: &str,
    snapname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("snapshot restore {}", snapname)).await
}

pub async fn snap_clone(
    exec: &dyn RemoteExec,
    mnode: &str,
    clonename: &str,
    snapname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("snapshot clone {} {}", clonename, snapname)).await
}

/// Snapshot names, one per line of `snapshot list [vol]`.
pub async fn get_snap_list(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: Option<&str>,
) -> Result<Option<Vec<String>>, SshError> {
    let args = match volname {
        Some(v) => format!("snapshot list {}", v),
        None => "snapshot list".to_string(),
    };

    let out = gluster(exec, mnode, &args).await?;

    if !out.success() {
        return Ok(None);
    }

    Ok(Some(
        out.stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && *l != "No snapshots present")
            .collect(),
    ))
}

fn snap_info_from_node(node: &XmlNode) -> Option<SnapInfo> {
    let volumes = node
        .children_named("snapVolume")
        .filter_map(|v| {
            Some(SnapVolume {
                name: v.text_of("name")?.to_string(),
                origin_volume: v.descend(&["originVolume"])?.text_of("name")?.to_string(),
                status: v.text_of("status")?.to_string(),
            })
        })
        .collect::<Vec<_>>();

    if volumes.is_empty() {
        return None;
    }

    Some(SnapInfo {
        name: node.text_of("name")?.to_string(),
        uuid: node.text_of("uuid")?.to_string(),
        description: node
            .text_of("description")
            .filter(|d| !d.is_empty())
            .map(String::from),
        create_time: node.text_of("createTime")?.to_string(),
        volumes,
    })
}

/// Parse a `snapInfo` document.
pub fn parse_snap_info(root: &XmlNode) -> Option<Vec<SnapInfo>> {
    root.descend(&["snapInfo", "snapshots"])?
        .children_named("snapshot")
        .map(|s| snap_info_from_node(s))
        .collect()
}

/// Parsed `snapshot info [snapname] --xml`.
pub async fn get_snap_info(
    exec: &dyn RemoteExec,
    mnode: &str,
    snapname: Option<&str>,
) -> Result<Option<Vec<SnapInfo>>, SshError> {
    let args = match snapname {
        Some(s) => format!("snapshot info {}", s),
        None => "snapshot info".to_string(),
    };

    let root = gluster_xml(exec, mnode, &args).await?;

    Ok(root.as_ref().and_then(parse_snap_info))
}

fn snap_status_from_node(node: &XmlNode) -> Option<SnapStatus> {
    let name = node.text_of("name")?.to_string();

    let bricks = node
        .children_named("volume")
        .flat_map(|v| v.children_named("brick"))
        .filter_map(|b| {
            Some(SnapBrickStatus {
                path: b.text_of("path")?.to_string(),
                volume_group: b.text_of("volumeGroup").unwrap_or("N/A").to_string(),
                pid: b.parse_of("pid"),
            })
        })
        .collect();

    Some(SnapStatus { name, bricks })
}

/// Parse a `snapStatus` document.
pub fn parse_snap_status(root: &XmlNode) -> Option<Vec<SnapStatus>> {
    root.descend(&["snapStatus", "snapshots"])?
        .children_named("snapshot")
        .map(|s| snap_status_from_node(s))
        .collect()
}

/// Parsed `snapshot status --xml`.
pub async fn get_snap_status(
    exec: &dyn RemoteExec,
    mnode: &str,
) -> Result<Option<Vec<SnapStatus>>, SshError> {
    let root = gluster_xml(exec, mnode, "snapshot status").await?;

    Ok(root.as_ref().and_then(parse_snap_status))
}

/// `snapshot config` setters. `volname` may be `all` for cluster-wide
/// limits.
pub async fn snap_config_set(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    key: &str,
    value: &str,
) -> Result<CmdOutput, SshError> {
    gluster(
        exec,
        mnode,
        &format!("snapshot config {} {} {}", volname, key, value),
    )
    .await
}

/// Effective snap config values out of the line output, e.g.
/// `snap-max-hard-limit : 256`.
pub async fn get_snap_config_value(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    key: &str,
) -> Result<Option<u64>, SshError> {
    let out = gluster(exec, mnode, &format!("snapshot config {}", volname)).await?;

    if !out.success() {
        return Ok(None);
    }

    Ok(extract_config_value(&out.stdout, key))
}

fn extract_config_value(stdout: &str, key: &str) -> Option<u64> {
    stdout.lines().find_map(|l| {
        let mut parts = l.splitn(2, ':');
        let k = parts.next()?.trim();
        let v = parts.next()?.trim();

        if k == key {
            // Values can carry a unit suffix ("258 (256 in use)"); take the
            // leading integer.
            v.split_whitespace().next()?.parse().ok()
        } else {
            None
        }
    })
}

/// The snapshot scheduler is an external script, not a gluster verb.
pub async fn snap_scheduler(
    exec: &dyn RemoteExec,
    mnode: &str,
    args: &str,
) -> Result<CmdOutput, SshError> {
    exec.run(mnode, &format!("snap_scheduler.py {}", args)).await
}

pub async fn scheduler_init(exec: &dyn RemoteExec, mnode: &str) -> Result<CmdOutput, SshError> {
    snap_scheduler(exec, mnode, "init").await
}

pub async fn scheduler_enable(exec: &dyn RemoteExec, mnode: &str) -> Result<CmdOutput, SshError> {
    snap_scheduler(exec, mnode, "enable").await
}

pub async fn scheduler_disable(exec: &dyn RemoteExec, mnode: &str) -> Result<CmdOutput, SshError> {
    snap_scheduler(exec, mnode, "disable").await
}

pub async fn scheduler_status(exec: &dyn RemoteExec, mnode: &str) -> Result<CmdOutput, SshError> {
    snap_scheduler(exec, mnode, "status").await
}

pub async fn scheduler_list(exec: &dyn RemoteExec, mnode: &str) -> Result<CmdOutput, SshError> {
    snap_scheduler(exec, mnode, "list").await
}

/// Add a scheduled snapshot job. `schedule` is a cron expression.
pub async fn scheduler_add(
    exec: &dyn RemoteExec,
    mnode: &str,
    jobname: &str,
    schedule: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    snap_scheduler(
        exec,
        mnode,
        &format!("add \"{}\" \"{}\" {}", jobname, schedule, volname),
    )
    .await
}

pub async fn scheduler_edit(
    exec: &dyn RemoteExec,
    mnode: &str,
    jobname: &str,
    schedule: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    snap_scheduler(
        exec,
        mnode,
        &format!("edit \"{}\" \"{}\" {}", jobname, schedule, volname),
    )
    .await
}

pub async fn scheduler_delete(
    exec: &dyn RemoteExec,
    mnode: &str,
    jobname: &str,
) -> Result<CmdOutput, SshError> {
    snap_scheduler(exec, mnode, &format!("delete \"{}\"", jobname)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_cli_output;

    static SNAP_INFO_FIXTURE: &str = include_str!("fixtures/snap_info.xml");

    #[test]
    fn parses_snap_info() {
        let root = parse_cli_output(SNAP_INFO_FIXTURE).unwrap();
        let snaps = parse_snap_info(&root).unwrap();

        assert_eq!(snaps.len(), 2);

        let s0 = &snaps[0];
        assert_eq!(s0.name, "snap-0");
        assert_eq!(s0.description.as_deref(), Some("before upgrade"));
        assert_eq!(s0.volumes[0].origin_volume, "testvol");
        assert!(s0.is_activated());

        let s1 = &snaps[1];
        assert_eq!(s1.description, None);
        assert!(!s1.is_activated());
    }

    #[test]
    fn snap_config_value_extraction() {
        let stdout = "\
Snapshot System Configuration:
snap-max-hard-limit : 256
snap-max-soft-limit : 90%

Snapshot Volume Configuration:

Volume : testvol
snap-max-hard-limit : 256
Effective snap-max-hard-limit : 256
";

        assert_eq!(extract_config_value(stdout, "snap-max-hard-limit"), Some(256));
        assert_eq!(
            extract_config_value(stdout, "Effective snap-max-hard-limit"),
            Some(256)
        );
        assert_eq!(extract_config_value(stdout, "nonesuch"), None);
    }
}
