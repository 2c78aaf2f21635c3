// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Volume verbs: create through delete, option handling, and the parsed
//! `volume info` / `volume status` views.

use crate::{gluster, gluster_xml, xml::XmlNode, CmdOutput, RemoteExec, SshError};
use gft_wire_types::{
    BrickRef, BrickStatus, DaemonKind, DaemonStatus, TaskStatus, Transport, VolState, VolumeInfo,
    VolumeSpec, VolumeStatus, VolumeType,
};
use std::collections::BTreeMap;

/// `volume create` with the count/transport flags a [`VolumeSpec`] implies.
///
/// Brick order is preserved exactly; the CLI derives subvolume membership
/// from it.
pub async fn volume_create(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    spec: &VolumeSpec,
    bricks: &[BrickRef],
    force: bool,
) -> Result<CmdOutput, SshError> {
    let mut args = format!("volume create {}", volname);

    if spec.is_replicated() {
        args.push_str(&format!(" replica {}", spec.replica_count));

        if spec.is_arbiter() && spec.arbiter_count > 0 {
            args.push_str(&format!(" arbiter {}", spec.arbiter_count));
        }
    } else if spec.is_dispersed() {
        args.push_str(&format!(
            " disperse {} redundancy {}",
            spec.disperse_count, spec.redundancy_count
        ));
    }

    if spec.transport != Transport::Tcp {
        args.push_str(&format!(" transport {}", spec.transport));
    }

    for b in bricks {
        args.push_str(&format!(" {}", b));
    }

    if force {
        args.push_str(" force");
    }

    gluster(exec, mnode, &args).await
}

pub async fn volume_start(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    force: bool,
) -> Result<CmdOutput, SshError> {
    let force = if force { " force" } else { "" };

    gluster(exec, mnode, &format!("volume start {}{}", volname, force)).await
}

pub async fn volume_stop(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    force: bool,
) -> Result<CmdOutput, SshError> {
    let force = if force { " force" } else { "" };

    gluster(exec, mnode, &format!("volume stop {}{}", volname, force)).await
}

pub async fn volume_delete(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume delete {}", volname)).await
}

/// `volume reset`, optionally for a single option.
pub async fn volume_reset(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    option: Option<&str>,
    force: bool,
) -> Result<CmdOutput, SshError> {
    let mut args = format!("volume reset {}", volname);

    if let Some(o) = option {
        args.push_str(&format!(" {}", o));
    }

    if force {
        args.push_str(" force");
    }

    gluster(exec, mnode, &args).await
}

/// Set a single option. `volname` may be `all`.
pub async fn set_volume_option(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    key: &str,
    value: &str,
) -> Result<CmdOutput, SshError> {
    gluster(
        exec,
        mnode,
        &format!("volume set {} {} {}", volname, key, value),
    )
    .await
}

/// Apply a map of options, stopping at the first verb failure and
/// returning its output (success output otherwise).
pub async fn set_volume_options(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    options: &BTreeMap<String, String>,
) -> Result<CmdOutput, SshError> {
    let mut last = CmdOutput {
        rc: 0,
        stdout: String::new(),
        stderr: String::new(),
    };

    for (k, v) in options {
        last = set_volume_option(exec, mnode, volname, k, v).await?;

        if !last.success() {
            tracing::warn!(%volname, key = %k, stderr = %last.stderr, "volume set failed");

            return Ok(last);
        }
    }

    Ok(last)
}

/// `volume get <vol> <key>`; returns the value column of the single-key
/// form, or `None` on failure.
pub async fn get_volume_option(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    key: &str,
) -> Result<Option<String>, SshError> {
    let out = gluster(exec, mnode, &format!("volume get {} {}", volname, key)).await?;

    if !out.success() {
        return Ok(None);
    }

    Ok(extract_get_value(&out.stdout, key))
}

// Output:
//   Option                  Value
//   ------                  -----
//   cluster.server-quorum-ratio   51
fn extract_get_value(stdout: &str, key: &str) -> Option<String> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .skip(2)
        .filter_map(|l| {
            let mut cols = l.split_whitespace();
            let opt = cols.next()?;
            let val = cols.collect::<Vec<_>>().join(" ");

            if opt == key && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
        .next()
}

pub async fn volume_list(
    exec: &dyn RemoteExec,
    mnode: &str,
) -> Result<Option<Vec<String>>, SshError> {
    let out = gluster(exec, mnode, "volume list").await?;

    if !out.success() {
        return Ok(None);
    }

    Ok(Some(
        out.stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && *l != "No volumes present in cluster")
            .collect(),
    ))
}

fn type_from_node(node: &XmlNode) -> Option<VolumeType> {
    let type_str = node.text_of("typeStr")?;
    let arbiter: usize = node.parse_of("arbiterCount").unwrap_or(0);

    let base: VolumeType = type_str.parse().ok()?;

    // The CLI reports arbiter volumes as plain replicate; the arbiter count
    // is the tell.
    let t = match (base, arbiter > 0) {
        (VolumeType::Replicated, true) => VolumeType::Arbiter,
        (VolumeType::DistributedReplicated, true) => VolumeType::DistributedArbiter,
        (x, _) => x,
    };

    Some(t)
}

fn volume_info_from_node(node: &XmlNode) -> Option<VolumeInfo> {
    let bricks = node
        .child("bricks")?
        .children_named("brick")
        .map(|b| {
            // Old CLIs put the ref in the element text, newer ones in a
            // nested <name>. Tolerate both.
            let s = b
                .text_of("name")
                .filter(|x| !x.is_empty())
                .unwrap_or_else(|| b.text.trim());

            s.parse::<BrickRef>().ok()
        })
        .collect::<Option<Vec<_>>>()?;

    let options = node
        .child("options")
        .map(|opts| {
            opts.children_named("option")
                .filter_map(|o| {
                    Some((
                        o.text_of("name")?.to_string(),
                        o.text_of("value")?.to_string(),
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    Some(VolumeInfo {
        name: node.text_of("name")?.to_string(),
        id: node.text_of("id")?.to_string(),
        vol_type: type_from_node(node)?,
        status: node.text_of("statusStr")?.parse().ok()?,
        brick_count: node.parse_of("brickCount")?,
        dist_count: node.parse_of("distCount")?,
        replica_count: node.parse_of("replicaCount")?,
        arbiter_count: node.parse_of("arbiterCount").unwrap_or(0),
        disperse_count: node.parse_of("disperseCount").unwrap_or(0),
        redundancy_count: node.parse_of("redundancyCount").unwrap_or(0),
        transport: node.text_of("transport")?.parse().ok()?,
        bricks,
        options,
    })
}

/// Parse a `volInfo` document into per-volume views, keyed by name.
pub fn parse_volume_info(root: &XmlNode) -> Option<BTreeMap<String, VolumeInfo>> {
    let volumes = root.descend(&["volInfo", "volumes"])?;

    volumes
        .children_named("volume")
        .map(|v| Some((v.text_of("name")?.to_string(), volume_info_from_node(v)?)))
        .collect()
}

/// Parsed `volume info <vol> --xml` for one volume.
pub async fn get_volume_info(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<Option<VolumeInfo>, SshError> {
    let root = gluster_xml(exec, mnode, &format!("volume info {}", volname)).await?;

    Ok(root
        .as_ref()
        .and_then(parse_volume_info)
        .and_then(|mut m| m.remove(volname)))
}

/// Parsed `volume info --xml` for every volume.
pub async fn get_all_volume_info(
    exec: &dyn RemoteExec,
    mnode: &str,
) -> Result<Option<BTreeMap<String, VolumeInfo>>, SshError> {
    let root = gluster_xml(exec, mnode, "volume info").await?;

    Ok(root.as_ref().and_then(parse_volume_info))
}

fn opt_number<T: std::str::FromStr>(node: &XmlNode, name: &str) -> Option<T> {
    // Daemon rows print "N/A" where bricks have ports, and pid -1 when the
    // process is down.
    let t = node.text_of(name)?;

    if t == "N/A" || t == "-1" {
        None
    } else {
        t.parse().ok()
    }
}

fn status_rows_from_node(volume: &XmlNode) -> Option<(Vec<BrickStatus>, Vec<DaemonStatus>)> {
    let mut bricks = vec![];
    let mut daemons = vec![];

    for node in volume.children_named("node") {
        let hostname = node.text_of("hostname")?;
        let path = node.text_of("path")?;
        let online = node.parse_of::<u8>("status")? == 1;
        let pid = opt_number::<u32>(node, "pid").filter(|_| online);

        if let Some(kind) = DaemonKind::from_cli_label(hostname) {
            // For daemon rows the CLI abuses the path column for the host.
            daemons.push(DaemonStatus {
                kind,
                host: path.to_string(),
                online,
                pid,
            });
        } else {
            bricks.push(BrickStatus {
                brick: BrickRef::new(hostname, path),
                online,
                port: opt_number(node, "port"),
                pid,
            });
        }
    }

    Some((bricks, daemons))
}

fn tasks_from_node(volume: &XmlNode) -> Vec<TaskStatus> {
    volume
        .child("tasks")
        .map(|tasks| {
            tasks
                .children_named("task")
                .filter_map(|t| {
                    Some(TaskStatus {
                        kind: t.text_of("type")?.to_string(),
                        id: t.text_of("id")?.to_string(),
                        status: t
                            .text_of("statusStr")
                            .or_else(|| t.text_of("status"))?
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a `volStatus` document for one volume.
pub fn parse_volume_status(root: &XmlNode, volname: &str) -> Option<VolumeStatus> {
    let volumes = root.descend(&["volStatus", "volumes"])?;

    let volume = volumes
        .children_named("volume")
        .find(|v| v.text_of("volName") == Some(volname))?;

    let (bricks, daemons) = status_rows_from_node(volume)?;

    Some(VolumeStatus {
        name: volname.to_string(),
        bricks,
        daemons,
        tasks: tasks_from_node(volume),
    })
}

/// Parsed `volume status <vol> --xml`.
pub async fn get_volume_status(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<Option<VolumeStatus>, SshError> {
    let root = gluster_xml(exec, mnode, &format!("volume status {}", volname)).await?;

    Ok(root.as_ref().and_then(|r| parse_volume_status(r, volname)))
}

/// Parsed `volume status <vol> tasks --xml`; only the task rows.
pub async fn get_volume_tasks(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<Option<Vec<TaskStatus>>, SshError> {
    let root = gluster_xml(exec, mnode, &format!("volume status {} tasks", volname)).await?;

    let tasks = root.as_ref().and_then(|r| {
        let volumes = r.descend(&["volStatus", "volumes"])?;
        let volume = volumes
            .children_named("volume")
            .find(|v| v.text_of("volName") == Some(volname))?;

        Some(tasks_from_node(volume))
    });

    Ok(tasks)
}

/// Does the cluster know this volume at all?
pub async fn volume_exists(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<bool, SshError> {
    let out = gluster(exec, mnode, &format!("volume info {}", volname)).await?;

    Ok(out.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_cli_output;

    static VOLUME_INFO_FIXTURE: &str = include_str!("fixtures/volume_info.xml");
    static VOLUME_STATUS_FIXTURE: &str = include_str!("fixtures/volume_status.xml");

    #[test]
    fn parses_volume_info() {
        let root = parse_cli_output(VOLUME_INFO_FIXTURE).unwrap();
        let infos = parse_volume_info(&root).unwrap();

        let v = &infos["testvol"];

        assert_eq!(v.vol_type, VolumeType::DistributedReplicated);
        assert_eq!(v.status, VolState::Started);
        assert_eq!(v.brick_count, 6);
        assert_eq!(v.dist_count, 2);
        assert_eq!(v.replica_count, 3);
        assert_eq!(v.transport, Transport::Tcp);
        assert_eq!(v.bricks.len(), 6);
        assert_eq!(v.bricks[0], "server0:/bricks/brick0".parse().unwrap());
        assert_eq!(v.options["performance.readdir-ahead"], "on");
    }

    #[test]
    fn arbiter_count_refines_the_type() {
        let doc = VOLUME_INFO_FIXTURE.replace(
            "<arbiterCount>0</arbiterCount>",
            "<arbiterCount>1</arbiterCount>",
        );

        let root = parse_cli_output(&doc).unwrap();
        let infos = parse_volume_info(&root).unwrap();

        assert_eq!(infos["testvol"].vol_type, VolumeType::DistributedArbiter);
    }

    #[test]
    fn parses_volume_status_bricks_daemons_tasks() {
        let root = parse_cli_output(VOLUME_STATUS_FIXTURE).unwrap();
        let status = parse_volume_status(&root, "testvol").unwrap();

        assert_eq!(status.bricks.len(), 2);

        let b0 = &status.bricks[0];
        assert!(b0.online);
        assert_eq!(b0.port, Some(49152));
        assert_eq!(b0.pid, Some(14432));

        let b1 = &status.bricks[1];
        assert!(!b1.online);
        assert_eq!(b1.port, None);
        assert_eq!(b1.pid, None);

        let shd: Vec<_> = status.daemons_of(DaemonKind::SelfHeal).collect();
        assert_eq!(shd.len(), 2);
        assert!(shd.iter().all(|d| d.online));
        assert_eq!(shd[0].host, "localhost");

        assert_eq!(status.tasks.len(), 1);
        assert_eq!(status.tasks[0].kind, "Rebalance");
        assert_eq!(status.tasks[0].status, "completed");

        assert!(!status.all_bricks_online());
    }

    #[test]
    fn status_for_unknown_volume_is_none() {
        let root = parse_cli_output(VOLUME_STATUS_FIXTURE).unwrap();

        assert!(parse_volume_status(&root, "othervol").is_none());
    }

    #[tokio::test]
    async fn create_command_shapes() {
        // Command strings only; no executor involved.
        let mut spec = VolumeSpec::new(VolumeType::DistributedReplicated);
        spec.dist_count = 2;
        spec.replica_count = 3;

        let bricks: Vec<BrickRef> = vec![
            "s0:/b0".parse().unwrap(),
            "s1:/b0".parse().unwrap(),
        ];

        // Reuse the arg building through a capturing mock.
        struct Capture(std::sync::Mutex<String>);

        #[async_trait::async_trait]
        impl crate::RemoteExec for Capture {
            async fn run(&self, _: &str, cmd: &str) -> Result<CmdOutput, SshError> {
                *self.0.lock().unwrap() = cmd.to_string();

                Ok(CmdOutput {
                    rc: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
            async fn run_as(&self, h: &str, _: &str, cmd: &str) -> Result<CmdOutput, SshError> {
                self.run(h, cmd).await
            }
            async fn spawn(
                &self,
                _: &str,
                _: &str,
            ) -> Result<gft_ssh::RemoteProcess, SshError> {
                unimplemented!()
            }
            async fn push_file(
                &self,
                _: &str,
                _: &std::path::Path,
                _: &std::path::Path,
            ) -> Result<(), SshError> {
                unimplemented!()
            }
        }

        let cap = Capture(std::sync::Mutex::new(String::new()));

        volume_create(&cap, "s0", "v", &spec, &bricks, true)
            .await
            .unwrap();

        assert_eq!(
            *cap.0.lock().unwrap(),
            "gluster --mode=script volume create v replica 3 s0:/b0 s1:/b0 force"
        );

        let mut spec = VolumeSpec::new(VolumeType::Dispersed);
        spec.disperse_count = 6;
        spec.redundancy_count = 2;

        volume_create(&cap, "s0", "v", &spec, &bricks, false)
            .await
            .unwrap();

        assert_eq!(
            *cap.0.lock().unwrap(),
            "gluster --mode=script volume create v disperse 6 redundancy 2 s0:/b0 s1:/b0"
        );
    }

    #[test]
    fn volume_get_value_extraction() {
        let stdout = "\
Option                                   Value
------                                   -----
features.uss                             off
";
        assert_eq!(
            extract_get_value(stdout, "features.uss").as_deref(),
            Some("off")
        );
        assert_eq!(extract_get_value(stdout, "features.quota"), None);
        assert_eq!(extract_get_value("", "features.uss"), None);
    }
}
