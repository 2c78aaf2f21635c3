// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Volume lifecycle: plan, create, start, grow, shrink, replace, destroy.
//!
//! Every operation here returns a boolean outcome for the test body to
//! assert on. Failures are logged with the failing verb's stderr; nothing
//! in this module panics or propagates an error upward, because teardown
//! has to be able to call into it unconditionally.

use crate::{
    topology::{self, Plan},
    wait,
};
use gft_config::{Config, Inventory};
use gft_gluster::{brick, fsops, volume as vol, RemoteExec};
use gft_wire_types::{BrickRef, VolState, Volume, VolumeSpec};
use std::time::Duration;

/// Plan bricks, create and start the volume, and wait until every brick
/// and daemon is online. On any failure the partially created state is
/// removed so the next test starts clean.
pub async fn setup_volume(
    exec: &dyn RemoteExec,
    config: &Config,
    inv: &mut Inventory,
    volname: &str,
    spec: &VolumeSpec,
    force: bool,
) -> Option<Volume> {
    let plan = match topology::plan(spec, &config.servers, inv) {
        Ok(x) => x,
        Err(e) => {
            tracing::error!(%volname, error = %e, free = inv.total_free(), "brick planning failed");

            return None;
        }
    };

    for w in &plan.warnings {
        tracing::warn!(%volname, "{}", w);
    }

    let arbiters = topology::arbiter_bricks(spec, &plan.subvols);

    if !arbiters.is_empty() {
        tracing::info!(%volname, ?arbiters, "arbiter bricks placed");
    }

    match try_setup(exec, config, volname, spec, &plan, force).await {
        Ok(v) => {
            tracing::info!(%volname, bricks = v.bricks.len(), "volume up");

            Some(v)
        }
        Err(step) => {
            tracing::error!(%volname, %step, "setup failed; removing partial state");

            let partial = Volume {
                name: volname.to_string(),
                spec: spec.clone(),
                bricks: plan.bricks.clone(),
                subvols: plan.subvols.clone(),
                state: VolState::Created,
            };

            cleanup_volume(exec, config, inv, &partial).await;

            None
        }
    }
}

async fn try_setup(
    exec: &dyn RemoteExec,
    config: &Config,
    volname: &str,
    spec: &VolumeSpec,
    plan: &Plan,
    force: bool,
) -> Result<Volume, String> {
    let mnode = config.mnode();

    let out = vol::volume_create(exec, mnode, volname, spec, &plan.bricks, force)
        .await
        .map_err(|e| format!("volume create: {}", e))?;

    if !out.success() {
        return Err(format!("volume create rc {}: {}", out.rc, out.stderr_excerpt(200)));
    }

    if !spec.options.is_empty() {
        let out = vol::set_volume_options(exec, mnode, volname, &spec.options)
            .await
            .map_err(|e| format!("volume set: {}", e))?;

        if !out.success() {
            return Err(format!("volume set rc {}: {}", out.rc, out.stderr_excerpt(200)));
        }
    }

    let out = vol::volume_start(exec, mnode, volname, false)
        .await
        .map_err(|e| format!("volume start: {}", e))?;

    if !out.success() {
        return Err(format!("volume start rc {}: {}", out.rc, out.stderr_excerpt(200)));
    }

    let budget = Duration::from_secs(config.timeouts.processes_online);

    if !wait::wait_for_volume_processes_online(exec, mnode, volname, budget).await {
        return Err("volume processes did not come online".to_string());
    }

    Ok(Volume {
        name: volname.to_string(),
        spec: spec.clone(),
        bricks: plan.bricks.clone(),
        subvols: plan.subvols.clone(),
        state: VolState::Started,
    })
}

/// Stop, delete, and wipe a volume, then hand its brick paths back to the
/// inventory. Idempotent: a missing volume is a success, and every step is
/// attempted regardless of earlier failures.
pub async fn cleanup_volume(
    exec: &dyn RemoteExec,
    config: &Config,
    inv: &mut Inventory,
    volume: &Volume,
) -> bool {
    let mnode = config.mnode();
    let mut clean = true;

    match vol::volume_exists(exec, mnode, &volume.name).await {
        Ok(true) => {
            // A never-started volume refuses "stop"; the rc is irrelevant.
            match vol::volume_stop(exec, mnode, &volume.name, true).await {
                Ok(out) if !out.success() => {
                    tracing::debug!(volname = %volume.name, rc = out.rc, "volume stop refused");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(volname = %volume.name, error = %e, "volume stop transport failure");

                    clean = false;
                }
            }

            match vol::volume_delete(exec, mnode, &volume.name).await {
                Ok(out) if out.success() => {}
                Ok(out) => {
                    tracing::warn!(
                        volname = %volume.name,
                        stderr = %out.stderr_excerpt(200),
                        "volume delete failed"
                    );

                    clean = false;
                }
                Err(e) => {
                    tracing::warn!(volname = %volume.name, error = %e, "volume delete transport failure");

                    clean = false;
                }
            }
        }
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(volname = %volume.name, error = %e, "volume info transport failure");

            clean = false;
        }
    }

    if !wipe_bricks(exec, &volume.bricks).await {
        clean = false;
    }

    inv.release_bricks(&volume.bricks);

    clean
}

/// `rm -rf` every brick directory on its host. Returns false when any wipe
/// failed, but keeps going.
pub async fn wipe_bricks(exec: &dyn RemoteExec, bricks: &[BrickRef]) -> bool {
    let mut clean = true;

    for b in bricks {
        match fsops::rm_rf(exec, &b.host, &b.path).await {
            Ok(out) if out.success() => {}
            Ok(out) => {
                tracing::warn!(brick = %b, stderr = %out.stderr_excerpt(200), "brick wipe failed");

                clean = false;
            }
            Err(e) => {
                tracing::warn!(brick = %b, error = %e, "brick wipe transport failure");

                clean = false;
            }
        }
    }

    clean
}

/// Add `stripes` distribute stripes (usually one) and wait for the new
/// bricks to come online. Rebalance is the caller's decision.
pub async fn expand_volume(
    exec: &dyn RemoteExec,
    config: &Config,
    inv: &mut Inventory,
    volume: &mut Volume,
    stripes: usize,
    force: bool,
) -> bool {
    let mnode = config.mnode();

    let plan = match topology::expand_plan(&volume.spec, &config.servers, inv, stripes) {
        Ok(x) => x,
        Err(e) => {
            tracing::error!(volname = %volume.name, error = %e, free = inv.total_free(), "expansion planning failed");

            return false;
        }
    };

    let out = match brick::add_brick(exec, mnode, &volume.name, &plan.bricks, None, force).await {
        Ok(x) => x,
        Err(e) => {
            tracing::error!(volname = %volume.name, error = %e, "add-brick transport failure");
            inv.release_bricks(&plan.bricks);

            return false;
        }
    };

    if !out.success() {
        tracing::error!(
            volname = %volume.name,
            stderr = %out.stderr_excerpt(200),
            "add-brick failed"
        );
        inv.release_bricks(&plan.bricks);

        return false;
    }

    // From here the bricks belong to the volume; record them even if the
    // wait fails so cleanup wipes them.
    volume.bricks.extend(plan.bricks.iter().cloned());
    volume.subvols.extend(plan.subvols.iter().cloned());

    let budget = Duration::from_secs(config.timeouts.processes_online);

    wait::wait_for_bricks_online(exec, mnode, &volume.name, &plan.bricks, budget).await
}

/// Remove one distribute stripe: start, poll to completion, commit, wipe.
/// `subvol` overrides the default last-stripe selection.
pub async fn shrink_volume(
    exec: &dyn RemoteExec,
    config: &Config,
    inv: &mut Inventory,
    volume: &mut Volume,
    subvol: Option<usize>,
) -> bool {
    let mnode = config.mnode();

    let (idx, stripe) = match topology::shrink_selection(&volume.subvols, subvol) {
        Some(x) => x,
        None => {
            tracing::error!(volname = %volume.name, ?subvol, "no stripe to remove");

            return false;
        }
    };

    let replica = if volume.spec.is_replicated() {
        Some(volume.spec.replica_count)
    } else {
        None
    };

    let out = match brick::remove_brick(
        exec,
        mnode,
        &volume.name,
        &stripe,
        replica,
        brick::RemoveBrickOp::Start,
    )
    .await
    {
        Ok(x) => x,
        Err(e) => {
            tracing::error!(volname = %volume.name, error = %e, "remove-brick start transport failure");

            return false;
        }
    };

    if !out.success() {
        tracing::error!(
            volname = %volume.name,
            stderr = %out.stderr_excerpt(200),
            "remove-brick start failed"
        );

        return false;
    }

    let budget = Duration::from_secs(config.timeouts.rebalance);

    if !wait::wait_for_remove_brick_complete(exec, mnode, &volume.name, &stripe, budget).await {
        tracing::error!(volname = %volume.name, "remove-brick did not complete");

        return false;
    }

    let out = match brick::remove_brick(
        exec,
        mnode,
        &volume.name,
        &stripe,
        replica,
        brick::RemoveBrickOp::Commit,
    )
    .await
    {
        Ok(x) => x,
        Err(e) => {
            tracing::error!(volname = %volume.name, error = %e, "remove-brick commit transport failure");

            return false;
        }
    };

    if !out.success() {
        tracing::error!(
            volname = %volume.name,
            stderr = %out.stderr_excerpt(200),
            "remove-brick commit failed"
        );

        return false;
    }

    let clean = wipe_bricks(exec, &stripe).await;

    inv.release_bricks(&stripe);
    volume.subvols.remove(idx);
    volume.bricks.retain(|b| !stripe.contains(b));

    clean
}

/// Swap a brick for a fresh path, preferring the same server so the
/// replica layout keeps its fault isolation, then wait for heal.
pub async fn replace_brick(
    exec: &dyn RemoteExec,
    config: &Config,
    inv: &mut Inventory,
    volume: &mut Volume,
    src: &BrickRef,
) -> bool {
    let mnode = config.mnode();

    let dst = match replacement_for(config, inv, src) {
        Some(x) => x,
        None => {
            tracing::error!(brick = %src, "no free path for a replacement brick");

            return false;
        }
    };

    let out = match brick::replace_brick_commit_force(exec, mnode, &volume.name, src, &dst).await {
        Ok(x) => x,
        Err(e) => {
            tracing::error!(volname = %volume.name, error = %e, "replace-brick transport failure");
            inv.release_bricks(std::slice::from_ref(&dst));

            return false;
        }
    };

    if !out.success() {
        tracing::error!(
            volname = %volume.name,
            stderr = %out.stderr_excerpt(200),
            "replace-brick failed"
        );
        inv.release_bricks(std::slice::from_ref(&dst));

        return false;
    }

    for b in volume.bricks.iter_mut().filter(|b| **b == *src) {
        *b = dst.clone();
    }

    for sv in volume.subvols.iter_mut() {
        for b in sv.iter_mut().filter(|b| **b == *src) {
            *b = dst.clone();
        }
    }

    let healed = if volume.spec.is_replicated() {
        let budget = Duration::from_secs(config.timeouts.heal);

        wait::monitor_heal_completion(exec, mnode, &volume.name, budget).await
    } else {
        true
    };

    let wiped = wipe_bricks(exec, std::slice::from_ref(src)).await;

    inv.release_bricks(std::slice::from_ref(src));

    healed && wiped
}

fn replacement_for(config: &Config, inv: &mut Inventory, src: &BrickRef) -> Option<BrickRef> {
    if let Ok(path) = inv.brick_path_for(&src.host) {
        return Some(BrickRef::new(&src.host, path));
    }

    config
        .servers
        .iter()
        .find_map(|s| inv.brick_path_for(s).ok().map(|p| BrickRef::new(s, p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExec;
    use gft_wire_types::VolumeType;

    fn config() -> Config {
        toml::from_str(
            r#"
servers = ["s0", "s1"]
clients = ["c0"]

[servers_info.s0]
bricks_root = "/bricks"
brick_slots = 4

[servers_info.s1]
bricks_root = "/bricks"
brick_slots = 4
"#,
        )
        .unwrap()
    }

    fn dist2() -> VolumeSpec {
        let mut s = VolumeSpec::new(VolumeType::Distributed);
        s.dist_count = 2;
        s
    }

    #[tokio::test]
    async fn setup_places_an_arbiter_volume_and_brings_it_online() {
        let c: Config = toml::from_str(
            r#"
servers = ["s0", "s1", "s2"]
clients = ["c0"]

[servers_info.s0]
bricks_root = "/bricks"
brick_slots = 4

[servers_info.s1]
bricks_root = "/bricks"
brick_slots = 4

[servers_info.s2]
bricks_root = "/bricks"
brick_slots = 4
"#,
        )
        .unwrap();
        let mut inv = Inventory::new(&c);
        let before = inv.total_free();

        let status_xml = r#"<?xml version="1.0"?>
<cliOutput>
  <opRet>0</opRet>
  <volStatus><volumes><volume>
    <volName>v</volName>
    <node><hostname>s0</hostname><path>/bricks/brick0</path><status>1</status><port>49152</port><pid>100</pid></node>
    <node><hostname>s1</hostname><path>/bricks/brick0</path><status>1</status><port>49152</port><pid>101</pid></node>
    <node><hostname>s2</hostname><path>/bricks/brick0</path><status>1</status><port>49152</port><pid>102</pid></node>
    <node><hostname>Self-heal Daemon</hostname><path>s0</path><status>1</status><port>N/A</port><pid>200</pid></node>
    <node><hostname>Self-heal Daemon</hostname><path>s1</path><status>1</status><port>N/A</port><pid>201</pid></node>
    <node><hostname>Self-heal Daemon</hostname><path>s2</path><status>1</status><port>N/A</port><pid>202</pid></node>
  </volume></volumes></volStatus>
</cliOutput>"#;

        let exec = MockExec::ok().rule("volume status v --xml", 0, status_xml, "");

        let mut spec = VolumeSpec::new(VolumeType::Arbiter);
        spec.replica_count = 3;
        spec.arbiter_count = 1;

        let v = setup_volume(&exec, &c, &mut inv, "v", &spec, false)
            .await
            .unwrap();

        assert_eq!(v.state, VolState::Started);
        assert_eq!(
            v.bricks,
            vec![
                BrickRef::new("s0", "/bricks/brick0"),
                BrickRef::new("s1", "/bricks/brick0"),
                BrickRef::new("s2", "/bricks/brick0"),
            ]
        );
        assert_eq!(
            topology::arbiter_bricks(&spec, &v.subvols),
            vec![BrickRef::new("s2", "/bricks/brick0")]
        );
        assert_eq!(inv.total_free(), before - 3);

        let calls = exec.commands();
        assert!(calls.iter().any(|x| x.contains(
            "volume create v replica 3 arbiter 1 \
             s0:/bricks/brick0 s1:/bricks/brick0 s2:/bricks/brick0"
        )));
    }

    #[tokio::test]
    async fn cleanup_is_idempotent_and_restores_inventory() {
        let c = config();
        let mut inv = Inventory::new(&c);
        let before = inv.total_free();

        // A cluster that has already forgotten the volume.
        let exec = MockExec::ok().rule("volume info", 1, "", "Volume v does not exist");

        let plan = topology::plan(&dist2(), &c.servers, &mut inv).unwrap();
        let v = Volume {
            name: "v".into(),
            spec: dist2(),
            bricks: plan.bricks,
            subvols: plan.subvols,
            state: VolState::Started,
        };

        assert_eq!(inv.total_free(), before - 2);

        assert!(cleanup_volume(&exec, &c, &mut inv, &v).await);
        assert_eq!(inv.total_free(), before);

        assert!(cleanup_volume(&exec, &c, &mut inv, &v).await);
        assert_eq!(inv.total_free(), before);
    }

    #[tokio::test]
    async fn cleanup_stops_and_deletes_an_existing_volume() {
        let c = config();
        let mut inv = Inventory::new(&c);

        let exec = MockExec::ok();

        let plan = topology::plan(&dist2(), &c.servers, &mut inv).unwrap();
        let v = Volume {
            name: "v".into(),
            spec: dist2(),
            bricks: plan.bricks,
            subvols: plan.subvols,
            state: VolState::Started,
        };

        assert!(cleanup_volume(&exec, &c, &mut inv, &v).await);

        let calls = exec.commands();

        assert!(calls.iter().any(|c| c.contains("volume stop v force")));
        assert!(calls.iter().any(|c| c.contains("volume delete v")));
        assert!(calls.iter().any(|c| c.contains("rm -rf /bricks/brick0")));
    }

    #[tokio::test]
    async fn failed_delete_reports_dirty_but_still_releases() {
        let c = config();
        let mut inv = Inventory::new(&c);
        let before = inv.total_free();

        let exec = MockExec::ok().rule("volume delete", 1, "", "volume delete: v: failed");

        let plan = topology::plan(&dist2(), &c.servers, &mut inv).unwrap();
        let v = Volume {
            name: "v".into(),
            spec: dist2(),
            bricks: plan.bricks,
            subvols: plan.subvols,
            state: VolState::Started,
        };

        assert!(!cleanup_volume(&exec, &c, &mut inv, &v).await);
        assert_eq!(inv.total_free(), before);
    }

    #[test]
    fn replacement_prefers_the_same_server() {
        let c = config();
        let mut inv = Inventory::new(&c);

        let src = BrickRef::new("s1", "/bricks/brick0");
        let dst = replacement_for(&c, &mut inv, &src).unwrap();

        assert_eq!(dst.host, "s1");

        // Exhaust s1; the fallback goes to any server with a free path.
        while inv.brick_path_for("s1").is_ok() {}

        let dst = replacement_for(&c, &mut inv, &src).unwrap();
        assert_eq!(dst.host, "s0");
    }
}
