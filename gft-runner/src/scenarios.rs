// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! The registered end-to-end scenarios. Each body asserts through
//! `StepFailure` values that carry the failing verb; the runtime turns
//! them into the structured report.

use futures::{future::BoxFuture, FutureExt};
use gft_config::Inventory;
use gft_gluster::{
    brick, fsops, heal, quota, rebalance, snapshot, volume as vol, CmdOutput, RemoteExec,
};
use gft_harness::{
    io::{self, IoProfile},
    mount as hmount,
    runtime::{StepFailure, StepResult},
    volume as hvol, wait, Scenario, TestCase,
};
use gft_wire_types::{MountType, VolState, VolumeSpec, VolumeType};
use std::{sync::Arc, time::Duration};

pub fn all() -> Vec<Scenario> {
    vec![
        Scenario {
            id: "create-start-info",
            volume_types: vec![VolumeType::Distributed],
            mount_types: vec![MountType::Fuse],
            spec: None,
            skip_setup: false,
            body: create_start_info,
        },
        Scenario {
            id: "expand-rebalance",
            volume_types: vec![VolumeType::Distributed],
            mount_types: vec![MountType::Fuse],
            spec: None,
            skip_setup: false,
            body: expand_rebalance,
        },
        Scenario {
            id: "replicated-heal",
            volume_types: vec![VolumeType::Replicated],
            mount_types: vec![MountType::Fuse],
            spec: None,
            skip_setup: false,
            body: replicated_heal,
        },
        Scenario {
            id: "parallel-rebalance",
            volume_types: vec![VolumeType::Distributed],
            mount_types: vec![MountType::Fuse],
            spec: Some(dist3),
            skip_setup: false,
            body: parallel_rebalance,
        },
        Scenario {
            id: "snapshot-limit",
            volume_types: vec![VolumeType::Replicated],
            mount_types: vec![MountType::Fuse],
            spec: None,
            skip_setup: false,
            body: snapshot_limit,
        },
        Scenario {
            id: "quota-hard-limit",
            volume_types: vec![VolumeType::Distributed],
            mount_types: vec![MountType::Fuse],
            spec: None,
            skip_setup: false,
            body: quota_hard_limit,
        },
    ]
}

fn dist3(_: VolumeType) -> VolumeSpec {
    let mut s = VolumeSpec::new(VolumeType::Distributed);
    s.dist_count = 3;

    s
}

fn check(step: &str, cmd: String, out: CmdOutput) -> StepResult {
    if out.success() {
        Ok(())
    } else {
        Err(StepFailure::from_output(step, cmd, &out))
    }
}

/// A freshly created and started volume reports its declared topology.
fn create_start_info<'a>(
    case: &'a mut TestCase,
    _inv: &'a mut Inventory,
) -> BoxFuture<'a, StepResult> {
    async move {
        let exec = Arc::clone(&case.exec);
        let exec: &dyn RemoteExec = &*exec;
        let config = Arc::clone(&case.config);
        let mnode = config.mnode();

        let info = vol::get_volume_info(exec, mnode, &case.volname)
            .await
            .map_err(|e| StepFailure::msg("volume info", e))?
            .ok_or_else(|| StepFailure::msg("volume info", "no parsable view"))?;

        if info.vol_type != case.spec.vol_type {
            return Err(StepFailure::msg(
                "volume info",
                format!("type {} but declared {}", info.vol_type, case.spec.vol_type),
            ));
        }

        if info.brick_count != case.spec.brick_count() {
            return Err(StepFailure::msg(
                "volume info",
                format!(
                    "brick count {} but planned {}",
                    info.brick_count,
                    case.spec.brick_count()
                ),
            ));
        }

        if info.status != VolState::Started {
            return Err(StepFailure::msg(
                "volume info",
                format!("state {} after start", info.status),
            ));
        }

        Ok(())
    }
    .boxed()
}

/// Grow by one stripe, rebalance, and verify the new brick count.
fn expand_rebalance<'a>(
    case: &'a mut TestCase,
    inv: &'a mut Inventory,
) -> BoxFuture<'a, StepResult> {
    async move {
        let exec = Arc::clone(&case.exec);
        let exec: &dyn RemoteExec = &*exec;
        let config = Arc::clone(&case.config);
        let mnode = config.mnode();
        let volname = case.volname.clone();

        let mut v = case
            .volume
            .take()
            .ok_or_else(|| StepFailure::msg("expand", "no volume from setup"))?;
        let before = v.bricks.len();

        let grew = hvol::expand_volume(exec, &config, inv, &mut v, 1, false).await;
        case.volume = Some(v);

        if !grew {
            return Err(StepFailure::msg("expand", "add-brick or online wait failed"));
        }

        check(
            "rebalance start",
            format!("gluster volume rebalance {} start", volname),
            rebalance::rebalance_start(exec, mnode, &volname, rebalance::RebalanceMode::Plain)
                .await
                .map_err(|e| StepFailure::msg("rebalance start", e))?,
        )?;

        let budget = Duration::from_secs(config.timeouts.rebalance);

        if !wait::wait_for_rebalance_to_complete(exec, mnode, &volname, budget).await {
            return Err(StepFailure::msg("rebalance", "did not complete in budget"));
        }

        let info = vol::get_volume_info(exec, mnode, &volname)
            .await
            .map_err(|e| StepFailure::msg("volume info", e))?
            .ok_or_else(|| StepFailure::msg("volume info", "no parsable view"))?;

        let expected = before + case.spec.subvol_width();

        if info.brick_count != expected {
            return Err(StepFailure::msg(
                "volume info",
                format!("brick count {} after expand, expected {}", info.brick_count, expected),
            ));
        }

        Ok(())
    }
    .boxed()
}

/// Kill a brick, write through the mount, restart, and watch heal drain.
fn replicated_heal<'a>(
    case: &'a mut TestCase,
    _inv: &'a mut Inventory,
) -> BoxFuture<'a, StepResult> {
    async move {
        let exec = Arc::clone(&case.exec);
        let exec: &dyn RemoteExec = &*exec;
        let config = Arc::clone(&case.config);
        let mnode = config.mnode();
        let volname = case.volname.clone();

        let target = case
            .volume
            .as_ref()
            .and_then(|v| v.bricks.get(1).cloned())
            .ok_or_else(|| StepFailure::msg("kill brick", "no brick to take offline"))?;

        let killed = brick::kill_brick(exec, mnode, &volname, &target)
            .await
            .map_err(|e| StepFailure::msg("kill brick", e))?;

        if !killed {
            return Err(StepFailure::msg("kill brick", format!("{} had no pid", target)));
        }

        let offline = wait::wait_for_bricks_offline(
            exec,
            mnode,
            &volname,
            std::slice::from_ref(&target),
            Duration::from_secs(60),
        )
        .await;

        if !offline {
            return Err(StepFailure::msg("kill brick", "brick never showed offline"));
        }

        let m = case
            .mounted
            .get(0)
            .cloned()
            .ok_or_else(|| StepFailure::msg("client write", "nothing mounted"))?;
        let file = format!("{}/healfile", m.mpoint);

        check(
            "client write",
            format!("dd on {}", m.client),
            fsops::dd(exec, &m.client, &file, "1M", 1)
                .await
                .map_err(|e| StepFailure::msg("client write", e))?,
        )?;

        check(
            "volume start force",
            format!("gluster volume start {} force", volname),
            vol::volume_start(exec, mnode, &volname, true)
                .await
                .map_err(|e| StepFailure::msg("volume start force", e))?,
        )?;

        let online = wait::wait_for_bricks_online(
            exec,
            mnode,
            &volname,
            std::slice::from_ref(&target),
            Duration::from_secs(config.timeouts.processes_online),
        )
        .await;

        if !online {
            return Err(StepFailure::msg("restart", "brick never came back online"));
        }

        let healed = wait::monitor_heal_completion(
            exec,
            mnode,
            &volname,
            Duration::from_secs(config.timeouts.heal),
        )
        .await;

        if !healed {
            return Err(StepFailure::msg("heal", "did not complete in budget"));
        }

        let info = heal::get_heal_info(exec, mnode, &volname)
            .await
            .map_err(|e| StepFailure::msg("heal info", e))?
            .ok_or_else(|| StepFailure::msg("heal info", "no parsable view"))?;

        if info.bricks.len() != case.spec.replica_count || !info.is_complete() {
            return Err(StepFailure::msg(
                "heal info",
                format!("{} entries still pending", info.total_entries()),
            ));
        }

        Ok(())
    }
    .boxed()
}

/// Two distributed volumes, concurrent I/O, rebalance both; contents must
/// be byte-identical before and after.
fn parallel_rebalance<'a>(
    case: &'a mut TestCase,
    inv: &'a mut Inventory,
) -> BoxFuture<'a, StepResult> {
    async move {
        let exec = Arc::clone(&case.exec);
        let exec: &dyn RemoteExec = &*exec;
        let config = Arc::clone(&case.config);
        let mnode = config.mnode();
        let volname_a = case.volname.clone();
        let volname_b = format!("{}-b", case.volname);
        let spec = case.spec.clone();

        let vb = hvol::setup_volume(exec, &config, inv, &volname_b, &spec, false)
            .await
            .ok_or_else(|| StepFailure::msg("second volume", "setup failed"))?;

        case.ctx.extra_volumes.push(vb);

        let mounts_b = inv
            .mounts_for(&volname_b, MountType::Fuse, mnode)
            .map_err(|e| StepFailure::msg("second volume", e))?;

        let (mounted_b, ok) = hmount::mount_volumes(exec, &config, &mounts_b).await;

        case.ctx.extra_mounts.extend(mounted_b.iter().cloned());

        if !ok {
            return Err(StepFailure::msg("second volume", "mount failed"));
        }

        if !io::upload_io_script(exec, &config.clients).await {
            return Err(StepFailure::msg("io", "script upload failed"));
        }

        let profile = IoProfile::default();
        let mut handles = io::run_io(exec, &case.mounted, &profile)
            .await
            .map_err(|e| StepFailure::msg("io", e))?;

        handles.extend(
            io::run_io(exec, &mounted_b, &profile)
                .await
                .map_err(|e| StepFailure::msg("io", e))?,
        );

        if !io::validate_io_procs(handles).await {
            return Err(StepFailure::msg("io", "a writer exited non-zero"));
        }

        let before_a = io::collect_mounts_arequal(exec, &case.mounted, None)
            .await
            .map_err(|e| StepFailure::msg("arequal", e))?
            .ok_or_else(|| StepFailure::msg("arequal", "checksum failed"))?;
        let before_b = io::collect_mounts_arequal(exec, &mounted_b, None)
            .await
            .map_err(|e| StepFailure::msg("arequal", e))?
            .ok_or_else(|| StepFailure::msg("arequal", "checksum failed"))?;

        for volname in [&volname_a, &volname_b].iter() {
            check(
                "rebalance start",
                format!("gluster volume rebalance {} start", volname),
                rebalance::rebalance_start(exec, mnode, volname, rebalance::RebalanceMode::Plain)
                    .await
                    .map_err(|e| StepFailure::msg("rebalance start", e))?,
            )?;
        }

        let budget = Duration::from_secs(config.timeouts.rebalance);

        for volname in [&volname_a, &volname_b].iter() {
            if !wait::wait_for_rebalance_to_complete(exec, mnode, volname, budget).await {
                return Err(StepFailure::msg(
                    "rebalance",
                    format!("{} did not complete in budget", volname),
                ));
            }
        }

        let after_a = io::collect_mounts_arequal(exec, &case.mounted, None)
            .await
            .map_err(|e| StepFailure::msg("arequal", e))?
            .ok_or_else(|| StepFailure::msg("arequal", "checksum failed"))?;
        let after_b = io::collect_mounts_arequal(exec, &mounted_b, None)
            .await
            .map_err(|e| StepFailure::msg("arequal", e))?
            .ok_or_else(|| StepFailure::msg("arequal", "checksum failed"))?;

        if before_a != after_a || before_b != after_b {
            return Err(StepFailure::msg("arequal", "contents changed across rebalance"));
        }

        Ok(())
    }
    .boxed()
}

/// The snapshot hard limit is enforced at exactly the configured count.
fn snapshot_limit<'a>(
    case: &'a mut TestCase,
    _inv: &'a mut Inventory,
) -> BoxFuture<'a, StepResult> {
    async move {
        let exec = Arc::clone(&case.exec);
        let exec: &dyn RemoteExec = &*exec;
        let config = Arc::clone(&case.config);
        let mnode = config.mnode();
        let volname = case.volname.clone();

        check(
            "snapshot config",
            format!("gluster snapshot config {} snap-max-hard-limit 256", volname),
            snapshot::snap_config_set(exec, mnode, &volname, "snap-max-hard-limit", "256")
                .await
                .map_err(|e| StepFailure::msg("snapshot config", e))?,
        )?;

        let effective = snapshot::get_snap_config_value(exec, mnode, &volname, "snap-max-hard-limit")
            .await
            .map_err(|e| StepFailure::msg("snapshot config", e))?;

        if effective != Some(256) {
            return Err(StepFailure::msg(
                "snapshot config",
                format!("effective limit {:?}, set 256", effective),
            ));
        }

        case.ctx.created_snapshots = true;

        for i in 0..256 {
            let name = format!("s-{}", i);

            check(
                "snapshot create",
                format!("gluster snapshot create {} {}", name, volname),
                snapshot::snap_create(exec, mnode, &volname, &name, None)
                    .await
                    .map_err(|e| StepFailure::msg("snapshot create", e))?,
            )?;
        }

        let out = snapshot::snap_create(exec, mnode, &volname, "s-256", None)
            .await
            .map_err(|e| StepFailure::msg("snapshot over limit", e))?;

        if out.success() {
            return Err(StepFailure::msg(
                "snapshot over limit",
                "creation past the hard limit succeeded",
            ));
        }

        let snaps = snapshot::get_snap_list(exec, mnode, Some(&volname))
            .await
            .map_err(|e| StepFailure::msg("snapshot list", e))?
            .ok_or_else(|| StepFailure::msg("snapshot list", "listing failed"))?;

        if snaps.len() != 256 {
            return Err(StepFailure::msg(
                "snapshot list",
                format!("{} snapshots listed, expected 256", snaps.len()),
            ));
        }

        Ok(())
    }
    .boxed()
}

const MB: u64 = 1024 * 1024;

/// Writes past a 100 MB quota are refused and accounting stays put.
fn quota_hard_limit<'a>(
    case: &'a mut TestCase,
    _inv: &'a mut Inventory,
) -> BoxFuture<'a, StepResult> {
    async move {
        let exec = Arc::clone(&case.exec);
        let exec: &dyn RemoteExec = &*exec;
        let config = Arc::clone(&case.config);
        let mnode = config.mnode();
        let volname = case.volname.clone();

        let m = case
            .mounted
            .get(0)
            .cloned()
            .ok_or_else(|| StepFailure::msg("quota", "nothing mounted"))?;

        // The volume has to fit the writes with room to spare, or the test
        // measures disk exhaustion instead of quota enforcement.
        let avail_kb = io::get_size_of_mountpoint(exec, &m.client, &m.mpoint)
            .await
            .map_err(|e| StepFailure::msg("free space", e))?
            .ok_or_else(|| StepFailure::msg("free space", "df failed"))?;

        if avail_kb * 1024 < 150 * MB {
            return Err(StepFailure::msg(
                "free space",
                format!("{} KB free, need headroom beyond the 100 MB limit", avail_kb),
            ));
        }

        check(
            "quota enable",
            format!("gluster volume quota {} enable", volname),
            quota::quota_enable(exec, mnode, &volname)
                .await
                .map_err(|e| StepFailure::msg("quota enable", e))?,
        )?;

        check(
            "quota hard-timeout",
            format!("gluster volume quota {} hard-timeout 0", volname),
            quota::quota_hard_timeout(exec, mnode, &volname, 0)
                .await
                .map_err(|e| StepFailure::msg("quota hard-timeout", e))?,
        )?;

        check(
            "quota soft-timeout",
            format!("gluster volume quota {} soft-timeout 0", volname),
            quota::quota_soft_timeout(exec, mnode, &volname, 0)
                .await
                .map_err(|e| StepFailure::msg("quota soft-timeout", e))?,
        )?;

        check(
            "quota limit",
            format!("gluster volume quota {} limit-usage / 100MB", volname),
            quota::quota_limit_usage(exec, mnode, &volname, "/", "100MB")
                .await
                .map_err(|e| StepFailure::msg("quota limit", e))?,
        )?;

        for i in 0..100 {
            let file = format!("{}/quota_file{}", m.mpoint, i);

            check(
                "fill to the limit",
                format!("dd 1 MB to {}", file),
                fsops::dd(exec, &m.client, &file, "1M", 1)
                    .await
                    .map_err(|e| StepFailure::msg("fill to the limit", e))?,
            )?;
        }

        let list = quota::get_quota_list(exec, mnode, &volname)
            .await
            .map_err(|e| StepFailure::msg("quota list", e))?
            .ok_or_else(|| StepFailure::msg("quota list", "no parsable view"))?;

        let root = list
            .get("/")
            .ok_or_else(|| StepFailure::msg("quota list", "no entry for /"))?;

        if !root.hl_exceeded {
            return Err(StepFailure::msg("quota list", "hard limit not flagged"));
        }

        if root.used < 99 * MB {
            return Err(StepFailure::msg(
                "quota list",
                format!("{} bytes accounted, wrote 100 MB", root.used),
            ));
        }

        let used_at_limit = root.used;

        let out = fsops::dd(exec, &m.client, &format!("{}/quota_file100", m.mpoint), "1M", 1)
            .await
            .map_err(|e| StepFailure::msg("write over limit", e))?;

        if out.success() {
            return Err(StepFailure::msg(
                "write over limit",
                "write past the hard limit succeeded",
            ));
        }

        let list = quota::get_quota_list(exec, mnode, &volname)
            .await
            .map_err(|e| StepFailure::msg("quota list", e))?
            .ok_or_else(|| StepFailure::msg("quota list", "no parsable view"))?;

        let used_after = list
            .get("/")
            .ok_or_else(|| StepFailure::msg("quota list", "no entry for /"))?
            .used;

        // A refused write may still leave a partial block behind.
        if used_after > used_at_limit + 2 * MB {
            return Err(StepFailure::msg(
                "quota list",
                format!("usage moved {} -> {} past the limit", used_at_limit, used_after),
            ));
        }

        Ok(())
    }
    .boxed()
}
