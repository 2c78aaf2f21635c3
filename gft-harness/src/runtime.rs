// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! The test case runtime: parameter matrices, per-case setup/teardown, and
//! the suite loop with its structured reports.
//!
//! A scenario declares the volume and mount types it covers; the suite
//! instantiates it once per `(volume_type, mount_type)` pair in declared
//! order. The body communicates with teardown exclusively through
//! [`TestContext`]; teardown undoes everything the context names, logs its
//! own failures, and reports whether it left the cluster usable.

use crate::{io, mount, volume};
use futures::future::BoxFuture;
use gft_cmd::CmdOutput;
use gft_config::{Config, Inventory, InventoryError};
use gft_gluster::{peer, proc, snapshot, volume as vol, RemoteExec};
use gft_ssh::RemoteProcess;
use gft_wire_types::{BrickRef, MountDescriptor, MountType, Volume, VolumeSpec, VolumeType};
use std::{sync::Arc, time::Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TestParams {
    pub volume_type: VolumeType,
    pub mount_type: MountType,
}

/// The cartesian product in declared order: volume types outermost.
pub fn matrix(volume_types: &[VolumeType], mount_types: &[MountType]) -> Vec<TestParams> {
    volume_types
        .iter()
        .flat_map(|&volume_type| {
            mount_types.iter().map(move |&mount_type| TestParams {
                volume_type,
                mount_type,
            })
        })
        .collect()
}

/// A sensible spec for each topology when the scenario does not override
/// one. Counts match a three-server pool.
pub fn default_spec_for(vt: VolumeType) -> VolumeSpec {
    let mut s = VolumeSpec::new(vt);

    match vt {
        VolumeType::Distributed => {
            s.dist_count = 2;
        }
        VolumeType::Replicated => {
            s.replica_count = 3;
        }
        VolumeType::DistributedReplicated => {
            s.dist_count = 2;
            s.replica_count = 3;
        }
        VolumeType::Dispersed => {
            s.disperse_count = 6;
            s.redundancy_count = 2;
        }
        VolumeType::DistributedDispersed => {
            s.dist_count = 2;
            s.disperse_count = 6;
            s.redundancy_count = 2;
        }
        VolumeType::Arbiter => {
            s.replica_count = 3;
            s.arbiter_count = 1;
        }
        VolumeType::DistributedArbiter => {
            s.dist_count = 2;
            s.replica_count = 3;
            s.arbiter_count = 1;
        }
    }

    s
}

/// What a failing step leaves behind for the report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StepFailure {
    pub step: String,
    pub cmd: Option<String>,
    pub rc: Option<i32>,
    pub stderr: String,
}

impl StepFailure {
    pub fn msg(step: impl ToString, detail: impl ToString) -> Self {
        StepFailure {
            step: step.to_string(),
            cmd: None,
            rc: None,
            stderr: detail.to_string(),
        }
    }

    /// Capture the verb that failed together with its output.
    pub fn from_output(step: impl ToString, cmd: impl ToString, out: &CmdOutput) -> Self {
        StepFailure {
            step: step.to_string(),
            cmd: Some(cmd.to_string()),
            rc: Some(out.rc),
            stderr: out.stderr_excerpt(400),
        }
    }
}

pub type StepResult = Result<(), StepFailure>;

/// Everything a test body starts that teardown must undo. The body fills
/// these in as it goes; nothing else reads them.
#[derive(Default)]
pub struct TestContext {
    /// In-flight I/O handles, drained before unmount.
    pub io_procs: Vec<RemoteProcess>,
    /// Bricks added outside the volume lifecycle; wiped and released.
    pub extra_bricks: Vec<BrickRef>,
    /// Set when the body created snapshots of the main volume.
    pub created_snapshots: bool,
    /// Option keys set on the main volume beyond its spec.
    pub modified_options: Vec<String>,
    /// Option keys set cluster-wide (`volume set all`).
    pub cluster_options: Vec<String>,
    /// Set when the body detached peers; teardown re-probes the pool.
    pub detached_peers: bool,
    /// Additional volumes the body created through the lifecycle.
    pub extra_volumes: Vec<Volume>,
    /// Mounts of extra volumes.
    pub extra_mounts: Vec<MountDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TeardownOutcome {
    Clean,
    /// Something survived teardown; later runs may trip over it.
    Dirty,
}

/// One instantiation of a scenario against concrete parameters.
pub struct TestCase {
    pub exec: Arc<dyn RemoteExec>,
    pub config: Arc<Config>,
    pub params: TestParams,
    pub volname: String,
    pub spec: VolumeSpec,
    /// Planned mounts, one per client.
    pub mounts: Vec<MountDescriptor>,
    /// The main volume once setup has run.
    pub volume: Option<Volume>,
    /// What actually mounted; teardown unmounts exactly this.
    pub mounted: Vec<MountDescriptor>,
    pub ctx: TestContext,
}

impl TestCase {
    pub fn new(
        exec: Arc<dyn RemoteExec>,
        config: Arc<Config>,
        test_id: &str,
        params: TestParams,
        spec: VolumeSpec,
        inv: &Inventory,
    ) -> Result<Self, InventoryError> {
        let volname = format!("{}-{}-{}", test_id, params.volume_type, params.mount_type);
        let mounts = inv.mounts_for(&volname, params.mount_type, config.mnode())?;

        Ok(TestCase {
            exec,
            config,
            params,
            volname,
            spec,
            mounts,
            volume: None,
            mounted: vec![],
            ctx: TestContext::default(),
        })
    }

    pub fn mnode(&self) -> &str {
        self.config.mnode()
    }

    /// Bring up the volume and mount it everywhere. False marks the case
    /// errored, not failed.
    pub async fn setup(&mut self, inv: &mut Inventory) -> bool {
        let vol = match volume::setup_volume(
            self.exec.as_ref(),
            &self.config,
            inv,
            &self.volname,
            &self.spec,
            false,
        )
        .await
        {
            Some(v) => v,
            None => return false,
        };

        self.volume = Some(vol);

        let (mounted, ok) =
            mount::mount_volumes(self.exec.as_ref(), &self.config, &self.mounts).await;

        self.mounted = mounted;

        ok
    }

    /// Undo everything: drain I/O, kill stragglers, unmount, destroy
    /// volumes, restore options and peers, release inventory. Every step
    /// runs regardless of earlier failures.
    pub async fn teardown(&mut self, inv: &mut Inventory) -> TeardownOutcome {
        let exec = Arc::clone(&self.exec);
        let exec = exec.as_ref();
        let mnode = self.config.mnode();
        let mut clean = true;

        let io_procs: Vec<_> = self.ctx.io_procs.drain(..).collect();

        if !io_procs.is_empty() {
            if !io::wait_for_io_to_complete(io_procs).await {
                clean = false;
            }

            // A wedged mount can leave the script running even after its
            // ssh client exited; make sure before unmounting.
            for client in &self.config.clients {
                let _ = proc::kill_process(exec, client, "file_dir_ops.sh").await;
            }
        }

        let mut to_unmount = std::mem::take(&mut self.mounted);
        to_unmount.extend(self.ctx.extra_mounts.drain(..));

        if !mount::unmount_volumes(exec, &to_unmount).await {
            clean = false;
        }

        if self.ctx.created_snapshots {
            match snapshot::snap_delete_by_volume(exec, mnode, &self.volname).await {
                Ok(out) if out.success() => {}
                Ok(out) => {
                    tracing::warn!(
                        volname = %self.volname,
                        stderr = %out.stderr_excerpt(200),
                        "snapshot cleanup failed"
                    );

                    clean = false;
                }
                Err(e) => {
                    tracing::warn!(volname = %self.volname, error = %e, "snapshot cleanup transport failure");

                    clean = false;
                }
            }
        }

        for key in self.ctx.modified_options.drain(..).collect::<Vec<_>>() {
            match vol::volume_reset(exec, mnode, &self.volname, Some(&key), false).await {
                Ok(out) if out.success() => {}
                Ok(out) => {
                    tracing::warn!(%key, rc = out.rc, "volume option reset failed");
                }
                Err(_) => {
                    clean = false;
                }
            }
        }

        for key in self.ctx.cluster_options.drain(..).collect::<Vec<_>>() {
            match vol::volume_reset(exec, mnode, "all", Some(&key), false).await {
                Ok(_) => {}
                Err(_) => {
                    clean = false;
                }
            }
        }

        for v in self.ctx.extra_volumes.drain(..).collect::<Vec<_>>() {
            if !volume::cleanup_volume(exec, &self.config, inv, &v).await {
                clean = false;
            }
        }

        if let Some(v) = self.volume.take() {
            if !volume::cleanup_volume(exec, &self.config, inv, &v).await {
                clean = false;
            }
        }

        let extra_bricks: Vec<_> = self.ctx.extra_bricks.drain(..).collect();

        if !extra_bricks.is_empty() {
            if !volume::wipe_bricks(exec, &extra_bricks).await {
                clean = false;
            }

            inv.release_bricks(&extra_bricks);
        }

        if self.ctx.detached_peers {
            match peer::peer_probe_servers(exec, mnode, &self.config.servers).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::error!("peer pool not restored");

                    clean = false;
                }
                Err(e) => {
                    tracing::error!(error = %e, "peer restore transport failure");

                    clean = false;
                }
            }
        }

        if clean {
            TeardownOutcome::Clean
        } else {
            TeardownOutcome::Dirty
        }
    }
}

pub type ScenarioBody =
    for<'a> fn(&'a mut TestCase, &'a mut Inventory) -> BoxFuture<'a, StepResult>;

/// A registered end-to-end test.
pub struct Scenario {
    pub id: &'static str,
    pub volume_types: Vec<VolumeType>,
    pub mount_types: Vec<MountType>,
    /// Override the per-voltype default spec.
    pub spec: Option<fn(VolumeType) -> VolumeSpec>,
    /// Bodies that manage their own volumes (or test creation itself).
    pub skip_setup: bool,
    pub body: ScenarioBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
    /// Setup never completed; the body did not run.
    Errored,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TestReport {
    pub id: String,
    pub voltype: VolumeType,
    pub mount_type: MountType,
    pub outcome: TestOutcome,
    pub failed_step: Option<String>,
    pub last_cmd: Option<String>,
    pub rc: Option<i32>,
    pub stderr_excerpt: Option<String>,
    pub elapsed_secs: f64,
    pub teardown: TeardownOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SuiteOutcome {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub poisoned: bool,
}

impl SuiteOutcome {
    /// 0 all passed, 1 failures or errors, 2 teardown left the cluster
    /// in a state later runs cannot trust.
    pub fn exit_code(&self) -> i32 {
        if self.poisoned {
            2
        } else if self.failed + self.errored > 0 {
            1
        } else {
            0
        }
    }
}

/// Run every matching scenario across its parameter matrix.
pub async fn run_suite(
    exec: Arc<dyn RemoteExec>,
    config: Arc<Config>,
    scenarios: &[Scenario],
    filter: Option<&str>,
) -> (Vec<TestReport>, SuiteOutcome) {
    let mut inv = Inventory::new(&config);
    let mut reports = vec![];
    let mut outcome = SuiteOutcome {
        passed: 0,
        failed: 0,
        errored: 0,
        poisoned: false,
    };

    for sc in scenarios {
        if let Some(f) = filter {
            if !sc.id.contains(f) {
                continue;
            }
        }

        for params in matrix(&sc.volume_types, &sc.mount_types) {
            let started = Instant::now();
            let spec = sc
                .spec
                .map(|f| f(params.volume_type))
                .unwrap_or_else(|| default_spec_for(params.volume_type));

            tracing::info!(
                id = sc.id,
                voltype = %params.volume_type,
                mount = %params.mount_type,
                "running"
            );

            let mut case = match TestCase::new(
                Arc::clone(&exec),
                Arc::clone(&config),
                sc.id,
                params,
                spec,
                &inv,
            ) {
                Ok(x) => x,
                Err(e) => {
                    tracing::error!(id = sc.id, error = %e, "could not build the test case");

                    outcome.errored += 1;
                    reports.push(TestReport {
                        id: sc.id.to_string(),
                        voltype: params.volume_type,
                        mount_type: params.mount_type,
                        outcome: TestOutcome::Errored,
                        failed_step: Some("init".to_string()),
                        last_cmd: None,
                        rc: None,
                        stderr_excerpt: Some(e.to_string()),
                        elapsed_secs: started.elapsed().as_secs_f64(),
                        teardown: TeardownOutcome::Clean,
                    });

                    continue;
                }
            };

            let (test_outcome, failure) = if !sc.skip_setup && !case.setup(&mut inv).await {
                (
                    TestOutcome::Errored,
                    Some(StepFailure::msg("setup", "volume or mount setup failed")),
                )
            } else {
                match (sc.body)(&mut case, &mut inv).await {
                    Ok(()) => (TestOutcome::Passed, None),
                    Err(f) => (TestOutcome::Failed, Some(f)),
                }
            };

            let teardown = case.teardown(&mut inv).await;

            match test_outcome {
                TestOutcome::Passed => outcome.passed += 1,
                TestOutcome::Failed => outcome.failed += 1,
                TestOutcome::Errored => outcome.errored += 1,
            }

            if teardown == TeardownOutcome::Dirty {
                outcome.poisoned = true;
            }

            reports.push(TestReport {
                id: sc.id.to_string(),
                voltype: params.volume_type,
                mount_type: params.mount_type,
                outcome: test_outcome,
                failed_step: failure.as_ref().map(|f| f.step.clone()),
                last_cmd: failure.as_ref().and_then(|f| f.cmd.clone()),
                rc: failure.as_ref().and_then(|f| f.rc),
                stderr_excerpt: failure.map(|f| f.stderr),
                elapsed_secs: started.elapsed().as_secs_f64(),
                teardown,
            });
        }
    }

    (reports, outcome)
}
