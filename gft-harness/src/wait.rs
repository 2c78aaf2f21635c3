// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Polling loops over cluster state. One primitive, many named waiters.
//!
//! Waiters never return an error: a transport failure during a poll is
//! logged and counts as "not there yet". State is re-fetched on every
//! iteration; nothing is cached across polls.

use gft_gluster::{brick, heal, peer, proc, rebalance, volume as vol, RemoteExec};
use gft_wire_types::{BrickRef, DaemonKind, RebalanceState, VolumeStatus};
use std::{collections::BTreeSet, future::Future, time::Duration};
use tokio::time::{sleep, Instant};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Poll `pred` every `interval` until it holds or `budget` runs out. The
/// predicate is always evaluated at least once.
pub async fn wait_until<F, Fut>(budget: Duration, interval: Duration, mut pred: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + budget;

    loop {
        if pred().await {
            return true;
        }

        if Instant::now() >= deadline {
            return false;
        }

        sleep(interval).await;
    }
}

pub async fn wait_for_peers_connected(
    exec: &dyn RemoteExec,
    mnode: &str,
    hosts: &[String],
    budget: Duration,
) -> bool {
    wait_until(budget, DEFAULT_INTERVAL, || async {
        peer::is_peer_connected(exec, mnode, hosts)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "peer status poll failed");

                false
            })
    })
    .await
}

/// Every brick online with a pid, every reported daemon online, and the
/// self-heal daemon count matching the number of hosting servers.
pub fn processes_online(status: &VolumeStatus) -> bool {
    if !status.all_bricks_online() {
        return false;
    }

    if status.daemons.iter().any(|d| !d.online || d.pid.is_none()) {
        return false;
    }

    let hosting: BTreeSet<&str> = status.bricks.iter().map(|b| b.brick.host.as_str()).collect();
    let shd = status.daemons_of(DaemonKind::SelfHeal).count();

    shd == 0 || shd == hosting.len()
}

pub async fn wait_for_volume_processes_online(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    budget: Duration,
) -> bool {
    wait_until(budget, DEFAULT_INTERVAL, || async {
        match vol::get_volume_status(exec, mnode, volname).await {
            Ok(Some(s)) => processes_online(&s),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(%volname, error = %e, "volume status poll failed");

                false
            }
        }
    })
    .await
}

pub async fn monitor_heal_completion(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    budget: Duration,
) -> bool {
    wait_until(budget, DEFAULT_INTERVAL, || async {
        heal::is_heal_complete(exec, mnode, volname)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(%volname, error = %e, "heal info poll failed");

                false
            })
    })
    .await
}

/// Poll rebalance status to "completed". A "failed" aggregate ends the wait
/// immediately with false; the budget only covers the in-progress case.
pub async fn wait_for_rebalance_to_complete(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    budget: Duration,
) -> bool {
    let deadline = Instant::now() + budget;

    loop {
        match rebalance::get_rebalance_status(exec, mnode, volname).await {
            Ok(Some(s)) if s.is_complete() => return true,
            Ok(Some(s)) if s.has_failed() => {
                tracing::error!(%volname, "rebalance failed");

                return false;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%volname, error = %e, "rebalance status poll failed");
            }
        }

        if Instant::now() >= deadline {
            return false;
        }

        sleep(DEFAULT_INTERVAL).await;
    }
}

/// Poll `remove-brick status` to completed, failing fast on "failed".
pub async fn wait_for_remove_brick_complete(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    bricks: &[BrickRef],
    budget: Duration,
) -> bool {
    let deadline = Instant::now() + budget;

    loop {
        match brick::get_remove_brick_status(exec, mnode, volname, bricks).await {
            Ok(Some(RebalanceState::Completed)) => return true,
            Ok(Some(RebalanceState::Failed)) => {
                tracing::error!(%volname, "remove-brick failed");

                return false;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%volname, error = %e, "remove-brick status poll failed");
            }
        }

        if Instant::now() >= deadline {
            return false;
        }

        sleep(DEFAULT_INTERVAL).await;
    }
}

pub async fn wait_for_bricks_online(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    bricks: &[BrickRef],
    budget: Duration,
) -> bool {
    wait_until(budget, DEFAULT_INTERVAL, || async {
        brick::are_bricks_online(exec, mnode, volname, bricks)
            .await
            .unwrap_or(false)
    })
    .await
}

pub async fn wait_for_bricks_offline(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    bricks: &[BrickRef],
    budget: Duration,
) -> bool {
    wait_until(budget, DEFAULT_INTERVAL, || async {
        brick::are_bricks_offline(exec, mnode, volname, bricks)
            .await
            .unwrap_or(false)
    })
    .await
}

/// `features.uss` on for the volume and its snapd alive as a process. The
/// option alone is not enough; snapd can die with the option still set.
pub async fn is_uss_enabled(exec: &dyn RemoteExec, mnode: &str, volname: &str) -> bool {
    let on = match vol::get_volume_option(exec, mnode, volname, "features.uss").await {
        Ok(Some(v)) => v == "on",
        Ok(None) => false,
        Err(e) => {
            tracing::warn!(%volname, error = %e, "volume get poll failed");

            false
        }
    };

    if !on {
        return false;
    }

    proc::is_daemon_process_running(exec, mnode, volname, DaemonKind::Snapd)
        .await
        .unwrap_or(false)
}

/// snapd reported online by the CLI and alive as an OS process.
pub async fn wait_for_snapd_running(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    budget: Duration,
) -> bool {
    wait_until(budget, DEFAULT_INTERVAL, || async {
        proc::is_daemon_process_running(exec, mnode, volname, DaemonKind::Snapd)
            .await
            .unwrap_or(false)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn returns_at_the_flip_never_before() {
        let calls = Cell::new(0u32);

        let ok = wait_until(Duration::from_secs(60), Duration::from_secs(2), || {
            calls.set(calls.get() + 1);
            let now = calls.get();

            async move { now >= 4 }
        })
        .await;

        assert!(ok);
        // Exactly the flip iteration, not an earlier or later one.
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_returns_false() {
        let calls = Cell::new(0u32);

        let ok = wait_until(Duration::from_secs(10), Duration::from_secs(2), || {
            calls.set(calls.get() + 1);

            async { false }
        })
        .await;

        assert!(!ok);
        // Evaluated at least once even for a zero-ish budget.
        assert!(calls.get() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_still_evaluates_once() {
        let ok = wait_until(Duration::from_secs(0), Duration::from_secs(2), || async {
            true
        })
        .await;

        assert!(ok);
    }

    #[tokio::test]
    async fn uss_needs_the_option_and_a_live_snapd() {
        use crate::mock::MockExec;

        let uss_on = "\
Option                                  Value
------                                  -----
features.uss                            on
";
        let status_xml = r#"<?xml version="1.0"?>
<cliOutput>
  <opRet>0</opRet>
  <volStatus><volumes><volume>
    <volName>v</volName>
    <node>
      <hostname>s0</hostname><path>/bricks/brick0</path>
      <status>1</status><port>49152</port><pid>100</pid>
    </node>
    <node>
      <hostname>Snapshot Daemon</hostname><path>s0</path>
      <status>1</status><port>N/A</port><pid>321</pid>
    </node>
  </volume></volumes></volStatus>
</cliOutput>"#;

        let exec = MockExec::ok()
            .rule("volume get v features.uss", 0, uss_on, "")
            .rule("volume status v --xml", 0, status_xml, "")
            .rule("ps -ef", 0, "321\n", "");

        assert!(is_uss_enabled(&exec, "s0", "v").await);

        // Option on but snapd gone from ps.
        let exec = MockExec::ok()
            .rule("volume get v features.uss", 0, uss_on, "")
            .rule("volume status v --xml", 0, status_xml, "")
            .rule("ps -ef", 0, "", "");

        assert!(!is_uss_enabled(&exec, "s0", "v").await);

        // Option off; the daemon check is never consulted.
        let off = uss_on.replace(
            "features.uss                            on",
            "features.uss                            off",
        );
        let exec = MockExec::ok().rule("volume get v features.uss", 0, &off, "");

        assert!(!is_uss_enabled(&exec, "s0", "v").await);
        assert!(!exec
            .commands()
            .iter()
            .any(|x| x.contains("volume status")));
    }

    #[test]
    fn processes_online_counts_shd_per_hosting_server() {
        use gft_wire_types::{BrickStatus, DaemonStatus, VolumeStatus};

        let brick = |host: &str, online: bool| BrickStatus {
            brick: BrickRef::new(host, "/bricks/brick0"),
            online,
            port: online.then(|| 49152),
            pid: online.then(|| 100),
        };
        let shd = |host: &str| DaemonStatus {
            kind: DaemonKind::SelfHeal,
            host: host.to_string(),
            online: true,
            pid: Some(200),
        };

        let mut status = VolumeStatus {
            name: "v".into(),
            bricks: vec![brick("s0", true), brick("s1", true)],
            daemons: vec![shd("s0"), shd("s1")],
            tasks: vec![],
        };

        assert!(processes_online(&status));

        // One self-heal daemon missing for a hosting server.
        status.daemons.pop();
        assert!(!processes_online(&status));

        // No daemons at all is fine (pure distribute).
        status.daemons.clear();
        assert!(processes_online(&status));

        status.bricks[1].online = false;
        assert!(!processes_online(&status));
    }
}
