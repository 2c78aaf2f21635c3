// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Process-level checks on the servers. `volume status` reports what
//! glusterd believes; these reconcile that against what `ps` shows.

use crate::{volume::get_volume_status, CmdOutput, RemoteExec, SshError};
use gft_wire_types::DaemonKind;

/// Pids of `name` on `host` out of a ps pipeline. An empty vec means the
/// pipeline ran and found nothing.
pub async fn get_process_pids(
    exec: &dyn RemoteExec,
    host: &str,
    name: &str,
) -> Result<Option<Vec<u32>>, SshError> {
    let out = exec
        .run(
            host,
            &format!(
                "ps -ef | grep -v grep | grep '{}' | awk '{{print $2}}'",
                name
            ),
        )
        .await?;

    if !out.success() {
        return Ok(None);
    }

    let pids = out
        .stdout
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect();

    Ok(Some(pids))
}

pub async fn get_daemon_pids(
    exec: &dyn RemoteExec,
    host: &str,
    kind: DaemonKind,
) -> Result<Option<Vec<u32>>, SshError> {
    get_process_pids(exec, host, kind.process_name()).await
}

/// True when every `kind` daemon `volume status` reports online also shows
/// up in `ps` on its host under the pid glusterd recorded. Catches daemons
/// that died after glusterd last looked.
pub async fn is_daemon_process_running(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    kind: DaemonKind,
) -> Result<bool, SshError> {
    let status = match get_volume_status(exec, mnode, volname).await? {
        Some(s) => s,
        None => return Ok(false),
    };

    let mut rows = status.daemons_of(kind).peekable();

    if rows.peek().is_none() {
        return Ok(false);
    }

    for d in rows {
        let pid = match (d.online, d.pid) {
            (true, Some(pid)) => pid,
            _ => return Ok(false),
        };

        let live = get_process_pids(exec, &d.host, kind.process_name())
            .await?
            .unwrap_or_default();

        if !live.contains(&pid) {
            tracing::debug!(host = %d.host, pid, ?kind, "daemon pid not in ps");

            return Ok(false);
        }
    }

    Ok(true)
}

/// SIGKILL every process matching `name` on `host`.
pub async fn kill_process(
    exec: &dyn RemoteExec,
    host: &str,
    name: &str,
) -> Result<CmdOutput, SshError> {
    exec.run(host, &format!("pkill -9 -f '{}'", name)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CmdOutput;
    use gft_ssh::RemoteProcess;
    use std::path::Path;

    struct PsFeed {
        stdout: &'static str,
    }

    #[async_trait::async_trait]
    impl RemoteExec for PsFeed {
        async fn run(&self, _host: &str, _cmd: &str) -> Result<CmdOutput, SshError> {
            Ok(CmdOutput {
                rc: 0,
                stdout: self.stdout.to_string(),
                stderr: String::new(),
            })
        }

        async fn run_as(
            &self,
            host: &str,
            _user: &str,
            cmd: &str,
        ) -> Result<CmdOutput, SshError> {
            self.run(host, cmd).await
        }

        async fn spawn(&self, host: &str, cmd: &str) -> Result<RemoteProcess, SshError> {
            Ok(RemoteProcess::canned(self.run(host, cmd).await?))
        }

        async fn push_file(
            &self,
            _host: &str,
            _from: &Path,
            _to: &Path,
        ) -> Result<(), SshError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn pids_parse_from_ps_column() {
        let exec = PsFeed {
            stdout: "1234\n5678\n",
        };

        let pids = get_process_pids(&exec, "server0", "glustershd")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(pids, vec![1234, 5678]);
    }

    #[tokio::test]
    async fn empty_ps_output_is_no_pids() {
        let exec = PsFeed { stdout: "" };

        let pids = get_process_pids(&exec, "server0", "glustershd")
            .await
            .unwrap()
            .unwrap();

        assert!(pids.is_empty());
    }
}
