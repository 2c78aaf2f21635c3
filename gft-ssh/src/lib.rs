// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! The remote execution seam.
//!
//! Every component that needs to reach a server or client host goes through
//! [`RemoteExec`]; nothing else in the workspace opens a connection. The
//! production implementation, [`SshExec`], drives the system `ssh`/`scp`
//! binaries so that host keys, agents and jump configuration behave exactly
//! as they do for an operator at a shell. Tests inject their own
//! implementation and never touch the network.
//!
//! A non-zero remote exit code is *data*, not an error: verb wrappers in the
//! adapter layer hand the rc back to the caller untouched. `Err` is reserved
//! for the driver machine failing to spawn the client at all. A connection
//! failure shows up as ssh's own rc 255 with its message in stderr, never as
//! a silent zero.

use async_trait::async_trait;
use gft_cmd::{CheckedCommandExt, CmdError, CmdOutput, Command};
use std::{collections::HashMap, path::Path, process::Stdio, sync::Arc};
use tokio::{io::AsyncWriteExt, sync::Mutex};

#[derive(Debug, thiserror::Error)]
pub enum SshError {
    #[error(transparent)]
    Cmd(#[from] CmdError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("could not open stdin of the ssh client for {0}")]
    NoStdin(String),
}

/// A remote process started with [`RemoteExec::spawn`].
///
/// `communicate` consumes the handle, so a process cannot be reaped twice.
pub struct RemoteProcess {
    inner: Inner,
}

enum Inner {
    Child(tokio::process::Child),
    Canned(CmdOutput),
}

impl RemoteProcess {
    pub fn from_child(child: tokio::process::Child) -> Self {
        RemoteProcess {
            inner: Inner::Child(child),
        }
    }
    /// A pre-baked result, for executors that do not really run anything.
    pub fn canned(out: CmdOutput) -> Self {
        RemoteProcess {
            inner: Inner::Canned(out),
        }
    }
    /// Wait for the process to exit and collect its output.
    pub async fn communicate(self) -> Result<CmdOutput, SshError> {
        match self.inner {
            Inner::Child(child) => {
                let out = child.wait_with_output().await?;

                Ok(out.into())
            }
            Inner::Canned(out) => Ok(out),
        }
    }
    /// Best-effort kill of the local ssh client. The remote side is
    /// terminated via `kill_process` on the host when it matters.
    pub fn kill(&mut self) {
        if let Inner::Child(ref mut child) = self.inner {
            let _ = child.start_kill();
        }
    }
}

#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run `cmd` on `host` as the configured user and wait for it to exit.
    async fn run(&self, host: &str, cmd: &str) -> Result<CmdOutput, SshError>;

    /// Run `cmd` on `host` as `user`.
    async fn run_as(&self, host: &str, user: &str, cmd: &str) -> Result<CmdOutput, SshError>;

    /// Start `cmd` on `host` without waiting. The returned handle is awaited
    /// (or killed) later; see [`RemoteProcess`].
    async fn spawn(&self, host: &str, cmd: &str) -> Result<RemoteProcess, SshError>;

    /// Copy a local file to `to` on `host`.
    async fn push_file(&self, host: &str, from: &Path, to: &Path) -> Result<(), SshError>;
}

/// Production executor over the system `ssh` binary.
#[derive(Debug)]
pub struct SshExec {
    user: String,
    key_path: Option<String>,
    // Synchronous runs against one host are serialized; callers may not
    // depend on relative ordering of two spawns (see the concurrency notes
    // in gft-harness).
    host_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SshExec {
    pub fn new(user: impl ToString, key_path: Option<String>) -> Self {
        SshExec {
            user: user.to_string(),
            key_path,
            host_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, host: &str) -> Arc<Mutex<()>> {
        let mut map = self
            .host_locks
            .lock()
            .expect("ssh host lock map poisoned");

        Arc::clone(map.entry(host.to_string()).or_default())
    }

    fn ssh_cmd(&self, host: &str, user: &str) -> Command {
        let mut x = Command::new("ssh");

        if let Some(key) = self.key_path.as_deref() {
            x.arg("-i").arg(key);
        }

        x.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg(format!("{}@{}", user, host))
            .kill_on_drop(true);

        x
    }

    fn scp_cmd(&self) -> Command {
        let mut x = Command::new("scp");

        if let Some(key) = self.key_path.as_deref() {
            x.arg("-i").arg(key);
        }

        x.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("BatchMode=yes")
            .kill_on_drop(true);

        x
    }

    /// Pipe `script` into `bash -s` on the host. Used for anything too long
    /// to be comfortable on one command line.
    pub async fn run_script(
        &self,
        host: &str,
        script: &str,
        args: &[&str],
    ) -> Result<CmdOutput, SshError> {
        let lock = self.lock_for(host);
        let _guard = lock.lock().await;

        tracing::debug!(%host, "running script over stdin");

        let mut child = self
            .ssh_cmd(host, &self.user)
            .arg(format!("bash -s -- {}", args.join(" ")))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SshError::NoStdin(host.to_string()))?;

        stdin.write_all(script.as_bytes()).await?;
        drop(stdin);

        let out = child.wait_with_output().await?;

        Ok(out.into())
    }
}

#[async_trait]
impl RemoteExec for SshExec {
    async fn run(&self, host: &str, cmd: &str) -> Result<CmdOutput, SshError> {
        let user = self.user.clone();

        self.run_as(host, &user, cmd).await
    }

    async fn run_as(&self, host: &str, user: &str, cmd: &str) -> Result<CmdOutput, SshError> {
        let lock = self.lock_for(host);
        let _guard = lock.lock().await;

        tracing::debug!(%host, %user, %cmd, "running remote command");

        let out = self.ssh_cmd(host, user).arg(cmd).output().await?;
        let out: CmdOutput = out.into();

        tracing::debug!(%host, rc = out.rc, "remote command finished");

        Ok(out)
    }

    async fn spawn(&self, host: &str, cmd: &str) -> Result<RemoteProcess, SshError> {
        tracing::debug!(%host, %cmd, "spawning remote command");

        let child = self
            .ssh_cmd(host, &self.user)
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        Ok(RemoteProcess::from_child(child))
    }

    async fn push_file(&self, host: &str, from: &Path, to: &Path) -> Result<(), SshError> {
        let lock = self.lock_for(host);
        let _guard = lock.lock().await;

        tracing::debug!(%host, from = %from.display(), to = %to.display(), "pushing file");

        // A failed mkdir or scp is a driver-side fault, not data; checked
        // execution turns the non-zero exit into `CmdError::Output` with
        // both streams attached.
        if let Some(dir) = to.parent() {
            self.ssh_cmd(host, &self.user)
                .arg(format!("mkdir -p {}", dir.display()))
                .checked_output()
                .await?;
        }

        self.scp_cmd()
            .arg(from)
            .arg(format!("{}@{}:{}", self.user, host, to.display()))
            .checked_output()
            .await?;

        Ok(())
    }
}

/// Run `cmd` on every host, in parallel, and collect the outputs in host
/// order.
pub async fn run_parallel(
    exec: &dyn RemoteExec,
    hosts: &[String],
    cmd: &str,
) -> Result<Vec<CmdOutput>, SshError> {
    let xs = hosts.iter().map(|h| exec.run(h, cmd));

    futures::future::try_join_all(xs).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn canned_process_communicates_once() {
        let p = RemoteProcess::canned(CmdOutput {
            rc: 0,
            stdout: "done".into(),
            stderr: String::new(),
        });

        let out = p.communicate().await.unwrap();

        assert_eq!(out.stdout, "done");
        // The handle is consumed; reaping twice does not compile.
    }

    #[test]
    fn host_locks_are_per_host() {
        let exec = SshExec::new("root", None);

        let a1 = exec.lock_for("server0");
        let a2 = exec.lock_for("server0");
        let b = exec.lock_for("server1");

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }
}
