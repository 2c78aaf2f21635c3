// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Local process execution for the test driver machine.
//!
//! Everything the harness runs, locally or remotely, ultimately reduces to a
//! `(rc, stdout, stderr)` triple. [`CmdOutput`] is that triple; the checked
//! extension is for callers that want a non-zero exit to be an error.

use futures::{future::BoxFuture, FutureExt, TryFutureExt};
use std::{io, process::Output};
pub use tokio::process::{Child, Command};

#[derive(Debug, thiserror::Error)]
pub enum CmdError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Command failed. {}, stdout: {}, stderr: {}", .0.status, String::from_utf8_lossy(&.0.stdout), String::from_utf8_lossy(&.0.stderr))]
    Output(Output),
}

impl From<Output> for CmdError {
    fn from(output: Output) -> Self {
        CmdError::Output(output)
    }
}

/// The result of a finished command, local or remote.
///
/// `rc == 0` is the sole definition of success. Both output streams are
/// captured separately and lossily decoded; admin CLIs emit UTF-8 in
/// practice, and a garbled byte must not hide the rest of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdOutput {
    pub rc: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.rc == 0
    }
    /// First `n` chars of stderr, for failure reports.
    pub fn stderr_excerpt(&self, n: usize) -> String {
        self.stderr.chars().take(n).collect()
    }
}

impl From<Output> for CmdOutput {
    fn from(x: Output) -> Self {
        CmdOutput {
            rc: x.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&x.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&x.stderr).into_owned(),
        }
    }
}

pub trait CheckedCommandExt {
    fn checked_output(&mut self) -> BoxFuture<Result<Output, CmdError>>;
}

impl CheckedCommandExt for Command {
    /// Similar to `output`, but returns `Err` if the exit code is non-zero.
    /// For the driver's own plumbing (scp, mkdir for a push), where a
    /// failure is never interesting data.
    fn checked_output(&mut self) -> BoxFuture<Result<Output, CmdError>> {
        tracing::debug!(cmd = ?self);

        self.output()
            .err_into()
            .and_then(|x| async {
                tracing::debug!(status = ?x.status);

                if x.status.success() {
                    Ok(x)
                } else {
                    Err(x.into())
                }
            })
            .boxed()
    }
}

/// Run a shell command on the test driver machine.
///
/// A non-zero exit is *not* an error here; callers inspect `rc` themselves.
/// Only a failure to spawn the shell surfaces as `Err`.
pub async fn run_local(cmd: &str) -> Result<CmdOutput, CmdError> {
    tracing::debug!(%cmd, "running local command");

    let out = Command::new("bash")
        .arg("-c")
        .arg(cmd)
        .kill_on_drop(true)
        .output()
        .await?;

    Ok(out.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_success_captures_stdout() {
        let out = run_local("echo -n hello").await.unwrap();

        assert_eq!(out.rc, 0);
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
        assert_eq!(out.stderr, "");
    }

    #[tokio::test]
    async fn local_failure_preserves_rc_and_stderr() {
        let out = run_local("echo -n oops >&2; exit 3").await.unwrap();

        assert_eq!(out.rc, 3);
        assert!(!out.success());
        assert_eq!(out.stderr, "oops");
    }

    #[tokio::test]
    async fn checked_output_errors_on_nonzero() {
        let r = Command::new("false").checked_output().await;

        assert!(matches!(r, Err(CmdError::Output(_))));
    }

    #[tokio::test]
    async fn checked_output_passes_through_on_zero() {
        let out = Command::new("echo")
            .arg("-n")
            .arg("ok")
            .checked_output()
            .await
            .unwrap();

        assert_eq!(String::from_utf8_lossy(&out.stdout), "ok");
    }

    #[test]
    fn stderr_excerpt_truncates() {
        let out = CmdOutput {
            rc: 1,
            stdout: String::new(),
            stderr: "x".repeat(500),
        };

        assert_eq!(out.stderr_excerpt(80).len(), 80);
    }
}
