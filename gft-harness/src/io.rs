// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Workload drivers: the file/dir I/O script, async handles per mount, and
//! the arequal tree checksum used to prove contents survived a topology
//! change.

use gft_gluster::fsops;
use gft_ssh::{RemoteExec, RemoteProcess, SshError};
use gft_wire_types::MountDescriptor;

pub const IO_SCRIPT_PATH: &str = "/usr/share/gft/file_dir_ops.sh";

static IO_SCRIPT: &str = include_str!("scripts/file_dir_ops.sh");

/// Shape of one I/O run.
#[derive(Debug, Clone, Copy)]
pub struct IoProfile {
    pub dirs: u32,
    pub files_per_dir: u32,
    pub file_size_kb: u32,
}

impl Default for IoProfile {
    fn default() -> Self {
        IoProfile {
            dirs: 4,
            files_per_dir: 16,
            file_size_kb: 64,
        }
    }
}

pub(crate) fn io_cmd(profile: &IoProfile, mpoint: &str) -> String {
    format!(
        "{} --dirs {} --files {} --size-kb {} {}",
        IO_SCRIPT_PATH, profile.dirs, profile.files_per_dir, profile.file_size_kb, mpoint
    )
}

/// Install the I/O script on every client. Done once per run, not per
/// volume.
pub async fn upload_io_script(exec: &dyn RemoteExec, clients: &[String]) -> bool {
    for client in clients {
        let cmd = format!(
            "mkdir -p /usr/share/gft && cat > {path} <<'EOF'\n{body}\nEOF\nchmod +x {path}",
            path = IO_SCRIPT_PATH,
            body = IO_SCRIPT
        );

        match exec.run(client, &cmd).await {
            Ok(out) if out.success() => {}
            Ok(out) => {
                tracing::error!(%client, stderr = %out.stderr_excerpt(200), "io script upload failed");

                return false;
            }
            Err(e) => {
                tracing::error!(%client, error = %e, "io script upload transport failure");

                return false;
            }
        }
    }

    true
}

/// Start the I/O script against every mount, one async handle per mount.
/// Transport failure here is an `Err`; the handles are otherwise live.
pub async fn run_io(
    exec: &dyn RemoteExec,
    mounts: &[MountDescriptor],
    profile: &IoProfile,
) -> Result<Vec<RemoteProcess>, SshError> {
    let mut handles = Vec::with_capacity(mounts.len());

    for m in mounts {
        tracing::debug!(mount = %m, "starting io");

        handles.push(exec.spawn(&m.client, &io_cmd(profile, &m.mpoint)).await?);
    }

    Ok(handles)
}

/// Reap every handle and require rc 0 from each. The test body asserts on
/// this.
pub async fn validate_io_procs(handles: Vec<RemoteProcess>) -> bool {
    let mut ok = true;

    for h in handles {
        match h.communicate().await {
            Ok(out) if out.success() => {}
            Ok(out) => {
                tracing::error!(rc = out.rc, stderr = %out.stderr_excerpt(200), "io run failed");

                ok = false;
            }
            Err(e) => {
                tracing::error!(error = %e, "io handle reap failed");

                ok = false;
            }
        }
    }

    ok
}

/// Drain in-flight I/O without judging it. Teardown uses this so a failed
/// write (expected in fault tests) does not mask the primary result.
pub async fn wait_for_io_to_complete(handles: Vec<RemoteProcess>) -> bool {
    let mut drained = true;

    for h in handles {
        match h.communicate().await {
            Ok(out) => {
                tracing::debug!(rc = out.rc, "io drained");
            }
            Err(e) => {
                tracing::warn!(error = %e, "io handle reap failed during drain");

                drained = false;
            }
        }
    }

    drained
}

/// arequal checksum of every mounted tree (or `subpath` under each). Equal
/// strings mean byte-identical contents. `None` when any checksum run
/// failed.
pub async fn collect_mounts_arequal(
    exec: &dyn RemoteExec,
    mounts: &[MountDescriptor],
    subpath: Option<&str>,
) -> Result<Option<Vec<String>>, SshError> {
    let mut sums = Vec::with_capacity(mounts.len());

    for m in mounts {
        let path = match subpath {
            Some(p) => format!("{}/{}", m.mpoint, p),
            None => m.mpoint.clone(),
        };

        let out = exec
            .run(&m.client, &format!("arequal-checksum -p {}", path))
            .await?;

        if !out.success() {
            tracing::warn!(mount = %m, rc = out.rc, "arequal failed");

            return Ok(None);
        }

        sums.push(out.stdout.trim().to_string());
    }

    Ok(Some(sums))
}

/// Free space on the mount in KB.
pub async fn get_size_of_mountpoint(
    exec: &dyn RemoteExec,
    client: &str,
    mpoint: &str,
) -> Result<Option<u64>, SshError> {
    fsops::df_avail_kb(exec, client, mpoint).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExec;
    use gft_wire_types::MountType;

    fn mount(client: &str) -> MountDescriptor {
        MountDescriptor {
            volname: "v".into(),
            mtype: MountType::Fuse,
            mpoint: "/mnt/v_fuse_0".into(),
            client: client.into(),
            server: "s0".into(),
            user: "root".into(),
            options: vec![],
        }
    }

    #[test]
    fn io_cmd_spelling() {
        let p = IoProfile {
            dirs: 2,
            files_per_dir: 8,
            file_size_kb: 128,
        };

        assert_eq!(
            io_cmd(&p, "/mnt/v_fuse_0"),
            "/usr/share/gft/file_dir_ops.sh --dirs 2 --files 8 --size-kb 128 /mnt/v_fuse_0"
        );
    }

    #[tokio::test]
    async fn validate_fails_on_any_nonzero_handle() {
        let exec = MockExec::ok().rule("--dirs", 1, "", "disk quota exceeded");

        let handles = run_io(&exec, &[mount("c0")], &IoProfile::default())
            .await
            .unwrap();

        assert!(!validate_io_procs(handles).await);
    }

    #[tokio::test]
    async fn drain_tolerates_nonzero_handles() {
        let exec = MockExec::ok().rule("--dirs", 1, "", "killed");

        let handles = run_io(&exec, &[mount("c0")], &IoProfile::default())
            .await
            .unwrap();

        assert!(wait_for_io_to_complete(handles).await);
    }

    #[tokio::test]
    async fn arequal_none_on_failure() {
        let exec = MockExec::ok().rule("arequal-checksum", 1, "", "not found");

        let sums = collect_mounts_arequal(&exec, &[mount("c0")], None)
            .await
            .unwrap();

        assert!(sums.is_none());
    }
}
