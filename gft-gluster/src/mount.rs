// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Client-side mount and unmount commands, one spelling per access
//! protocol.

use crate::{CmdOutput, RemoteExec, SshError};
use gft_wire_types::{MountDescriptor, MountType};

/// Path of the cifs credentials file a volume's smb mounts read.
pub fn smb_credentials_path(volname: &str) -> String {
    format!("/root/.smbcreds_{}", volname)
}

/// Drop a credentials file on `client` so cifs mount commands never carry
/// the password on the command line.
pub async fn write_smb_credentials(
    exec: &dyn RemoteExec,
    client: &str,
    volname: &str,
    user: &str,
    passwd: &str,
) -> Result<CmdOutput, SshError> {
    let path = smb_credentials_path(volname);

    exec.run(
        client,
        &format!(
            "printf 'username={}\\npassword={}\\n' > {} && chmod 600 {}",
            user, passwd, path, path
        ),
    )
    .await
}

fn joined_options(extra: &[String], leading: &[&str]) -> String {
    let mut opts: Vec<String> = leading.iter().map(|o| o.to_string()).collect();

    opts.extend(extra.iter().cloned());

    opts.join(",")
}

/// The full mount command for one descriptor. Split out of [`mount_volume`]
/// so tests can assert the exact spelling.
pub fn mount_cmd(m: &MountDescriptor) -> String {
    match m.mtype {
        MountType::Fuse => {
            let opts = joined_options(&m.options, &[]);
            let opts = if opts.is_empty() {
                String::new()
            } else {
                format!("-o {} ", opts)
            };

            format!(
                "mount -t glusterfs {}{}:/{} {}",
                opts, m.server, m.volname, m.mpoint
            )
        }
        MountType::Nfs => {
            // nfs needs an explicit version; default to v3, which gluster's
            // built-in server speaks.
            let has_vers = m.options.iter().any(|o| o.starts_with("vers="));
            let leading = if has_vers { vec![] } else { vec!["vers=3"] };

            format!(
                "mount -t nfs -o {} {}:/{} {}",
                joined_options(&m.options, &leading),
                m.server,
                m.volname,
                m.mpoint
            )
        }
        MountType::Smb => format!(
            "mount -t cifs -o {} //{}/gluster-{} {}",
            joined_options(
                &m.options,
                &[&format!("credentials={}", smb_credentials_path(&m.volname))]
            ),
            m.server,
            m.volname,
            m.mpoint
        ),
    }
}

/// Create the mount point and attach the volume.
pub async fn mount_volume(
    exec: &dyn RemoteExec,
    m: &MountDescriptor,
) -> Result<CmdOutput, SshError> {
    let mkdir = exec
        .run(&m.client, &format!("mkdir -p {}", m.mpoint))
        .await?;

    if !mkdir.success() {
        return Ok(mkdir);
    }

    exec.run(&m.client, &mount_cmd(m)).await
}

/// Detach the mount, falling back to a lazy unmount when the plain one is
/// refused (open files after a fault test, typically).
pub async fn umount_volume(
    exec: &dyn RemoteExec,
    m: &MountDescriptor,
) -> Result<CmdOutput, SshError> {
    let out = exec.run(&m.client, &format!("umount {}", m.mpoint)).await?;

    if out.success() {
        return Ok(out);
    }

    tracing::debug!(mount = %m, rc = out.rc, "plain umount refused, going lazy");

    exec.run(&m.client, &format!("umount -l {}", m.mpoint)).await
}

/// The source column `/proc/mounts` shows for one descriptor.
pub fn mount_source(m: &MountDescriptor) -> String {
    match m.mtype {
        MountType::Fuse | MountType::Nfs => format!("{}:/{}", m.server, m.volname),
        MountType::Smb => format!("//{}/gluster-{}", m.server, m.volname),
    }
}

/// True when the mount table lists the mount point with this volume as its
/// source and the root of the mount answers a stat. Matching the source
/// column rejects a stale or foreign mount sitting at the same path; the
/// stat probe catches transport-disconnected fuse mounts that still appear
/// in the table.
pub async fn is_mounted(exec: &dyn RemoteExec, m: &MountDescriptor) -> Result<bool, SshError> {
    let listed = exec
        .run(
            &m.client,
            &format!(
                "grep -qs '^{} {} ' /proc/mounts",
                mount_source(m),
                m.mpoint
            ),
        )
        .await?;

    if !listed.success() {
        return Ok(false);
    }

    let probe = exec.run(&m.client, &format!("stat {}", m.mpoint)).await?;

    Ok(probe.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(mtype: MountType, options: Vec<String>) -> MountDescriptor {
        MountDescriptor {
            volname: "testvol".into(),
            mtype,
            mpoint: "/mnt/testvol_fuse_0".into(),
            client: "client0".into(),
            server: "server0".into(),
            user: "root".into(),
            options,
        }
    }

    #[test]
    fn fuse_mount_spelling() {
        let m = descriptor(MountType::Fuse, vec![]);

        assert_eq!(
            mount_cmd(&m),
            "mount -t glusterfs server0:/testvol /mnt/testvol_fuse_0"
        );

        let m = descriptor(MountType::Fuse, vec!["acl".into()]);

        assert_eq!(
            mount_cmd(&m),
            "mount -t glusterfs -o acl server0:/testvol /mnt/testvol_fuse_0"
        );
    }

    #[test]
    fn nfs_mount_defaults_to_v3() {
        let m = descriptor(MountType::Nfs, vec![]);

        assert_eq!(
            mount_cmd(&m),
            "mount -t nfs -o vers=3 server0:/testvol /mnt/testvol_fuse_0"
        );

        let m = descriptor(MountType::Nfs, vec!["vers=4.0".into()]);

        assert_eq!(
            mount_cmd(&m),
            "mount -t nfs -o vers=4.0 server0:/testvol /mnt/testvol_fuse_0"
        );
    }

    #[test]
    fn smb_mount_uses_credentials_file() {
        let m = descriptor(MountType::Smb, vec![]);

        assert_eq!(
            mount_cmd(&m),
            "mount -t cifs -o credentials=/root/.smbcreds_testvol //server0/gluster-testvol /mnt/testvol_fuse_0"
        );
    }

    #[test]
    fn mount_table_sources() {
        assert_eq!(
            mount_source(&descriptor(MountType::Fuse, vec![])),
            "server0:/testvol"
        );
        assert_eq!(
            mount_source(&descriptor(MountType::Nfs, vec![])),
            "server0:/testvol"
        );
        assert_eq!(
            mount_source(&descriptor(MountType::Smb, vec![])),
            "//server0/gluster-testvol"
        );
    }

    // A mount table that has the mount point occupied by some other volume.
    struct ForeignMount(std::sync::Mutex<Vec<String>>);

    #[async_trait::async_trait]
    impl crate::RemoteExec for ForeignMount {
        async fn run(&self, _: &str, cmd: &str) -> Result<CmdOutput, SshError> {
            self.0.lock().unwrap().push(cmd.to_string());

            let rc = if cmd.starts_with("grep -qs '^server0:/testvol ") {
                // The table row reads "othervol /mnt/testvol_fuse_0", so the
                // anchored source never matches.
                1
            } else {
                0
            };

            Ok(CmdOutput {
                rc,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
        async fn run_as(&self, h: &str, _: &str, cmd: &str) -> Result<CmdOutput, SshError> {
            self.run(h, cmd).await
        }
        async fn spawn(&self, _: &str, _: &str) -> Result<gft_ssh::RemoteProcess, SshError> {
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

    #[tokio::test]
    async fn foreign_mount_at_the_same_path_is_not_mounted() {
        let exec = ForeignMount(std::sync::Mutex::new(vec![]));
        let m = descriptor(MountType::Fuse, vec![]);

        assert!(!is_mounted(&exec, &m).await.unwrap());

        let calls = exec.0.lock().unwrap();

        assert_eq!(
            calls[0],
            "grep -qs '^server0:/testvol /mnt/testvol_fuse_0 ' /proc/mounts"
        );
        // The stat probe never ran; the table check already said no.
        assert_eq!(calls.len(), 1);
    }
}
