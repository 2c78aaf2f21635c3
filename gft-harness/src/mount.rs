// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Mount lifecycle: attach, verify, detach. Boolean outcomes like the
//! volume lifecycle; the runtime records what actually mounted so teardown
//! can undo exactly that.

use gft_config::Config;
use gft_gluster::{mount as m, RemoteExec};
use gft_wire_types::{MountDescriptor, MountType};

/// Mount one descriptor and verify it against the client's mount table.
pub async fn mount_volume(exec: &dyn RemoteExec, config: &Config, mnt: &MountDescriptor) -> bool {
    if mnt.mtype == MountType::Smb {
        match m::write_smb_credentials(
            exec,
            &mnt.client,
            &mnt.volname,
            &config.smb_user,
            &config.smb_passwd,
        )
        .await
        {
            Ok(out) if out.success() => {}
            Ok(out) => {
                tracing::error!(mount = %mnt, stderr = %out.stderr_excerpt(200), "smb credentials write failed");

                return false;
            }
            Err(e) => {
                tracing::error!(mount = %mnt, error = %e, "smb credentials transport failure");

                return false;
            }
        }
    }

    match m::mount_volume(exec, mnt).await {
        Ok(out) if out.success() => {}
        Ok(out) => {
            tracing::error!(mount = %mnt, rc = out.rc, stderr = %out.stderr_excerpt(200), "mount failed");

            return false;
        }
        Err(e) => {
            tracing::error!(mount = %mnt, error = %e, "mount transport failure");

            return false;
        }
    }

    match m::is_mounted(exec, mnt).await {
        Ok(true) => true,
        Ok(false) => {
            tracing::error!(mount = %mnt, "mounted but not visible in the mount table");

            false
        }
        Err(e) => {
            tracing::error!(mount = %mnt, error = %e, "mount verification transport failure");

            false
        }
    }
}

/// Mount all descriptors. Returns the ones that actually mounted (for
/// teardown) and whether every mount succeeded. Stops at the first failure
/// so a broken volume does not burn the whole budget client by client.
pub async fn mount_volumes(
    exec: &dyn RemoteExec,
    config: &Config,
    mounts: &[MountDescriptor],
) -> (Vec<MountDescriptor>, bool) {
    let mut mounted = vec![];

    for mnt in mounts {
        if !mount_volume(exec, config, mnt).await {
            return (mounted, false);
        }

        mounted.push(mnt.clone());
    }

    (mounted, true)
}

/// Unmount and verify the mount point left the mount table.
pub async fn unmount_volume(exec: &dyn RemoteExec, mnt: &MountDescriptor) -> bool {
    match m::umount_volume(exec, mnt).await {
        Ok(out) if out.success() => {}
        Ok(out) => {
            tracing::warn!(mount = %mnt, rc = out.rc, stderr = %out.stderr_excerpt(200), "umount failed");

            return false;
        }
        Err(e) => {
            tracing::warn!(mount = %mnt, error = %e, "umount transport failure");

            return false;
        }
    }

    match m::is_mounted(exec, mnt).await {
        Ok(false) => true,
        Ok(true) => {
            tracing::warn!(mount = %mnt, "still in the mount table after umount");

            false
        }
        Err(e) => {
            tracing::warn!(mount = %mnt, error = %e, "umount verification transport failure");

            false
        }
    }
}

/// Unmount everything, attempting each even after a failure.
pub async fn unmount_volumes(exec: &dyn RemoteExec, mounts: &[MountDescriptor]) -> bool {
    let mut clean = true;

    for mnt in mounts {
        if !unmount_volume(exec, mnt).await {
            clean = false;
        }
    }

    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExec;

    fn config() -> Config {
        toml::from_str(
            r#"
servers = ["s0"]
clients = ["c0", "c1"]
smb_user = "smbuser"
smb_passwd = "secret"

[servers_info.s0]
bricks_root = "/bricks"
"#,
        )
        .unwrap()
    }

    fn fuse_mount(client: &str) -> MountDescriptor {
        MountDescriptor {
            volname: "v".into(),
            mtype: MountType::Fuse,
            mpoint: format!("/mnt/v_fuse_{}", client),
            client: client.into(),
            server: "s0".into(),
            user: "root".into(),
            options: vec![],
        }
    }

    #[tokio::test]
    async fn records_only_what_mounted() {
        let c = config();
        // grep of /proc/mounts fails on c1: the second mount never verifies.
        let exec = MockExec::ok().rule("grep -qs '^s0:/v /mnt/v_fuse_c1 '", 1, "", "");
        let mounts = vec![fuse_mount("c0"), fuse_mount("c1")];

        let (mounted, ok) = mount_volumes(&exec, &c, &mounts).await;

        assert!(!ok);
        assert_eq!(mounted.len(), 1);
        assert_eq!(mounted[0].client, "c0");

        // Verification greps for the volume source, not just the path, so a
        // leftover mount of another volume cannot satisfy it.
        assert!(exec
            .commands()
            .iter()
            .any(|x| x.contains("grep -qs '^s0:/v /mnt/v_fuse_c0 ' /proc/mounts")));
    }

    #[tokio::test]
    async fn smb_mount_writes_credentials_first() {
        let c = config();
        let exec = MockExec::ok();

        let mnt = MountDescriptor {
            mtype: MountType::Smb,
            ..fuse_mount("c0")
        };

        assert!(mount_volume(&exec, &c, &mnt).await);

        let calls = exec.commands();

        assert!(calls[0].contains("username=smbuser"));
        assert!(calls[0].contains(".smbcreds_v"));
        assert!(calls.iter().any(|x| x.contains("mount -t cifs")));
    }
}
