// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

use std::{fmt, str::FromStr};

use crate::volume::UnknownToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    Fuse,
    Nfs,
    Smb,
}

impl fmt::Display for MountType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let x = match self {
            Self::Fuse => "fuse",
            Self::Nfs => "nfs",
            Self::Smb => "smb",
        };

        write!(f, "{}", x)
    }
}

impl FromStr for MountType {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let x = match s.to_ascii_lowercase().as_str() {
            "fuse" | "glusterfs" => Self::Fuse,
            "nfs" => Self::Nfs,
            "smb" | "cifs" => Self::Smb,
            _ => {
                return Err(UnknownToken {
                    kind: "mount type",
                    token: s.to_string(),
                })
            }
        };

        Ok(x)
    }
}

/// One client-side attachment of a volume.
///
/// Equality is by `(client, mpoint)` only: two descriptors naming the same
/// directory on the same client are the same mount whatever else differs.
#[derive(Debug, Clone, Eq, serde::Serialize, serde::Deserialize)]
pub struct MountDescriptor {
    pub volname: String,
    pub mtype: MountType,
    /// Absolute path on the client.
    pub mpoint: String,
    pub client: String,
    /// Server used in the mount command.
    pub server: String,
    pub user: String,
    /// Extra `-o` options, e.g. `acl` or `vers=4.0`.
    pub options: Vec<String>,
}

impl PartialEq for MountDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.client == other.client && self.mpoint == other.mpoint
    }
}

impl std::hash::Hash for MountDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.client.hash(state);
        self.mpoint.hash(state);
    }
}

// Mounts are logged often enough that the full struct Debug is noise.
impl fmt::Display for MountDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{} ({} of {})",
            self.client, self.mpoint, self.mtype, self.volname
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(client: &str, mpoint: &str, mtype: MountType) -> MountDescriptor {
        MountDescriptor {
            volname: "testvol".into(),
            mtype,
            mpoint: mpoint.into(),
            client: client.into(),
            server: "server0".into(),
            user: "root".into(),
            options: vec![],
        }
    }

    #[test]
    fn equality_is_client_and_mpoint_only() {
        let a = mount("client0", "/mnt/testvol_fuse_0", MountType::Fuse);
        let b = mount("client0", "/mnt/testvol_fuse_0", MountType::Nfs);
        let c = mount("client1", "/mnt/testvol_fuse_0", MountType::Fuse);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn mount_type_parses_cli_spellings() {
        assert_eq!("glusterfs".parse::<MountType>().unwrap(), MountType::Fuse);
        assert_eq!("cifs".parse::<MountType>().unwrap(), MountType::Smb);
        assert!("iscsi".parse::<MountType>().is_err());
    }
}
