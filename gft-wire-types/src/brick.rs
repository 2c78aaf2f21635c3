// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

use std::{fmt, str::FromStr};

#[derive(Debug, thiserror::Error)]
pub enum BrickRefError {
    #[error("brick ref {0} is missing the host:path separator")]
    MissingSeparator(String),
    #[error("brick ref {0} has a relative path")]
    RelativePath(String),
    #[error("brick ref {0} has an empty host")]
    EmptyHost(String),
}

/// `host:/absolute/path` identifying one brick.
///
/// The path must be absolute; `gluster volume create` silently misbehaves on
/// relative brick paths, so they are rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BrickRef {
    pub host: String,
    pub path: String,
}

impl BrickRef {
    pub fn new(host: impl ToString, path: impl ToString) -> Self {
        BrickRef {
            host: host.to_string(),
            path: path.to_string(),
        }
    }
}

impl fmt::Display for BrickRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.path)
    }
}

impl FromStr for BrickRef {
    type Err = BrickRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Split on the separator before the path, not the first ':', so
        // IPv6-ish host spellings with colons still parse.
        let idx = s
            .find(":/")
            .ok_or_else(|| BrickRefError::MissingSeparator(s.to_string()))?;

        let (host, path) = s.split_at(idx);
        let path = &path[1..];

        if host.is_empty() {
            return Err(BrickRefError::EmptyHost(s.to_string()));
        }

        if !path.starts_with('/') {
            return Err(BrickRefError::RelativePath(s.to_string()));
        }

        Ok(BrickRef::new(host, path))
    }
}

/// The bricks of one distribute stripe, in replica (or disperse) order.
/// For arbiter volumes the last entry is the arbiter brick.
pub type Subvolume = Vec<BrickRef>;

/// Partition an ordered brick list into subvolumes of `width`.
///
/// The CLI lays bricks out stripe-by-stripe, so chunking in declared order
/// is exactly the subvolume structure.
pub fn subvols_of(bricks: &[BrickRef], width: usize) -> Vec<Subvolume> {
    if width == 0 {
        return vec![];
    }

    bricks.chunks(width).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_roundtrip() {
        let b: BrickRef = "server0:/bricks/brick0".parse().unwrap();

        assert_eq!(b.host, "server0");
        assert_eq!(b.path, "/bricks/brick0");
        assert_eq!(b.to_string(), "server0:/bricks/brick0");
    }

    #[test]
    fn rejects_bad_refs() {
        assert!("server0".parse::<BrickRef>().is_err());
        assert!("server0:bricks/brick0".parse::<BrickRef>().is_err());
        assert!(":/bricks/brick0".parse::<BrickRef>().is_err());
    }

    #[test]
    fn subvols_chunk_in_order() {
        let bricks: Vec<BrickRef> = vec![
            "s0:/b0".parse().unwrap(),
            "s1:/b0".parse().unwrap(),
            "s2:/b0".parse().unwrap(),
            "s0:/b1".parse().unwrap(),
            "s1:/b1".parse().unwrap(),
            "s2:/b1".parse().unwrap(),
        ];

        let subvols = subvols_of(&bricks, 3);

        assert_eq!(subvols.len(), 2);
        assert_eq!(subvols[0][0].host, "s0");
        assert_eq!(subvols[1][2].path, "/b1");
    }
}
