// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Shared data model of the harness: the logical description of volumes,
//! bricks and mounts, plus the read-only views parsed out of admin CLI
//! output. Nothing here talks to the network.

pub mod brick;
pub mod heal;
pub mod mount;
pub mod peer;
pub mod quota;
pub mod rebalance;
pub mod snapshot;
pub mod volume;

pub use brick::{BrickRef, Subvolume};
pub use heal::{BrickHeal, HealInfo};
pub use mount::{MountDescriptor, MountType};
pub use peer::{PeerEntry, PeerState};
pub use quota::{QuotaLimit, QuotaList};
pub use rebalance::{RebalanceState, RebalanceStats, RebalanceStatus};
pub use snapshot::{SnapBrickStatus, SnapInfo, SnapStatus, SnapVolume};
pub use volume::{
    BrickStatus, DaemonKind, DaemonStatus, TaskStatus, Transport, VolState, Volume, VolumeInfo,
    VolumeSpec, VolumeStatus, VolumeType,
};

/// Stat output of a single file, parsed from `stat --format` columns.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileStat {
    /// Octal permission bits, e.g. `0o755`.
    pub mode: u32,
    pub user: String,
    pub group: String,
    pub size: u64,
    pub inode: u64,
    pub links: u64,
}
