// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

use crate::brick::{BrickRef, Subvolume};
use std::{collections::BTreeMap, fmt, str::FromStr};

#[derive(Debug, thiserror::Error)]
#[error("unrecognized {kind}: {token}")]
pub struct UnknownToken {
    pub kind: &'static str,
    pub token: String,
}

/// Logical volume topology.
///
/// `FromStr` accepts both the harness spelling (`"distributed-replicated"`)
/// and the CLI's `typeStr` spelling (`"Distributed-Replicate"`), so parsed
/// `volume info` views and declared specs compare directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeType {
    Distributed,
    Replicated,
    DistributedReplicated,
    Dispersed,
    DistributedDispersed,
    Arbiter,
    DistributedArbiter,
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let x = match self {
            Self::Distributed => "distributed",
            Self::Replicated => "replicated",
            Self::DistributedReplicated => "distributed-replicated",
            Self::Dispersed => "dispersed",
            Self::DistributedDispersed => "distributed-dispersed",
            Self::Arbiter => "arbiter",
            Self::DistributedArbiter => "distributed-arbiter",
        };

        write!(f, "{}", x)
    }
}

impl FromStr for VolumeType {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let x = match s.to_ascii_lowercase().as_str() {
            "distributed" | "distribute" => Self::Distributed,
            "replicated" | "replicate" => Self::Replicated,
            "distributed-replicated" | "distributed-replicate" => Self::DistributedReplicated,
            "dispersed" | "disperse" => Self::Dispersed,
            "distributed-dispersed" | "distributed-disperse" => Self::DistributedDispersed,
            "arbiter" => Self::Arbiter,
            "distributed-arbiter" => Self::DistributedArbiter,
            _ => {
                return Err(UnknownToken {
                    kind: "volume type",
                    token: s.to_string(),
                })
            }
        };

        Ok(x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Rdma,
    TcpRdma,
}

impl Default for Transport {
    fn default() -> Self {
        Self::Tcp
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let x = match self {
            Self::Tcp => "tcp",
            Self::Rdma => "rdma",
            Self::TcpRdma => "tcp,rdma",
        };

        write!(f, "{}", x)
    }
}

impl FromStr for Transport {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let x = match s.to_ascii_lowercase().as_str() {
            "tcp" | "0" => Self::Tcp,
            "rdma" | "1" => Self::Rdma,
            "tcp,rdma" | "tcp+rdma" | "2" => Self::TcpRdma,
            _ => {
                return Err(UnknownToken {
                    kind: "transport",
                    token: s.to_string(),
                })
            }
        };

        Ok(x)
    }
}

/// Logical description of a volume, independent of host assignment.
///
/// Only the counts relevant to `vol_type` are consulted; the planner
/// ignores the rest.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VolumeSpec {
    pub vol_type: VolumeType,
    #[serde(default)]
    pub dist_count: usize,
    #[serde(default)]
    pub replica_count: usize,
    #[serde(default)]
    pub disperse_count: usize,
    #[serde(default)]
    pub redundancy_count: usize,
    #[serde(default)]
    pub arbiter_count: usize,
    #[serde(default)]
    pub transport: Transport,
    /// Options applied with `volume set` right after create.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl VolumeSpec {
    pub fn new(vol_type: VolumeType) -> Self {
        VolumeSpec {
            vol_type,
            dist_count: 0,
            replica_count: 0,
            disperse_count: 0,
            redundancy_count: 0,
            arbiter_count: 0,
            transport: Transport::Tcp,
            options: BTreeMap::new(),
        }
    }

    pub fn is_replicated(&self) -> bool {
        matches!(
            self.vol_type,
            VolumeType::Replicated
                | VolumeType::DistributedReplicated
                | VolumeType::Arbiter
                | VolumeType::DistributedArbiter
        )
    }

    pub fn is_dispersed(&self) -> bool {
        matches!(
            self.vol_type,
            VolumeType::Dispersed | VolumeType::DistributedDispersed
        )
    }

    pub fn is_arbiter(&self) -> bool {
        matches!(
            self.vol_type,
            VolumeType::Arbiter | VolumeType::DistributedArbiter
        )
    }

    /// Number of distribute stripes.
    pub fn stripe_count(&self) -> usize {
        match self.vol_type {
            VolumeType::Distributed
            | VolumeType::DistributedReplicated
            | VolumeType::DistributedDispersed
            | VolumeType::DistributedArbiter => self.dist_count.max(1),
            _ => 1,
        }
    }

    /// Bricks per distribute stripe. 1 for a pure distribute.
    pub fn subvol_width(&self) -> usize {
        if self.is_replicated() {
            self.replica_count.max(1)
        } else if self.is_dispersed() {
            self.disperse_count.max(1)
        } else {
            1
        }
    }

    /// Total number of bricks the topology requires.
    pub fn brick_count(&self) -> usize {
        self.stripe_count() * self.subvol_width()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VolState {
    Created,
    Started,
    Stopped,
}

impl fmt::Display for VolState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let x = match self {
            Self::Created => "Created",
            Self::Started => "Started",
            Self::Stopped => "Stopped",
        };

        write!(f, "{}", x)
    }
}

impl FromStr for VolState {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let x = match s {
            "Created" => Self::Created,
            "Started" => Self::Started,
            "Stopped" => Self::Stopped,
            _ => {
                return Err(UnknownToken {
                    kind: "volume state",
                    token: s.to_string(),
                })
            }
        };

        Ok(x)
    }
}

/// A deployed volume: the spec plus its concrete brick layout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Volume {
    pub name: String,
    pub spec: VolumeSpec,
    pub bricks: Vec<BrickRef>,
    pub subvols: Vec<Subvolume>,
    pub state: VolState,
}

/// Parsed `volume info --xml` view.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VolumeInfo {
    pub name: String,
    pub id: String,
    pub vol_type: VolumeType,
    pub status: VolState,
    pub brick_count: usize,
    pub dist_count: usize,
    pub replica_count: usize,
    pub arbiter_count: usize,
    pub disperse_count: usize,
    pub redundancy_count: usize,
    pub transport: Transport,
    pub bricks: Vec<BrickRef>,
    pub options: BTreeMap<String, String>,
}

/// One brick row out of `volume status --xml`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BrickStatus {
    pub brick: BrickRef,
    pub online: bool,
    pub port: Option<u16>,
    pub pid: Option<u32>,
}

/// Service daemons reported alongside bricks in `volume status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DaemonKind {
    SelfHeal,
    Nfs,
    Quota,
    Snapd,
    Bitd,
    Scrubber,
}

impl DaemonKind {
    /// The `hostname` column the CLI prints for this daemon.
    pub fn cli_label(self) -> &'static str {
        match self {
            Self::SelfHeal => "Self-heal Daemon",
            Self::Nfs => "NFS Server",
            Self::Quota => "Quota Daemon",
            Self::Snapd => "Snapshot Daemon",
            Self::Bitd => "Bitrot Daemon",
            Self::Scrubber => "Scrubber Daemon",
        }
    }

    /// The process name to look for in `ps` output.
    pub fn process_name(self) -> &'static str {
        match self {
            Self::SelfHeal => "glustershd",
            Self::Nfs => "glusterfs",
            Self::Quota => "quotad",
            Self::Snapd => "snapd",
            Self::Bitd => "bitd",
            Self::Scrubber => "scrub",
        }
    }

    pub fn from_cli_label(s: &str) -> Option<Self> {
        let x = match s {
            "Self-heal Daemon" => Self::SelfHeal,
            "NFS Server" => Self::Nfs,
            "Quota Daemon" => Self::Quota,
            "Snapshot Daemon" => Self::Snapd,
            "Bitrot Daemon" => Self::Bitd,
            "Scrubber Daemon" => Self::Scrubber,
            _ => return None,
        };

        Some(x)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DaemonStatus {
    pub kind: DaemonKind,
    pub host: String,
    pub online: bool,
    pub pid: Option<u32>,
}

/// Background task rows (`rebalance`, `remove-brick`) out of
/// `volume status ... tasks`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TaskStatus {
    pub kind: String,
    pub id: String,
    pub status: String,
}

/// Parsed `volume status --xml` view.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct VolumeStatus {
    pub name: String,
    pub bricks: Vec<BrickStatus>,
    pub daemons: Vec<DaemonStatus>,
    pub tasks: Vec<TaskStatus>,
}

impl VolumeStatus {
    pub fn brick(&self, brick: &BrickRef) -> Option<&BrickStatus> {
        self.bricks.iter().find(|b| &b.brick == brick)
    }

    pub fn daemons_of(&self, kind: DaemonKind) -> impl Iterator<Item = &DaemonStatus> {
        self.daemons.iter().filter(move |d| d.kind == kind)
    }

    pub fn all_bricks_online(&self) -> bool {
        !self.bricks.is_empty()
            && self
                .bricks
                .iter()
                .all(|b| b.online && b.pid.is_some())
    }
}

impl Default for VolumeType {
    fn default() -> Self {
        Self::Distributed
    }
}
