// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

/// One snapshotted volume inside `snapshot info --xml`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SnapVolume {
    /// Internal snap volume name (a uuid-ish string).
    pub name: String,
    pub origin_volume: String,
    /// `Started` / `Stopped` as printed by the CLI; a started snap volume
    /// is an activated snapshot.
    pub status: String,
}

/// Parsed `snapshot info [--xml]` entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SnapInfo {
    pub name: String,
    pub uuid: String,
    pub description: Option<String>,
    pub create_time: String,
    pub volumes: Vec<SnapVolume>,
}

impl SnapInfo {
    pub fn is_activated(&self) -> bool {
        self.volumes.iter().any(|v| v.status == "Started")
    }
}

/// Per-brick state of one snapshot out of `snapshot status`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SnapBrickStatus {
    pub path: String,
    pub volume_group: String,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SnapStatus {
    pub name: String,
    pub bricks: Vec<SnapBrickStatus>,
}
