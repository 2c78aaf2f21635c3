// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

use std::{fmt, str::FromStr};

use crate::volume::UnknownToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RebalanceState {
    NotStarted,
    InProgress,
    Completed,
    Failed,
    Stopped,
}

impl fmt::Display for RebalanceState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let x = match self {
            Self::NotStarted => "not started",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };

        write!(f, "{}", x)
    }
}

impl FromStr for RebalanceState {
    type Err = UnknownToken;

    /// Accepts both the numeric `status` codes and the `statusStr` text
    /// the CLI emits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let x = match s {
            "0" | "not started" => Self::NotStarted,
            "1" | "in progress" => Self::InProgress,
            "3" | "completed" => Self::Completed,
            "4" | "failed" => Self::Failed,
            "5" | "stopped" => Self::Stopped,
            _ => {
                return Err(UnknownToken {
                    kind: "rebalance state",
                    token: s.to_string(),
                })
            }
        };

        Ok(x)
    }
}

/// Per-node (and aggregate) rebalance counters.
///
/// `scanned` is the CLI's `lookups` column; `rebalanced` is `files`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RebalanceStats {
    pub node: String,
    pub rebalanced: u64,
    pub scanned: u64,
    pub failures: u64,
    pub skipped: u64,
    pub size: u64,
    pub status: RebalanceState,
    pub status_str: String,
}

/// Parsed `volume rebalance <vol> status --xml` view.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RebalanceStatus {
    pub task_id: String,
    pub nodes: Vec<RebalanceStats>,
    pub aggregate: RebalanceStats,
}

impl RebalanceStatus {
    pub fn is_complete(&self) -> bool {
        self.aggregate.status == RebalanceState::Completed
    }

    pub fn has_failed(&self) -> bool {
        self.aggregate.status == RebalanceState::Failed
            || self.nodes.iter().any(|n| n.status == RebalanceState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_parses_codes_and_text() {
        assert_eq!("3".parse::<RebalanceState>().unwrap(), RebalanceState::Completed);
        assert_eq!(
            "in progress".parse::<RebalanceState>().unwrap(),
            RebalanceState::InProgress
        );
        assert!("99".parse::<RebalanceState>().is_err());
    }
}
