// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

use crate::brick::BrickRef;

/// Pending-heal state of one brick.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BrickHeal {
    pub brick: BrickRef,
    /// Whether the shd could reach the brick. An unreachable brick reports
    /// `-` instead of a count.
    pub connected: bool,
    /// `None` when the brick was unreachable.
    pub entry_count: Option<u64>,
    /// Paths (or gfid strings) still pending heal, in CLI order.
    pub entries: Vec<String>,
}

/// Parsed `volume heal <vol> info` view.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct HealInfo {
    pub bricks: Vec<BrickHeal>,
}

impl HealInfo {
    /// Zero entries on every brick, with every brick reachable.
    pub fn is_complete(&self) -> bool {
        !self.bricks.is_empty()
            && self
                .bricks
                .iter()
                .all(|b| b.connected && b.entry_count == Some(0))
    }

    pub fn total_entries(&self) -> u64 {
        self.bricks.iter().filter_map(|b| b.entry_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brick_heal(host: &str, n: Option<u64>, connected: bool) -> BrickHeal {
        BrickHeal {
            brick: BrickRef::new(host, "/bricks/brick0"),
            connected,
            entry_count: n,
            entries: vec![],
        }
    }

    #[test]
    fn complete_needs_all_bricks_reachable_and_empty() {
        let healed = HealInfo {
            bricks: vec![brick_heal("s0", Some(0), true), brick_heal("s1", Some(0), true)],
        };
        assert!(healed.is_complete());

        let pending = HealInfo {
            bricks: vec![brick_heal("s0", Some(0), true), brick_heal("s1", Some(2), true)],
        };
        assert!(!pending.is_complete());
        assert_eq!(pending.total_entries(), 2);

        let unreachable = HealInfo {
            bricks: vec![brick_heal("s0", Some(0), true), brick_heal("s1", None, false)],
        };
        assert!(!unreachable.is_complete());

        assert!(!HealInfo::default().is_complete());
    }
}
