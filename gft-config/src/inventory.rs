// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

use crate::Config;
use gft_wire_types::{BrickRef, MountDescriptor, MountType};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("no free brick path left on {0}")]
    NoFreeBrickPath(String),
    #[error("{0} is not a configured server")]
    UnknownServer(String),
    #[error("no client available")]
    NoClients,
}

/// Deterministic, reproducible hardware assignment.
///
/// Brick paths are consumed front-to-back per server and must be released
/// (after the lifecycle wiped them) before they can be handed out again.
/// All access happens from the single driver task, so there is no lock.
#[derive(Debug)]
pub struct Inventory {
    free: BTreeMap<String, VecDeque<String>>,
    clients: Vec<String>,
    user: String,
}

impl Inventory {
    pub fn new(config: &Config) -> Self {
        let free = config
            .servers
            .iter()
            .map(|server| {
                let info = &config.servers_info[server];

                let paths: VecDeque<String> = if info.brick_paths.is_empty() {
                    (0..info.brick_slots)
                        .map(|n| format!("{}/brick{}", info.bricks_root.trim_end_matches('/'), n))
                        .collect()
                } else {
                    info.brick_paths.iter().cloned().collect()
                };

                (server.clone(), paths)
            })
            .collect();

        Inventory {
            free,
            clients: config.clients.clone(),
            user: config.user.clone(),
        }
    }

    /// Next unused brick path on `server`; the path is marked consumed.
    pub fn brick_path_for(&mut self, server: &str) -> Result<String, InventoryError> {
        let q = self
            .free
            .get_mut(server)
            .ok_or_else(|| InventoryError::UnknownServer(server.to_string()))?;

        q.pop_front()
            .ok_or_else(|| InventoryError::NoFreeBrickPath(server.to_string()))
    }

    /// Return wiped brick paths to the free pool. Unknown hosts are ignored
    /// so a teardown cannot fail here.
    pub fn release_bricks(&mut self, bricks: &[BrickRef]) {
        for b in bricks {
            if let Some(q) = self.free.get_mut(&b.host) {
                // Push to the back: the next volume prefers untouched paths.
                if !q.contains(&b.path) {
                    q.push_back(b.path.clone());
                }
            }
        }
    }

    /// Total free paths across all servers, for exhaustion diagnostics and
    /// invariant checks.
    pub fn total_free(&self) -> usize {
        self.free.values().map(|q| q.len()).sum()
    }

    /// One mount descriptor per client, with the stable path template
    /// `/mnt/<volname>_<mtype>_<n>`.
    pub fn mounts_for(
        &self,
        volname: &str,
        mtype: MountType,
        server: &str,
    ) -> Result<Vec<MountDescriptor>, InventoryError> {
        if self.clients.is_empty() {
            return Err(InventoryError::NoClients);
        }

        let xs = self
            .clients
            .iter()
            .enumerate()
            .map(|(n, client)| MountDescriptor {
                volname: volname.to_string(),
                mtype,
                mpoint: format!("/mnt/{}_{}_{}", volname, mtype, n),
                client: client.clone(),
                server: server.to_string(),
                user: self.user.clone(),
                options: vec![],
            })
            .collect();

        Ok(xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        toml::from_str(crate::tests::FIXTURE).unwrap()
    }

    #[test]
    fn paths_are_consumed_in_order() {
        let c = config();
        let mut inv = Inventory::new(&c);

        assert_eq!(inv.brick_path_for("server0").unwrap(), "/bricks/brick0");
        assert_eq!(inv.brick_path_for("server0").unwrap(), "/bricks/brick1");
        assert_eq!(inv.brick_path_for("server2").unwrap(), "/bricks/brick_a");
    }

    #[test]
    fn never_aliases_without_release() {
        let c = config();
        let mut inv = Inventory::new(&c);

        let mut seen = std::collections::HashSet::new();

        while let Ok(p) = inv.brick_path_for("server0") {
            assert!(seen.insert(p));
        }

        assert_eq!(seen.len(), 4);
        assert!(matches!(
            inv.brick_path_for("server0"),
            Err(InventoryError::NoFreeBrickPath(_))
        ));
    }

    #[test]
    fn release_restores_the_pool() {
        let c = config();
        let mut inv = Inventory::new(&c);
        let before = inv.total_free();

        let p0 = inv.brick_path_for("server0").unwrap();
        let p1 = inv.brick_path_for("server1").unwrap();

        assert_eq!(inv.total_free(), before - 2);

        inv.release_bricks(&[
            BrickRef::new("server0", &p0),
            BrickRef::new("server1", &p1),
        ]);

        assert_eq!(inv.total_free(), before);

        // Releasing twice must not duplicate a path.
        inv.release_bricks(&[BrickRef::new("server0", &p0)]);
        assert_eq!(inv.total_free(), before);
    }

    #[test]
    fn unknown_server_is_an_error() {
        let c = config();
        let mut inv = Inventory::new(&c);

        assert!(matches!(
            inv.brick_path_for("nonesuch"),
            Err(InventoryError::UnknownServer(_))
        ));
    }

    #[test]
    fn mount_points_follow_the_template() {
        let c = config();
        let inv = Inventory::new(&c);

        let mounts = inv
            .mounts_for("testvol-distributed-fuse", MountType::Fuse, "server0")
            .unwrap();

        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].mpoint, "/mnt/testvol-distributed-fuse_fuse_0");
        assert_eq!(mounts[1].client, "client1");
        assert_eq!(mounts[1].server, "server0");
    }
}
