// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Process-wide cluster description and the brick/mount inventory.
//!
//! The config is read once at startup and never mutated; the [`Inventory`]
//! built from it is the only mutable piece, and it is only touched from the
//! single driver task (volume setup and cleanup).

mod inventory;

pub use inventory::{Inventory, InventoryError};

use std::{collections::BTreeMap, path::Path};

pub const CONFIG_ENV_VAR: &str = "GFT_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error("{} environment variable is not set and no --config was given", CONFIG_ENV_VAR)]
    NoConfigPath,
    #[error("config declares no servers")]
    NoServers,
    #[error("config declares no clients")]
    NoClients,
    #[error("server {0} has no storage section")]
    NoStorage(String),
}

/// Storage description of one server host.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServerInfo {
    /// Directory under which brick directories are created.
    pub bricks_root: String,
    /// Pre-declared brick paths, consumed in order. When empty, paths are
    /// generated as `<bricks_root>/brick{0..n}`.
    #[serde(default)]
    pub brick_paths: Vec<String>,
    /// How many paths to generate when `brick_paths` is empty.
    #[serde(default = "default_brick_slots")]
    pub brick_slots: usize,
}

fn default_brick_slots() -> usize {
    20
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Timeouts {
    /// Budget for "all processes online" after volume start, seconds.
    #[serde(default = "default_online")]
    pub processes_online: u64,
    /// Budget for heal completion, seconds.
    #[serde(default = "default_heal")]
    pub heal: u64,
    /// Budget for rebalance / remove-brick completion, seconds.
    #[serde(default = "default_rebalance")]
    pub rebalance: u64,
}

fn default_online() -> u64 {
    600
}
fn default_heal() -> u64 {
    600
}
fn default_rebalance() -> u64 {
    1200
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            processes_online: default_online(),
            heal: default_heal(),
            rebalance: default_rebalance(),
        }
    }
}

/// The whole cluster description. Loaded once; handed around by reference.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Server pool, in order. The first entry is the management node.
    pub servers: Vec<String>,
    /// Client pool, in order.
    pub clients: Vec<String>,
    #[serde(default = "default_user")]
    pub user: String,
    /// Private key for the ssh executor; `None` falls through to the agent.
    #[serde(default)]
    pub ssh_key: Option<String>,
    /// Per-server storage, keyed by the server's host identifier.
    pub servers_info: BTreeMap<String, ServerInfo>,
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Credentials for SMB mounts.
    #[serde(default = "default_user")]
    pub smb_user: String,
    #[serde(default)]
    pub smb_passwd: String,
}

fn default_user() -> String {
    "root".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&s)?;

        config.validate()?;

        Ok(config)
    }

    /// Load from the path named by `GFT_CONFIG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV_VAR).map_err(|_| ConfigError::NoConfigPath)?;

        Self::load(path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }

        if self.clients.is_empty() {
            return Err(ConfigError::NoClients);
        }

        for s in &self.servers {
            if !self.servers_info.contains_key(s) {
                return Err(ConfigError::NoStorage(s.clone()));
            }
        }

        Ok(())
    }

    /// The canonical management node: first server in the pool.
    pub fn mnode(&self) -> &str {
        &self.servers[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const FIXTURE: &str = r#"
servers = ["server0", "server1", "server2"]
clients = ["client0", "client1"]
user = "root"

[servers_info.server0]
bricks_root = "/bricks"
brick_slots = 4

[servers_info.server1]
bricks_root = "/bricks"
brick_slots = 4

[servers_info.server2]
bricks_root = "/bricks"
brick_paths = ["/bricks/brick_a", "/bricks/brick_b"]

[timeouts]
heal = 300
"#;

    pub(crate) fn fixture() -> Config {
        toml::from_str(FIXTURE).unwrap()
    }

    #[test]
    fn parses_fixture() {
        let c = fixture();

        assert_eq!(c.mnode(), "server0");
        assert_eq!(c.clients.len(), 2);
        assert_eq!(c.servers_info["server2"].brick_paths.len(), 2);
        assert_eq!(c.timeouts.heal, 300);
        // Defaults fill in what the file omits.
        assert_eq!(c.timeouts.rebalance, 1200);
        assert_eq!(c.user, "root");
    }

    #[test]
    fn load_rejects_missing_storage() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
servers = ["server0"]
clients = ["client0"]
[servers_info.other]
bricks_root = "/bricks"
"#
        )
        .unwrap();

        let r = Config::load(f.path());

        assert!(matches!(r, Err(ConfigError::NoStorage(_))));
    }
}
