// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PeerState {
    Connected,
    Disconnected,
    Rejected,
}

/// One peer out of `peer status` / `pool list`.
///
/// `hostname` is stored exactly as the CLI printed it (IP, short name or
/// FQDN); no normalization happens here. `aliases` carries the CLI's
/// "Other names" so a caller probing by IP can still match a peer that
/// registered under its FQDN.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PeerEntry {
    pub uuid: String,
    pub hostname: String,
    pub aliases: Vec<String>,
    pub state: PeerState,
    /// The raw `stateStr`, kept for assertion messages.
    pub state_str: String,
}

impl PeerEntry {
    /// Does this peer answer to `host` under any of its names?
    pub fn answers_to(&self, host: &str) -> bool {
        self.hostname == host || self.aliases.iter().any(|a| a == host)
    }

    pub fn is_connected(&self) -> bool {
        self.state == PeerState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_to_matches_aliases() {
        let p = PeerEntry {
            uuid: "2c358a59-4a6b-4a2d-968e-9d6b3c8325d0".into(),
            hostname: "server1.lab.example.com".into(),
            aliases: vec!["10.70.47.12".into()],
            state: PeerState::Connected,
            state_str: "Peer in Cluster".into(),
        };

        assert!(p.answers_to("server1.lab.example.com"));
        assert!(p.answers_to("10.70.47.12"));
        assert!(!p.answers_to("server1"));
    }
}
