// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Peer membership verbs and parsed peer views.

use crate::{gluster, gluster_xml, xml::XmlNode, CmdOutput, RemoteExec, SshError};
use gft_wire_types::{PeerEntry, PeerState};

pub async fn peer_probe(
    exec: &dyn RemoteExec,
    mnode: &str,
    host: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("peer probe {}", host)).await
}

pub async fn peer_detach(
    exec: &dyn RemoteExec,
    mnode: &str,
    host: &str,
    force: bool,
) -> Result<CmdOutput, SshError> {
    let force = if force { " force" } else { "" };

    gluster(exec, mnode, &format!("peer detach {}{}", host, force)).await
}

/// Raw `peer status`, for tests asserting on the CLI's message.
pub async fn peer_status_raw(exec: &dyn RemoteExec, mnode: &str) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, "peer status").await
}

fn peer_from_node(node: &XmlNode) -> Option<PeerEntry> {
    let connected: u8 = node.parse_of("connected")?;
    let state_str = node.text_of("stateStr")?.to_string();

    // `Peer Rejected` shows up inside longer stateStr values
    // (e.g. "Peer Rejected (Connected)").
    let state = if state_str.contains("Rejected") {
        PeerState::Rejected
    } else if connected == 1 {
        PeerState::Connected
    } else {
        PeerState::Disconnected
    };

    let hostname = node.text_of("hostname")?.to_string();

    let aliases = node
        .child("hostnames")
        .map(|h| {
            h.children_named("hostname")
                .map(|x| x.text.trim().to_string())
                .filter(|x| *x != hostname)
                .collect()
        })
        .unwrap_or_default();

    Some(PeerEntry {
        uuid: node.text_of("uuid")?.to_string(),
        hostname,
        aliases,
        state,
        state_str,
    })
}

/// Parse a `peerStatus` document (shared by `peer status` and `pool list`).
pub fn parse_peer_status(root: &XmlNode) -> Option<Vec<PeerEntry>> {
    let status = root.child("peerStatus")?;

    status.children_named("peer").map(|p| peer_from_node(p)).collect()
}

/// Peers known to `mnode`, excluding itself.
pub async fn get_peer_status(
    exec: &dyn RemoteExec,
    mnode: &str,
) -> Result<Option<Vec<PeerEntry>>, SshError> {
    let root = gluster_xml(exec, mnode, "peer status").await?;

    Ok(root.as_ref().and_then(parse_peer_status))
}

/// The whole pool, including `mnode` itself (`pool list`).
pub async fn get_pool_list(
    exec: &dyn RemoteExec,
    mnode: &str,
) -> Result<Option<Vec<PeerEntry>>, SshError> {
    let root = gluster_xml(exec, mnode, "pool list").await?;

    Ok(root.as_ref().and_then(parse_peer_status))
}

/// Does `peer status` on `mnode` show every listed host Connected?
///
/// A host matches a peer under any of its printed names; `mnode` itself is
/// trivially connected.
pub async fn is_peer_connected(
    exec: &dyn RemoteExec,
    mnode: &str,
    hosts: &[String],
) -> Result<bool, SshError> {
    let peers = match get_peer_status(exec, mnode).await? {
        Some(x) => x,
        None => return Ok(false),
    };

    let all = hosts.iter().all(|h| {
        h == mnode
            || peers
                .iter()
                .any(|p| p.answers_to(h) && p.is_connected())
    });

    Ok(all)
}

/// Probe every host and verify the pool afterwards. Used by tests that
/// detached peers to restore the canonical pool in teardown.
pub async fn peer_probe_servers(
    exec: &dyn RemoteExec,
    mnode: &str,
    hosts: &[String],
) -> Result<bool, SshError> {
    for h in hosts {
        if h == mnode {
            continue;
        }

        let out = peer_probe(exec, mnode, h).await?;

        // "already in peer list" exits zero; anything else non-zero is real.
        if !out.success() {
            tracing::warn!(host = %h, stderr = %out.stderr, "peer probe failed");

            return Ok(false);
        }
    }

    is_peer_connected(exec, mnode, hosts).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_cli_output;

    static PEER_STATUS_FIXTURE: &str = include_str!("fixtures/peer_status.xml");

    #[test]
    fn parses_peer_status() {
        let root = parse_cli_output(PEER_STATUS_FIXTURE).unwrap();
        let peers = parse_peer_status(&root).unwrap();

        assert_eq!(peers.len(), 2);

        assert_eq!(peers[0].hostname, "server1.lab.example.com");
        assert_eq!(peers[0].aliases, vec!["10.70.47.12".to_string()]);
        assert_eq!(peers[0].state, PeerState::Connected);

        assert_eq!(peers[1].hostname, "10.70.47.13");
        assert_eq!(peers[1].state, PeerState::Disconnected);
        assert_eq!(peers[1].state_str, "Peer in Cluster");
    }

    #[test]
    fn rejected_state_wins_over_connected() {
        let doc = r#"<cliOutput><opRet>0</opRet><peerStatus>
<peer><uuid>u</uuid><hostname>h</hostname><connected>1</connected>
<state>6</state><stateStr>Peer Rejected (Connected)</stateStr></peer>
</peerStatus></cliOutput>"#;

        let root = parse_cli_output(doc).unwrap();
        let peers = parse_peer_status(&root).unwrap();

        assert_eq!(peers[0].state, PeerState::Rejected);
    }

    #[test]
    fn missing_fields_fail_the_whole_parse() {
        let doc = r#"<cliOutput><opRet>0</opRet><peerStatus>
<peer><hostname>h</hostname><connected>1</connected></peer>
</peerStatus></cliOutput>"#;

        let root = parse_cli_output(doc).unwrap();

        // No uuid and no stateStr: the accessor must not half-populate.
        assert!(parse_peer_status(&root).is_none());
    }
}
