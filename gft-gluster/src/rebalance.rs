// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Rebalance verbs and the parsed status view.

use crate::{gluster, gluster_xml, xml::XmlNode, CmdOutput, RemoteExec, SshError};
use gft_wire_types::{RebalanceStats, RebalanceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceMode {
    Plain,
    Force,
    FixLayout,
}

pub async fn rebalance_start(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
    mode: RebalanceMode,
) -> Result<CmdOutput, SshError> {
    let args = match mode {
        RebalanceMode::Plain => format!("volume rebalance {} start", volname),
        RebalanceMode::Force => format!("volume rebalance {} start force", volname),
        RebalanceMode::FixLayout => format!("volume rebalance {} fix-layout start", volname),
    };

    gluster(exec, mnode, &args).await
}

pub async fn rebalance_stop(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume rebalance {} stop", volname)).await
}

fn stats_from_node(node: &XmlNode, name_tag: &str) -> Option<RebalanceStats> {
    Some(RebalanceStats {
        node: node.text_of(name_tag).unwrap_or("aggregate").to_string(),
        rebalanced: node.parse_of("files")?,
        scanned: node.parse_of("lookups")?,
        failures: node.parse_of("failures")?,
        skipped: node.parse_of("skipped")?,
        size: node.parse_of("size")?,
        status: node
            .text_of("statusStr")
            .or_else(|| node.text_of("status"))?
            .parse()
            .ok()?,
        status_str: node.text_of("statusStr").unwrap_or_default().to_string(),
    })
}

/// Parse a `volRebalance` document.
pub fn parse_rebalance_status(root: &XmlNode) -> Option<RebalanceStatus> {
    let reb = root.child("volRebalance")?;

    let nodes = reb
        .children_named("node")
        .map(|n| stats_from_node(n, "nodeName"))
        .collect::<Option<Vec<_>>>()?;

    Some(RebalanceStatus {
        task_id: reb.text_of("task-id").unwrap_or_default().to_string(),
        nodes,
        aggregate: stats_from_node(reb.child("aggregate")?, "nodeName")?,
    })
}

/// Parsed `volume rebalance <vol> status --xml`.
pub async fn get_rebalance_status(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<Option<RebalanceStatus>, SshError> {
    let root = gluster_xml(exec, mnode, &format!("volume rebalance {} status", volname)).await?;

    Ok(root.as_ref().and_then(parse_rebalance_status))
}
