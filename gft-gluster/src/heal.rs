// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Self-heal verbs and the parsed `heal info` view.

use crate::{gluster, gluster_xml, xml::XmlNode, CmdOutput, RemoteExec, SshError};
use gft_wire_types::{BrickHeal, HealInfo};

pub async fn heal_enable(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume heal {} enable", volname)).await
}

pub async fn heal_disable(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume heal {} disable", volname)).await
}

/// Trigger a full heal crawl.
pub async fn heal_full(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume heal {} full", volname)).await
}

/// Trigger an index heal (the default crawl).
pub async fn heal_index(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<CmdOutput, SshError> {
    gluster(exec, mnode, &format!("volume heal {}", volname)).await
}

fn brick_heal_from_node(node: &XmlNode) -> Option<BrickHeal> {
    let brick = node.text_of("name")?.parse().ok()?;
    let connected = node.text_of("status") == Some("Connected");

    // An unreachable brick prints "-" for the count.
    let entry_count = node.parse_of::<u64>("numberOfEntries");

    let entries = node
        .children_named("file")
        .map(|f| f.text.trim().to_string())
        .collect();

    Some(BrickHeal {
        brick,
        connected,
        entry_count,
        entries,
    })
}

/// Parse a `healInfo` document.
pub fn parse_heal_info(root: &XmlNode) -> Option<HealInfo> {
    let bricks = root
        .descend(&["healInfo", "bricks"])?
        .children_named("brick")
        .map(|b| brick_heal_from_node(b))
        .collect::<Option<Vec<_>>>()?;

    Some(HealInfo { bricks })
}

/// Parsed `volume heal <vol> info --xml`.
pub async fn get_heal_info(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<Option<HealInfo>, SshError> {
    let root = gluster_xml(exec, mnode, &format!("volume heal {} info", volname)).await?;

    Ok(root.as_ref().and_then(parse_heal_info))
}

/// Parsed `heal info split-brain`; same document shape, entries are the
/// split files.
pub async fn get_heal_info_split_brain(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<Option<HealInfo>, SshError> {
    let root = gluster_xml(
        exec,
        mnode,
        &format!("volume heal {} info split-brain", volname),
    )
    .await?;

    Ok(root.as_ref().and_then(parse_heal_info))
}

/// Zero pending entries on every (reachable) brick.
pub async fn is_heal_complete(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<bool, SshError> {
    let info = get_heal_info(exec, mnode, volname).await?;

    Ok(info.map(|i| i.is_complete()).unwrap_or(false))
}

/// Any file in split-brain on any brick?
pub async fn is_volume_in_split_brain(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<bool, SshError> {
    let info = get_heal_info_split_brain(exec, mnode, volname).await?;

    Ok(info.map(|i| i.total_entries() > 0).unwrap_or(false))
}

/// `heal statistics heal-count`: pending-heal count per brick, in brick
/// order, from the line output.
pub async fn get_heal_count(
    exec: &dyn RemoteExec,
    mnode: &str,
    volname: &str,
) -> Result<Option<Vec<u64>>, SshError> {
    let out = gluster(
        exec,
        mnode,
        &format!("volume heal {} statistics heal-count", volname),
    )
    .await?;

    if !out.success() {
        return Ok(None);
    }

    Ok(parse_heal_count(&out.stdout))
}

// Blocks of:
//   Brick server0:/bricks/brick0
//   Number of entries: 2
fn parse_heal_count(stdout: &str) -> Option<Vec<u64>> {
    let counts: Vec<u64> = stdout
        .lines()
        .filter_map(|l| {
            let l = l.trim();

            l.strip_prefix("Number of entries:")
                .and_then(|n| n.trim().parse().ok())
        })
        .collect();

    if counts.is_empty() {
        None
    } else {
        Some(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_cli_output;

    static HEAL_INFO_FIXTURE: &str = include_str!("fixtures/heal_info.xml");

    #[test]
    fn parses_heal_info() {
        let root = parse_cli_output(HEAL_INFO_FIXTURE).unwrap();
        let info = parse_heal_info(&root).unwrap();

        assert_eq!(info.bricks.len(), 3);

        let b0 = &info.bricks[0];
        assert!(b0.connected);
        assert_eq!(b0.entry_count, Some(2));
        assert_eq!(b0.entries, vec!["/dir1/file1", "/dir1/file2"]);

        let b2 = &info.bricks[2];
        assert!(!b2.connected);
        assert_eq!(b2.entry_count, None);

        assert!(!info.is_complete());
        assert_eq!(info.total_entries(), 2);
    }

    #[test]
    fn healed_volume_is_complete() {
        let doc = HEAL_INFO_FIXTURE
            .replace("<numberOfEntries>2</numberOfEntries>", "<numberOfEntries>0</numberOfEntries>")
            .replace("<numberOfEntries>-</numberOfEntries>", "<numberOfEntries>0</numberOfEntries>")
            .replace("<status>Transport endpoint is not connected</status>", "<status>Connected</status>")
            .replace("<file gfid=\"c6d3b4a2-53c7-4a4f-8f3a-2f9a2f1d6b7e\">/dir1/file1</file>", "")
            .replace("<file gfid=\"9e1a2b3c-4d5e-6f70-8192-a3b4c5d6e7f8\">/dir1/file2</file>", "");

        let root = parse_cli_output(&doc).unwrap();
        let info = parse_heal_info(&root).unwrap();

        assert!(info.is_complete());
    }

    #[test]
    fn heal_count_lines() {
        let stdout = "\
Gathering count of entries to be healed on volume testvol has been successful

Brick server0:/bricks/brick0
Number of entries: 2

Brick server1:/bricks/brick0
Number of entries: 0

Brick server2:/bricks/brick0
Number of entries: 1
";

        assert_eq!(parse_heal_count(stdout), Some(vec![2, 0, 1]));
        assert_eq!(parse_heal_count("Volume heal failed"), None);
    }
}
