// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Event-reader over the CLI's `--xml` documents.
//!
//! The CLI nests everything under `<cliOutput>` with values as element text
//! (attributes are only used for gfids). The whole document is small, so it
//! is folded into an [`XmlNode`] tree and the accessors walk it by element
//! name.

use quick_xml::{events::Event, Reader};

/// One element: its name, accumulated text, and children in document order.
#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn new(name: &str) -> Self {
        XmlNode {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// First child with the given element name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given element name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Walk a path of element names from this node.
    pub fn descend(&self, path: &[&str]) -> Option<&XmlNode> {
        path.iter()
            .try_fold(self, |node, name| node.child(name))
    }

    /// Trimmed text of a direct child.
    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }

    /// Text of a child parsed into `T`. Absent and unparseable are both
    /// `None`; the accessors treat them the same.
    pub fn parse_of<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.text_of(name)?.parse().ok()
    }
}

/// Parse a full document into a tree rooted at the document element.
pub fn parse_tree(xml: &str) -> Option<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = vec![];
    // Sentinel root so End events always have a parent to pop into.
    let mut stack: Vec<XmlNode> = vec![XmlNode::new("#document")];

    loop {
        let event = reader.read_event(&mut buf).ok()?;

        match event {
            Event::Start(ref e) => {
                let name = std::str::from_utf8(e.name()).ok()?.to_string();

                stack.push(XmlNode::new(&name));
            }
            Event::Empty(ref e) => {
                let name = std::str::from_utf8(e.name()).ok()?.to_string();

                stack.last_mut()?.children.push(XmlNode::new(&name));
            }
            Event::Text(ref e) => {
                let t = e.unescape_and_decode(&reader).ok()?;

                stack.last_mut()?.text.push_str(&t);
            }
            Event::End(_) => {
                let node = stack.pop()?;

                // More Ends than Starts: not a document we produced.
                if stack.is_empty() {
                    return None;
                }

                stack.last_mut()?.children.push(node);
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if stack.len() != 1 {
        // Unbalanced: an element never closed.
        return None;
    }

    stack.pop()?.children.into_iter().next()
}

/// Parse a CLI document and return the `<cliOutput>` root, but only when
/// the CLI itself reported success (`opRet == 0`).
pub fn parse_cli_output(xml: &str) -> Option<XmlNode> {
    let root = parse_tree(xml)?;

    if root.name != "cliOutput" {
        return None;
    }

    let op_ret: i32 = root.parse_of("opRet")?;

    if op_ret != 0 {
        tracing::debug!(
            op_ret,
            errstr = root.text_of("opErrstr").unwrap_or(""),
            "CLI reported failure inside xml"
        );

        return None;
    }

    Some(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_tree() {
        let doc = r#"<?xml version="1.0"?>
<cliOutput>
  <opRet>0</opRet>
  <opErrno>0</opErrno>
  <opErrstr/>
  <volInfo>
    <volumes>
      <volume><name>alpha</name></volume>
      <volume><name>beta</name></volume>
    </volumes>
  </volInfo>
</cliOutput>"#;

        let root = parse_cli_output(doc).unwrap();

        assert_eq!(root.name, "cliOutput");

        let vols: Vec<_> = root
            .descend(&["volInfo", "volumes"])
            .unwrap()
            .children_named("volume")
            .filter_map(|v| v.text_of("name"))
            .collect();

        assert_eq!(vols, vec!["alpha", "beta"]);
    }

    #[test]
    fn nonzero_opret_is_none() {
        let doc = r#"<cliOutput><opRet>-1</opRet><opErrstr>Volume does not exist</opErrstr></cliOutput>"#;

        assert!(parse_cli_output(doc).is_none());
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_cli_output("volume info: command not found").is_none());
        assert!(parse_cli_output("<cliOutput><opRet>0</opRet>").is_none());
        assert!(parse_cli_output("").is_none());
    }

    #[test]
    fn empty_elements_become_children() {
        let root = parse_tree("<a><b/><c>x</c></a>").unwrap();

        assert!(root.child("b").is_some());
        assert_eq!(root.text_of("c"), Some("x"));
        assert_eq!(root.parse_of::<u32>("c"), None);
    }
}
