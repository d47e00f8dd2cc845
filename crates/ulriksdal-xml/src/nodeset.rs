#![forbid(unsafe_code)]

//! NodeSet type for XML canonicalization and transforms.
//!
//! A `NodeSet` represents a set of nodes from an XML document, identified by
//! their `NodeId`.  It supports the set operations needed by the
//! enveloped-signature and XPath signature-filter transforms.

use roxmltree::{Document, Node, NodeId, NodeType};
use std::collections::HashSet;

/// Index of a node, stable for the lifetime of the parsed document.
pub fn node_index(node: Node<'_, '_>) -> usize {
    node.id().get_usize()
}

/// A set of XML document nodes identified by `NodeId`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: HashSet<usize>,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node set containing all nodes in the document.
    pub fn all(doc: &Document<'_>) -> Self {
        Self {
            nodes: doc.descendants().map(node_index).collect(),
        }
    }

    /// Create a node set containing all nodes except comments.
    /// `URI=""` selects the document without comments.
    pub fn all_without_comments(doc: &Document<'_>) -> Self {
        Self {
            nodes: doc
                .descendants()
                .filter(|n| n.node_type() != NodeType::Comment)
                .map(node_index)
                .collect(),
        }
    }

    /// Create a node set for a subtree rooted at the given node (without comments).
    pub fn tree_without_comments(root: Node<'_, '_>) -> Self {
        let mut nodes = HashSet::new();
        collect_subtree(root, &mut nodes, false);
        Self { nodes }
    }

    /// Create a node set for a subtree rooted at the given node (with comments).
    pub fn tree_with_comments(root: Node<'_, '_>) -> Self {
        let mut nodes = HashSet::new();
        collect_subtree(root, &mut nodes, true);
        Self { nodes }
    }

    /// Check if a node is in this set.
    pub fn contains(&self, node: Node<'_, '_>) -> bool {
        self.nodes.contains(&node_index(node))
    }

    /// Check if a node id is in this set.
    pub fn contains_id(&self, id: NodeId) -> bool {
        self.nodes.contains(&id.get_usize())
    }

    /// Add a node to this set.
    pub fn insert(&mut self, node: Node<'_, '_>) {
        self.nodes.insert(node_index(node));
    }

    /// Remove a node from this set.
    pub fn remove(&mut self, node: Node<'_, '_>) {
        self.nodes.remove(&node_index(node));
    }

    /// Remove `root` and all of its descendants.
    pub fn remove_subtree(&mut self, root: Node<'_, '_>) {
        for n in root.descendants() {
            self.nodes.remove(&node_index(n));
        }
    }

    /// Compute the intersection of two node sets.
    pub fn intersection(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.intersection(&other.nodes).copied().collect(),
        }
    }

    /// Compute the union of two node sets.
    pub fn union(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.union(&other.nodes).copied().collect(),
        }
    }

    /// Compute self - other (subtraction).
    pub fn subtract(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.difference(&other.nodes).copied().collect(),
        }
    }

    /// Check if this set is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes in the set.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

fn collect_subtree(node: Node<'_, '_>, set: &mut HashSet<usize>, include_comments: bool) {
    if !include_comments && node.node_type() == NodeType::Comment {
        return;
    }
    set.insert(node_index(node));
    for child in node.children() {
        collect_subtree(child, set, include_comments);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtree_and_comments() {
        let xml = "<a><!--c--><b><c/></b>t</a>";
        let doc = crate::parse(xml).unwrap();
        let all = NodeSet::all(&doc);
        let no_comments = NodeSet::all_without_comments(&doc);
        assert_eq!(all.len(), no_comments.len() + 1);

        let b = doc.descendants().find(|n| n.has_tag_name("b")).unwrap();
        let tree = NodeSet::tree_without_comments(b);
        assert_eq!(tree.len(), 2);

        let mut rest = no_comments.clone();
        rest.remove_subtree(b);
        assert!(!rest.contains(b));
        assert!(rest.contains(doc.root_element()));
        assert_eq!(no_comments.subtract(&tree), rest);
    }
}
