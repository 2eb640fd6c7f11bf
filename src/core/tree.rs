//! Hierarchical report structure with citation back-references.
//!
//! Nodes are stored in an arena owned by the tree. A child can only be
//! attached to a parent that exists and is still open, so no node ever has
//! two parents and cycles cannot form.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::evidence::EvidenceId;
use crate::error::AgentError;

/// Index of a node within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// Wraps a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A titled section of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportNode {
    id: NodeId,
    parent_id: Option<NodeId>,
    title: String,
    body: String,
    evidence_refs: Vec<EvidenceId>,
    children: Vec<NodeId>,
    #[serde(skip)]
    closed: bool,
}

impl ReportNode {
    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Parent, `None` for the root.
    #[must_use]
    pub const fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    /// Section title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Section text.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Cited evidence, in citation order.
    #[must_use]
    pub fn evidence_refs(&self) -> &[EvidenceId] {
        &self.evidence_refs
    }

    /// Children, in insertion order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the node has been finalized.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

/// One record of the depth-first serialization handed to presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedNode {
    /// Distance from the root (root = 0).
    pub depth: usize,
    /// Section title.
    pub title: String,
    /// Section text.
    pub body: String,
    /// Cited evidence ids.
    pub cited_evidence: Vec<EvidenceId>,
}

/// The report tree of a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportTree {
    nodes: Vec<ReportNode>,
}

impl ReportTree {
    /// Creates an empty tree.
    #[must_use]
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Creates the root node, open and without content.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::RootExists`] if the tree already has a root.
    pub fn create_root(&mut self, title: impl Into<String>) -> Result<NodeId, AgentError> {
        if !self.nodes.is_empty() {
            return Err(AgentError::RootExists);
        }
        Ok(self.push(None, title.into(), String::new(), Vec::new()))
    }

    /// Attaches a new open child under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnknownParent`] if `parent` is not in the tree,
    /// or [`AgentError::ParentClosed`] if it has been finalized.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        title: impl Into<String>,
        body: impl Into<String>,
        evidence_refs: Vec<EvidenceId>,
    ) -> Result<NodeId, AgentError> {
        match self.nodes.get(parent.0) {
            None => return Err(AgentError::UnknownParent { parent }),
            Some(node) if node.closed => return Err(AgentError::ParentClosed { parent }),
            Some(_) => {}
        }
        let id = self.push(Some(parent), title.into(), body.into(), evidence_refs);
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.push(id);
        }
        Ok(id)
    }

    /// Replaces the body and citations of an open node.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnknownParent`] for a missing node and
    /// [`AgentError::ParentClosed`] for a finalized one.
    pub fn set_content(
        &mut self,
        id: NodeId,
        body: impl Into<String>,
        evidence_refs: Vec<EvidenceId>,
    ) -> Result<(), AgentError> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or(AgentError::UnknownParent { parent: id })?;
        if node.closed {
            return Err(AgentError::ParentClosed { parent: id });
        }
        node.body = body.into();
        node.evidence_refs = evidence_refs;
        Ok(())
    }

    /// Finalizes a node. No further children or content changes are accepted.
    /// Closing an already closed node is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnknownParent`] if the node is not in the tree.
    pub fn close(&mut self, id: NodeId) -> Result<(), AgentError> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or(AgentError::UnknownParent { parent: id })?;
        node.closed = true;
        Ok(())
    }

    /// Root node, if created.
    #[must_use]
    pub fn root(&self) -> Option<&ReportNode> {
        self.nodes.first()
    }

    /// Node lookup.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&ReportNode> {
        self.nodes.get(id.0)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no root yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &ReportNode> {
        self.nodes.iter()
    }

    /// Every evidence id cited anywhere in the tree.
    #[must_use]
    pub fn cited_evidence(&self) -> BTreeSet<&EvidenceId> {
        self.nodes.iter().flat_map(|n| n.evidence_refs.iter()).collect()
    }

    /// Depth-first, pre-order serialization preserving child insertion order.
    ///
    /// Pure: repeated calls on an unmodified tree return identical output.
    #[must_use]
    pub fn serialize(&self) -> Vec<SerializedNode> {
        let mut records = Vec::with_capacity(self.nodes.len());
        if self.nodes.is_empty() {
            return records;
        }

        let mut stack: Vec<(NodeId, usize)> = vec![(NodeId(0), 0)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(id.0) else {
                continue;
            };
            records.push(SerializedNode {
                depth,
                title: node.title.clone(),
                body: node.body.clone(),
                cited_evidence: node.evidence_refs.clone(),
            });
            for &child in node.children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        records
    }

    fn push(
        &mut self,
        parent_id: Option<NodeId>,
        title: String,
        body: String,
        evidence_refs: Vec<EvidenceId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ReportNode {
            id,
            parent_id,
            title,
            body,
            evidence_refs,
            children: Vec::new(),
            closed: false,
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn refs(ids: &[&str]) -> Vec<EvidenceId> {
        ids.iter().map(|s| EvidenceId::new(*s)).collect()
    }

    #[test]
    fn test_unknown_parent() {
        let mut tree = ReportTree::new();
        let result = tree.add_child(NodeId::new(3), "Findings", "", Vec::new());
        assert!(matches!(result, Err(AgentError::UnknownParent { .. })));

        let _ = tree.create_root("Report").unwrap_or_else(|_| unreachable!());
        let result = tree.add_child(NodeId::new(7), "Findings", "", Vec::new());
        assert!(matches!(
            result,
            Err(AgentError::UnknownParent { parent }) if parent == NodeId::new(7)
        ));
    }

    #[test]
    fn test_parent_closed() {
        let mut tree = ReportTree::new();
        let root = tree.create_root("Answer").unwrap_or_else(|_| unreachable!());
        tree.close(root).unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            tree.add_child(root, "Late", "", Vec::new()),
            Err(AgentError::ParentClosed { .. })
        ));
        assert!(matches!(
            tree.set_content(root, "text", Vec::new()),
            Err(AgentError::ParentClosed { .. })
        ));
    }

    #[test]
    fn test_second_root_rejected() {
        let mut tree = ReportTree::new();
        assert!(tree.create_root("one").is_ok());
        assert!(matches!(tree.create_root("two"), Err(AgentError::RootExists)));
    }

    #[test]
    fn test_serialize_depth_first_in_insertion_order() {
        let mut tree = ReportTree::new();
        let root = tree.create_root("Report").unwrap_or_else(|_| unreachable!());
        let a = tree
            .add_child(root, "Findings", "a", refs(&["e1"]))
            .unwrap_or_else(|_| unreachable!());
        let _a1 = tree
            .add_child(a, "Detail", "a1", refs(&["e2"]))
            .unwrap_or_else(|_| unreachable!());
        let _b = tree
            .add_child(root, "Recommendations", "b", refs(&["e3"]))
            .unwrap_or_else(|_| unreachable!());

        let records = tree.serialize();
        let shape: Vec<(usize, &str)> = records.iter().map(|r| (r.depth, r.title.as_str())).collect();
        assert_eq!(
            shape,
            vec![(0, "Report"), (1, "Findings"), (2, "Detail"), (1, "Recommendations")]
        );
        assert_eq!(records[2].cited_evidence, refs(&["e2"]));
        assert_eq!(tree.cited_evidence().len(), 3);
    }

    #[test]
    fn test_empty_tree_serializes_empty() {
        assert!(ReportTree::new().serialize().is_empty());
    }

    proptest! {
        #[test]
        fn prop_serialize_is_idempotent(parents in prop::collection::vec(0usize..8, 0..20)) {
            let mut tree = ReportTree::new();
            let _ = tree.create_root("root");
            for (i, p) in parents.iter().enumerate() {
                let parent = NodeId::new(p % tree.len());
                let _ = tree.add_child(parent, format!("node {i}"), "", Vec::new());
            }
            let first = tree.serialize();
            let second = tree.serialize();
            prop_assert_eq!(first.len(), tree.len());
            prop_assert_eq!(first, second);
        }
    }
}
