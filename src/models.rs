//! Core data models shared by the store, traversal, and writer.
//!
//! These types describe what flows through one export job: the manifest
//! fetched for each entity, the traversal node that scheduled it, and the
//! outcome folded back into the summary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Component name of the primary descriptive metadata record.
pub const METADATA_COMPONENT: &str = "metadata.json";
/// Component name of the long-form description.
pub const DESCRIPTION_COMPONENT: &str = "description.md";
/// Component name of the embedded relationship graph.
pub const GRAPH_COMPONENT: &str = "graph.json";
/// Suffix of referenced-file descriptor components.
pub const REF_SUFFIX: &str = ".ref.json";

/// Versioned index of one entity's named components.
///
/// Fetched exactly once per visit and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityManifest {
    pub pi: String,
    pub ver: u64,
    pub manifest_cid: String,
    /// Manifest timestamp as published by the store (RFC 3339).
    #[serde(default)]
    pub ts: String,
    /// Component name → content fingerprint, ordered by name.
    #[serde(default)]
    pub components: BTreeMap<String, String>,
    #[serde(default)]
    pub parent_pi: Option<String>,
    #[serde(default)]
    pub children_pi: Option<Vec<String>>,
}

impl EntityManifest {
    pub fn component(&self, name: &str) -> Option<&str> {
        self.components.get(name).map(String::as_str)
    }

    /// Child identifiers, empty when the manifest lists none.
    pub fn children(&self) -> &[String] {
        self.children_pi.as_deref().unwrap_or(&[])
    }
}

/// One scheduled visit in the breadth-first walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalNode {
    pub depth: usize,
    pub pi: String,
    pub parent_pi: Option<String>,
    /// Identifiers from the root down to and including this node.
    pub path: Vec<String>,
}

impl TraversalNode {
    pub fn root(pi: &str) -> Self {
        Self {
            depth: 0,
            pi: pi.to_string(),
            parent_pi: None,
            path: vec![pi.to_string()],
        }
    }

    /// Build the node for a child discovered under `self`.
    pub fn child(&self, pi: &str) -> Self {
        let mut path = self.path.clone();
        path.push(pi.to_string());
        Self {
            depth: self.depth + 1,
            pi: pi.to_string(),
            parent_pi: Some(self.pi.clone()),
            path,
        }
    }
}

/// Classification of one visited entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    /// Written to the output in degraded form; children are still traversed.
    Incomplete,
    /// Excluded from the output; children are not traversed.
    Error,
}

/// Per-entity result returned by a worker task to the coordinator.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub pi: String,
    pub status: OutcomeStatus,
    pub children: Vec<String>,
    pub reason: Option<String>,
}

impl ExportOutcome {
    pub fn success(pi: &str, children: Vec<String>) -> Self {
        Self {
            pi: pi.to_string(),
            status: OutcomeStatus::Success,
            children,
            reason: None,
        }
    }

    pub fn incomplete(pi: &str, children: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            pi: pi.to_string(),
            status: OutcomeStatus::Incomplete,
            children,
            reason: Some(reason.into()),
        }
    }

    pub fn error(pi: &str, reason: impl Into<String>) -> Self {
        Self {
            pi: pi.to_string(),
            status: OutcomeStatus::Error,
            children: Vec::new(),
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_node_extends_path_and_depth() {
        let root = TraversalNode::root("A");
        let child = root.child("B");
        let grandchild = child.child("C");
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_pi.as_deref(), Some("A"));
        assert_eq!(grandchild.depth, 2);
        assert_eq!(grandchild.path, vec!["A", "B", "C"]);
    }

    #[test]
    fn manifest_deserializes_without_optional_fields() {
        let json = r#"{"pi":"01X","ver":3,"manifest_cid":"bafyM","components":{"metadata.json":"bafyA"}}"#;
        let m: EntityManifest = serde_json::from_str(json).unwrap();
        assert_eq!(m.component(METADATA_COMPONENT), Some("bafyA"));
        assert!(m.children().is_empty());
        assert!(m.parent_pi.is_none());
    }

    #[test]
    fn error_outcome_has_no_children() {
        let o = ExportOutcome::error("01X", "boom");
        assert_eq!(o.status, OutcomeStatus::Error);
        assert!(o.children.is_empty());
    }
}
