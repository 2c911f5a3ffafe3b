//! Edge types for workflow graphs.
//!
//! Edges define control flow between nodes. A non-branching node has at
//! most one outgoing edge, always unlabeled. A branching node (condition,
//! menu) has one outgoing edge per branch label, and the label is the
//! only thing that disambiguates them.

use serde::{Deserialize, Serialize};

/// A directed edge in a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Branch label. `None` for the single edge of a non-branching node;
    /// `"true"`/`"false"` for condition edges, an option key for menu edges.
    pub label: Option<String>,
}

impl Edge {
    /// Creates an unlabeled edge.
    #[must_use]
    pub fn unlabeled() -> Self {
        Self { label: None }
    }

    /// Creates a labeled edge.
    #[must_use]
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }

    /// Returns true if this edge carries the given branch label.
    #[must_use]
    pub fn matches(&self, branch: &str) -> bool {
        self.label.as_deref() == Some(branch)
    }
}

impl Default for Edge {
    fn default() -> Self {
        Self::unlabeled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlabeled_edge_matches_nothing() {
        let edge = Edge::unlabeled();
        assert!(!edge.matches("true"));
        assert!(!edge.matches(""));
    }

    #[test]
    fn labeled_edge_matches_its_label() {
        let edge = Edge::labeled("true");
        assert!(edge.matches("true"));
        assert!(!edge.matches("false"));
    }

    #[test]
    fn edge_serde_roundtrip() {
        let edge = Edge::labeled("2");
        let json = serde_json::to_string(&edge).expect("serialize");
        let parsed: Edge = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(edge, parsed);
    }
}
