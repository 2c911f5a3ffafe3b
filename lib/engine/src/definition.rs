//! Workflow definition types.
//!
//! A workflow is a tenant-owned automation: metadata, an activation flag,
//! and a directed graph of typed nodes. Definitions are authored and
//! stored by an external surface and handed to the engine already built;
//! the engine only reads them.

use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::node::Node;
use chrono::{DateTime, Utc};
use parley_core::{TenantId, WorkflowId};
use serde::{Deserialize, Serialize};

/// Metadata for a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    /// Human-readable name for this workflow.
    pub name: String,
    /// Description of what this workflow does.
    pub description: Option<String>,
    /// Whether this workflow is active. Runs may only start when active.
    pub enabled: bool,
    /// When this workflow was created.
    pub created_at: DateTime<Utc>,
    /// When this workflow was last updated.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowMetadata {
    /// Creates new metadata with default values.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier for this workflow.
    pub id: WorkflowId,
    /// The tenant that owns this workflow.
    pub tenant_id: TenantId,
    /// Workflow metadata.
    pub metadata: WorkflowMetadata,
    /// The workflow graph (nodes and edges).
    pub graph: WorkflowGraph,
}

impl Workflow {
    /// Creates a new workflow with the given name.
    #[must_use]
    pub fn new(tenant_id: TenantId, name: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::new(),
            tenant_id,
            metadata: WorkflowMetadata::new(name),
            graph: WorkflowGraph::new(),
        }
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns whether the workflow is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.metadata.enabled
    }

    /// Activates the workflow.
    pub fn enable(&mut self) {
        self.metadata.enabled = true;
        self.touch();
    }

    /// Deactivates the workflow. Suspended runs may still resume.
    pub fn disable(&mut self) {
        self.metadata.enabled = false;
        self.touch();
    }

    /// Returns the unique entry node.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph does not have exactly one start node.
    pub fn start_node(&self) -> Result<&Node, GraphError> {
        self.graph.start_node().ok_or(GraphError::MissingStart)
    }

    /// Validates the workflow graph's structural invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.graph.validate()
    }

    /// Marks the workflow as updated (bumps updated_at timestamp).
    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeConfig;

    #[test]
    fn workflow_creation() {
        let workflow = Workflow::new(TenantId::new(), "Lead routing");
        assert_eq!(workflow.name(), "Lead routing");
        assert!(workflow.is_enabled());
        assert_eq!(workflow.graph.node_count(), 0);
    }

    #[test]
    fn workflow_enable_disable() {
        let mut workflow = Workflow::new(TenantId::new(), "Test");

        workflow.disable();
        assert!(!workflow.is_enabled());

        workflow.enable();
        assert!(workflow.is_enabled());
    }

    #[test]
    fn start_node_requires_start() {
        let workflow = Workflow::new(TenantId::new(), "Empty");
        assert!(workflow.start_node().is_err());

        let mut workflow = Workflow::new(TenantId::new(), "With start");
        let start = Node::new("Start", NodeConfig::Start);
        let start_id = start.id;
        workflow.graph.add_node(start);
        assert_eq!(workflow.start_node().unwrap().id, start_id);
    }

    #[test]
    fn workflow_serde_roundtrip() {
        let mut workflow = Workflow::new(TenantId::new(), "Serde");
        workflow.graph.add_node(Node::new("Start", NodeConfig::Start));

        let json = serde_json::to_string(&workflow).expect("serialize");
        let mut parsed: Workflow = serde_json::from_str(&json).expect("deserialize");
        parsed.graph.rebuild_index_map();

        assert_eq!(workflow.id, parsed.id);
        assert_eq!(workflow.name(), parsed.name());
        assert!(parsed.start_node().is_ok());
    }
}
