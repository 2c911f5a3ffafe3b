//! Error types for the engine crate.
//!
//! The error taxonomy follows the run lifecycle:
//! - `GraphError`: structural violations caught when building a graph
//! - `StepError` (in `executor`): fatal config vs transient execution failures
//! - `EngineError`: run-level failures from the driver

use crate::node::NodeId;
use crate::store::{QueueError, StoreError};
use parley_core::{RunId, WorkflowId};
use std::fmt;

/// Errors from graph construction and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// The graph has no start node.
    MissingStart,
    /// The graph has more than one start node.
    MultipleStarts { count: usize },
    /// A non-branching node has more than one outgoing edge.
    MultipleSuccessors { node_id: NodeId },
    /// An edge out of a branching node is missing its label.
    UnlabeledBranch { node_id: NodeId },
    /// Two outgoing edges of a branching node share a label.
    DuplicateBranchLabel { node_id: NodeId, label: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => {
                write!(f, "node not found: {node_id}")
            }
            Self::MissingStart => write!(f, "workflow has no start node"),
            Self::MultipleStarts { count } => {
                write!(f, "workflow has {count} start nodes, expected exactly one")
            }
            Self::MultipleSuccessors { node_id } => {
                write!(f, "non-branching node {node_id} has multiple outgoing edges")
            }
            Self::UnlabeledBranch { node_id } => {
                write!(f, "branching node {node_id} has an unlabeled outgoing edge")
            }
            Self::DuplicateBranchLabel { node_id, label } => {
                write!(f, "branching node {node_id} has duplicate edges for label '{label}'")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from the run driver.
#[derive(Debug)]
pub enum EngineError {
    /// The workflow's activation flag is off; runs may not start.
    WorkflowDisabled { workflow_id: WorkflowId },
    /// No persisted context exists for the run.
    RunNotFound { run_id: RunId },
    /// The run is already in a terminal state and cannot resume.
    RunAlreadyTerminal { run_id: RunId },
    /// The run's cursor references a node missing from the graph.
    CursorNodeMissing { run_id: RunId, node_id: NodeId },
    /// The run was resumed with the wrong trigger for its suspension.
    UnexpectedResume { run_id: RunId, reason: String },
    /// The workflow graph is structurally invalid.
    Graph(GraphError),
    /// Context persistence failed.
    Store(StoreError),
    /// Enqueueing a resume job failed.
    Queue(QueueError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowDisabled { workflow_id } => {
                write!(f, "workflow {workflow_id} is disabled")
            }
            Self::RunNotFound { run_id } => write!(f, "run not found: {run_id}"),
            Self::RunAlreadyTerminal { run_id } => {
                write!(f, "run already in terminal state: {run_id}")
            }
            Self::CursorNodeMissing { run_id, node_id } => {
                write!(f, "run {run_id} cursor references missing node {node_id}")
            }
            Self::UnexpectedResume { run_id, reason } => {
                write!(f, "unexpected resume for run {run_id}: {reason}")
            }
            Self::Graph(e) => write!(f, "invalid workflow graph: {e}"),
            Self::Store(e) => write!(f, "context store error: {e}"),
            Self::Queue(e) => write!(f, "delay queue error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Graph(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Queue(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<QueueError> for EngineError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_display() {
        let node_id = NodeId::new();
        let err = GraphError::MultipleSuccessors { node_id };
        assert!(err.to_string().contains("multiple outgoing edges"));

        assert!(GraphError::MissingStart.to_string().contains("no start node"));
    }

    #[test]
    fn engine_error_display() {
        let run_id = RunId::new();
        let err = EngineError::RunAlreadyTerminal { run_id };
        assert!(err.to_string().contains("terminal"));
    }
}
