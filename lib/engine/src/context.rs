//! Execution context for workflow runs.
//!
//! A context is the complete mutable state of one run: the variable
//! bindings, the cursor (current node), and an append-only execution log.
//! The context is owned exclusively by whichever caller is driving the
//! run's current synchronous segment; it is persisted as a whole on every
//! step so that a crash can resume from the last durable state.

use crate::node::{NodeId, NodeKind};
use chrono::{DateTime, Utc};
use parley_core::{RunId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// The variable bindings of a run.
///
/// Values are arbitrary JSON: scalars from the trigger payload, nested
/// objects merged in from HTTP responses and tool results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableMap(Map<String, JsonValue>);

impl VariableMap {
    /// Creates an empty variable map.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Sets a single variable, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: JsonValue) {
        self.0.insert(key.into(), value);
    }

    /// Shallow-merges a JSON object patch into the map.
    ///
    /// Non-object patches are ignored; executors only ever produce object
    /// patches.
    pub fn merge(&mut self, patch: &JsonValue) {
        if let JsonValue::Object(fields) = patch {
            for (key, value) in fields {
                self.0.insert(key.clone(), value.clone());
            }
        }
    }

    /// Looks up a value by dotted path, e.g. `"contact.name"`.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&JsonValue> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.0.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Returns the number of top-level bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the map has no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, JsonValue>> for VariableMap {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

/// The outcome of one executed step, as recorded in the log.
///
/// Terminal outcomes are deliberately distinguishable from one another:
/// an operator reading the log can tell organic completion apart from a
/// fail-safe branch termination, a budget stop, or a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step executed and the run advanced (or ended at a node with no
    /// outgoing edge).
    Completed,
    /// The step suspended the run (delay timer or menu input).
    Suspended,
    /// A branching node resolved a branch key with no matching labeled
    /// edge. The run ends here rather than guessing a default.
    NoMatchingBranch {
        /// The branch key that had no edge.
        branch: String,
    },
    /// The step failed fatally or exhausted its retries.
    Failed {
        /// Failure reason.
        reason: String,
    },
    /// The per-run step budget was exhausted (cyclic graph guard).
    StepBudgetExhausted,
    /// The run was cancelled at a step boundary.
    Cancelled,
}

/// One entry of the append-only execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The node this entry refers to.
    pub node_id: NodeId,
    /// The node's kind at execution time.
    pub kind: NodeKind,
    /// What happened.
    pub outcome: StepOutcome,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// The lifecycle status of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// A synchronous segment is executing.
    Running,
    /// Suspended on a delay timer.
    WaitingTimer {
        /// When the run becomes eligible to resume.
        resume_at: DateTime<Utc>,
    },
    /// Suspended awaiting a correlated inbound reply.
    WaitingInput,
    /// The run reached a node with no outgoing edge.
    Completed,
    /// The run failed (config error, retry exhaustion, budget, unmatched
    /// branch terminations are Completed-with-log, not Failed).
    Failed,
    /// The run was cancelled.
    Cancelled,
}

impl RunStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// The complete state of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Unique identifier of this run.
    pub run_id: RunId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The node the run is currently at (or suspended on).
    pub cursor: NodeId,
    /// Variable bindings.
    pub variables: VariableMap,
    /// Append-only execution log.
    log: Vec<LogEntry>,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Number of steps executed so far (across resumptions).
    pub steps_taken: u32,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Creates a new context for a run starting at the given node.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, start: NodeId, variables: VariableMap) -> Self {
        Self {
            run_id: RunId::new(),
            workflow_id,
            cursor: start,
            variables,
            log: Vec::new(),
            status: RunStatus::Running,
            steps_taken: 0,
            started_at: Utc::now(),
        }
    }

    /// Appends an entry to the execution log.
    ///
    /// The log is append-only; there is deliberately no way to rewrite or
    /// remove entries.
    pub fn append_log(&mut self, node_id: NodeId, kind: NodeKind, outcome: StepOutcome) {
        self.log.push(LogEntry {
            node_id,
            kind,
            outcome,
            timestamp: Utc::now(),
        });
    }

    /// Returns the execution log.
    #[must_use]
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Marks the run cancelled. Takes effect at the next step boundary;
    /// an in-flight step runs to completion first.
    pub fn cancel(&mut self) {
        self.status = RunStatus::Cancelled;
    }

    /// Returns true if the run has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_path_resolves_nested_values() {
        let mut vars = VariableMap::new();
        vars.merge(&json!({"contact": {"name": "Ana", "age": 20}}));

        assert_eq!(vars.get_path("contact.name"), Some(&json!("Ana")));
        assert_eq!(vars.get_path("contact.age"), Some(&json!(20)));
        assert_eq!(vars.get_path("contact.missing"), None);
        assert_eq!(vars.get_path("missing"), None);
    }

    #[test]
    fn merge_is_shallow() {
        let mut vars = VariableMap::new();
        vars.merge(&json!({"a": 1, "nested": {"x": 1}}));
        vars.merge(&json!({"nested": {"y": 2}}));

        // A later patch replaces the whole nested value.
        assert_eq!(vars.get_path("nested.y"), Some(&json!(2)));
        assert_eq!(vars.get_path("nested.x"), None);
        assert_eq!(vars.get_path("a"), Some(&json!(1)));
    }

    #[test]
    fn non_object_patch_is_ignored() {
        let mut vars = VariableMap::new();
        vars.merge(&json!("not an object"));
        assert!(vars.is_empty());
    }

    #[test]
    fn log_is_append_only() {
        let mut ctx = ExecutionContext::new(WorkflowId::new(), NodeId::new(), VariableMap::new());
        let node = NodeId::new();

        ctx.append_log(node, NodeKind::Start, StepOutcome::Completed);
        ctx.append_log(node, NodeKind::Content, StepOutcome::Completed);

        assert_eq!(ctx.log().len(), 2);
        assert_eq!(ctx.log()[0].kind, NodeKind::Start);
    }

    #[test]
    fn run_status_terminality() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(
            !RunStatus::WaitingTimer {
                resume_at: Utc::now()
            }
            .is_terminal()
        );
        assert!(!RunStatus::WaitingInput.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn context_serde_roundtrip_preserves_log_and_variables() {
        let mut ctx = ExecutionContext::new(WorkflowId::new(), NodeId::new(), VariableMap::new());
        ctx.variables.set("name", json!("Ana"));
        ctx.append_log(NodeId::new(), NodeKind::Start, StepOutcome::Completed);

        let json = serde_json::to_string(&ctx).expect("serialize");
        let parsed: ExecutionContext = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(ctx, parsed);
    }

    #[test]
    fn step_outcomes_are_distinguishable_in_serialized_form() {
        let completed = serde_json::to_value(StepOutcome::Completed).unwrap();
        let unmatched = serde_json::to_value(StepOutcome::NoMatchingBranch {
            branch: "true".to_string(),
        })
        .unwrap();
        let budget = serde_json::to_value(StepOutcome::StepBudgetExhausted).unwrap();

        assert_ne!(completed["outcome"], unmatched["outcome"]);
        assert_ne!(completed["outcome"], budget["outcome"]);
    }
}
