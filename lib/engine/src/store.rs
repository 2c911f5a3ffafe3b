//! Persistence and requeue contracts.
//!
//! Two boundaries keep the driver free of infrastructure concerns:
//! [`ContextStore`] persists run contexts, [`DelayQueue`] accepts jobs
//! that must come back to a worker no earlier than a given instant.
//! Production implementations live in `nats.rs`; the in-memory
//! implementations here back the tests.

use crate::context::ExecutionContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::{CadenceId, ContactId, RunId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Errors from context persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached.
    ConnectionFailed { message: String },
    /// A persisted context could not be decoded.
    DeserializationFailed { message: String },
    /// A context could not be encoded for storage.
    SerializationFailed { message: String },
    /// The write was rejected by the backing store.
    WriteFailed { message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { message } => {
                write!(f, "store connection failed: {message}")
            }
            Self::DeserializationFailed { message } => {
                write!(f, "failed to deserialize stored context: {message}")
            }
            Self::SerializationFailed { message } => {
                write!(f, "failed to serialize context: {message}")
            }
            Self::WriteFailed { message } => write!(f, "store write failed: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence boundary for run contexts.
///
/// A save writes variables, cursor, status and log as one unit; a crash
/// between steps therefore loses at most the in-flight step, never half
/// of one.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Loads the context for a run, if one has been saved.
    async fn load(&self, run_id: RunId) -> Result<Option<ExecutionContext>, StoreError>;

    /// Persists the full context, replacing any previous version.
    async fn save(&self, ctx: &ExecutionContext) -> Result<(), StoreError>;
}

/// Errors from the delay queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue backend could not be reached.
    ConnectionFailed { message: String },
    /// The job payload could not be encoded.
    SerializationFailed { message: String },
    /// The backend rejected the publish.
    PublishFailed { message: String },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { message } => {
                write!(f, "queue connection failed: {message}")
            }
            Self::SerializationFailed { message } => {
                write!(f, "failed to serialize job: {message}")
            }
            Self::PublishFailed { message } => write!(f, "job publish failed: {message}"),
        }
    }
}

impl std::error::Error for QueueError {}

/// A job that re-enters a worker after its due time.
///
/// All resume state rides in the payload itself, so workers stay
/// stateless between deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResumeJob {
    /// Resume a suspended workflow run.
    Workflow {
        /// The run to resume.
        run_id: RunId,
    },
    /// Fire the next step of a follow-up cadence.
    Cadence {
        /// The cadence to advance.
        cadence_id: CadenceId,
        /// Recipients still active in the cadence.
        recipient_ids: Vec<ContactId>,
        /// The step to execute on delivery.
        step_index: usize,
    },
}

/// Accepts jobs for redelivery no earlier than `not_before`.
#[async_trait]
pub trait DelayQueue: Send + Sync {
    /// Enqueues a job with its due time.
    async fn enqueue(&self, job: ResumeJob, not_before: DateTime<Utc>) -> Result<(), QueueError>;
}

/// In-memory context store used as a test double.
#[derive(Default)]
pub struct InMemoryContextStore {
    contexts: Mutex<HashMap<RunId, ExecutionContext>>,
}

impl InMemoryContextStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn load(&self, run_id: RunId) -> Result<Option<ExecutionContext>, StoreError> {
        let contexts = self
            .contexts
            .lock()
            .map_err(|e| StoreError::ConnectionFailed {
                message: e.to_string(),
            })?;
        Ok(contexts.get(&run_id).cloned())
    }

    async fn save(&self, ctx: &ExecutionContext) -> Result<(), StoreError> {
        let mut contexts = self
            .contexts
            .lock()
            .map_err(|e| StoreError::ConnectionFailed {
                message: e.to_string(),
            })?;
        contexts.insert(ctx.run_id, ctx.clone());
        Ok(())
    }
}

/// In-memory delay queue used as a test double; records every enqueue.
#[derive(Default)]
pub struct InMemoryDelayQueue {
    jobs: Mutex<Vec<(ResumeJob, DateTime<Utc>)>>,
}

impl InMemoryDelayQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of everything enqueued so far, in order.
    pub fn jobs(&self) -> Vec<(ResumeJob, DateTime<Utc>)> {
        self.jobs.lock().map(|j| j.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DelayQueue for InMemoryDelayQueue {
    async fn enqueue(&self, job: ResumeJob, not_before: DateTime<Utc>) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().map_err(|e| QueueError::ConnectionFailed {
            message: e.to_string(),
        })?;
        jobs.push((job, not_before));
        Ok(())
    }
}
