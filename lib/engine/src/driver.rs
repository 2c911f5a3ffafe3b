//! The run driver.
//!
//! Interprets a workflow graph over a persisted [`ExecutionContext`]:
//! starts runs, executes synchronous segments step by step, suspends on
//! delays and menus, and re-enters from the persisted cursor when a
//! timer fires or a reply arrives.
//!
//! Within one run, steps execute strictly in cursor order on a single
//! caller; the driver keeps no mutable state of its own, so one driver
//! instance can serve many runs concurrently.

use crate::collab::Collaborators;
use crate::context::{ExecutionContext, RunStatus, StepOutcome, VariableMap};
use crate::definition::Workflow;
use crate::error::EngineError;
use crate::executor::{self, ExecOutcome};
use crate::node::{Node, NodeConfig, NodeId, NodeKind};
use crate::retry::RetryPolicy;
use crate::settings::EngineSettings;
use crate::store::{ContextStore, DelayQueue, ResumeJob};
use parley_core::RunId;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives workflow runs against a context store and a delay queue.
pub struct RunDriver<S, Q> {
    store: Arc<S>,
    queue: Arc<Q>,
    collaborators: Collaborators,
    settings: EngineSettings,
    retry: RetryPolicy,
}

impl<S: ContextStore, Q: DelayQueue> RunDriver<S, Q> {
    /// Creates a driver; the retry policy is derived from the settings.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        queue: Arc<Q>,
        collaborators: Collaborators,
        settings: EngineSettings,
    ) -> Self {
        let retry = RetryPolicy::new(settings.retry.clone());
        Self {
            store,
            queue,
            collaborators,
            settings,
            retry,
        }
    }

    /// Starts a new run of a workflow.
    ///
    /// Validates the graph, refuses disabled workflows, seeds the
    /// context at the start node and executes the first synchronous
    /// segment.
    ///
    /// # Errors
    ///
    /// Returns an error for disabled workflows, invalid graphs, and
    /// persistence failures. Step failures do not surface here; they
    /// terminate the run with a `Failed` status and a logged reason.
    pub async fn start(
        &self,
        workflow: &Workflow,
        trigger_vars: VariableMap,
    ) -> Result<ExecutionContext, EngineError> {
        if !workflow.is_enabled() {
            return Err(EngineError::WorkflowDisabled {
                workflow_id: workflow.id,
            });
        }
        workflow.validate()?;
        let start = workflow.start_node()?;

        let ctx = ExecutionContext::new(workflow.id, start.id, trigger_vars);
        info!(run_id = %ctx.run_id, workflow_id = %workflow.id, "run started");
        self.store.save(&ctx).await?;

        self.run_segment(workflow, ctx).await
    }

    /// Resumes a run whose delay timer has fired.
    ///
    /// # Errors
    ///
    /// Returns an error when the run is unknown, already terminal, or
    /// not suspended on a timer.
    pub async fn resume_timer(
        &self,
        workflow: &Workflow,
        run_id: RunId,
    ) -> Result<ExecutionContext, EngineError> {
        let mut ctx = self.load_resumable(run_id).await?;
        if !matches!(ctx.status, RunStatus::WaitingTimer { .. }) {
            return Err(EngineError::UnexpectedResume {
                run_id,
                reason: "run is not suspended on a timer".to_string(),
            });
        }

        debug!(run_id = %run_id, "timer resumption");
        ctx.status = RunStatus::Running;
        self.run_segment(workflow, ctx).await
    }

    /// Feeds an inbound reply to a run suspended on a menu.
    ///
    /// The reply selects the branch whose label equals the matching
    /// option's key. A reply matching no option leaves the run suspended.
    ///
    /// # Errors
    ///
    /// Returns an error when the run is unknown, already terminal, or
    /// not awaiting input.
    pub async fn resume_input(
        &self,
        workflow: &Workflow,
        run_id: RunId,
        reply: &str,
    ) -> Result<ExecutionContext, EngineError> {
        let mut ctx = self.load_resumable(run_id).await?;
        if ctx.status != RunStatus::WaitingInput {
            return Err(EngineError::UnexpectedResume {
                run_id,
                reason: "run is not awaiting input".to_string(),
            });
        }

        let node = self.node_at_cursor(workflow, &ctx)?;
        let NodeConfig::Menu { options, .. } = &node.config else {
            return Err(EngineError::UnexpectedResume {
                run_id,
                reason: "cursor is not on a menu node".to_string(),
            });
        };

        let reply = reply.trim();
        let Some(option) = options.iter().find(|o| o.key == reply) else {
            debug!(run_id = %run_id, reply, "reply matched no menu option, staying suspended");
            return Ok(ctx);
        };
        let branch = option.key.clone();

        match workflow.graph.labeled_successor(ctx.cursor, &branch) {
            Some(next) => {
                ctx.append_log(node.id, node.kind(), StepOutcome::Completed);
                ctx.cursor = next;
                ctx.status = RunStatus::Running;
                self.run_segment(workflow, ctx).await
            }
            None => {
                let (node_id, kind) = (node.id, node.kind());
                self.finish_no_matching_branch(ctx, node_id, kind, branch).await
            }
        }
    }

    /// Executes steps from the cursor until the run suspends or ends.
    async fn run_segment(
        &self,
        workflow: &Workflow,
        mut ctx: ExecutionContext,
    ) -> Result<ExecutionContext, EngineError> {
        loop {
            // Cancellation is honored between steps, never mid-step.
            if self.externally_cancelled(&ctx).await? {
                let node = self.node_at_cursor(workflow, &ctx)?;
                ctx.append_log(node.id, node.kind(), StepOutcome::Cancelled);
                ctx.status = RunStatus::Cancelled;
                info!(run_id = %ctx.run_id, "run cancelled");
                self.store.save(&ctx).await?;
                return Ok(ctx);
            }

            if ctx.steps_taken >= self.settings.max_steps_per_run {
                let node = self.node_at_cursor(workflow, &ctx)?;
                ctx.append_log(node.id, node.kind(), StepOutcome::StepBudgetExhausted);
                ctx.status = RunStatus::Failed;
                warn!(
                    run_id = %ctx.run_id,
                    budget = self.settings.max_steps_per_run,
                    "step budget exhausted"
                );
                self.store.save(&ctx).await?;
                return Ok(ctx);
            }

            let node = self.node_at_cursor(workflow, &ctx)?;
            debug!(run_id = %ctx.run_id, node_id = %node.id, kind = %node.kind(), "executing node");

            let result = self
                .retry
                .run(|| executor::execute_node(node, &ctx, &self.collaborators))
                .await;
            ctx.steps_taken += 1;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    ctx.append_log(
                        node.id,
                        node.kind(),
                        StepOutcome::Failed {
                            reason: err.reason().to_string(),
                        },
                    );
                    ctx.status = RunStatus::Failed;
                    warn!(run_id = %ctx.run_id, node_id = %node.id, reason = err.reason(), "run failed");
                    self.store.save(&ctx).await?;
                    return Ok(ctx);
                }
            };

            match outcome {
                ExecOutcome::SuspendTimer { resume_at } => {
                    ctx.append_log(node.id, node.kind(), StepOutcome::Suspended);
                    // Park the cursor on the successor so resumption
                    // continues past the delay node.
                    match workflow.graph.single_successor(node.id) {
                        Some(next) => {
                            ctx.cursor = next;
                            ctx.status = RunStatus::WaitingTimer { resume_at };
                            self.store.save(&ctx).await?;
                            self.queue
                                .enqueue(
                                    ResumeJob::Workflow { run_id: ctx.run_id },
                                    resume_at,
                                )
                                .await?;
                            debug!(run_id = %ctx.run_id, %resume_at, "run parked on timer");
                            return Ok(ctx);
                        }
                        None => {
                            // A trailing delay has nothing to resume into.
                            ctx.status = RunStatus::Completed;
                            info!(run_id = %ctx.run_id, "run completed");
                            self.store.save(&ctx).await?;
                            return Ok(ctx);
                        }
                    }
                }

                ExecOutcome::SuspendInput => {
                    ctx.append_log(node.id, node.kind(), StepOutcome::Suspended);
                    ctx.status = RunStatus::WaitingInput;
                    self.store.save(&ctx).await?;
                    debug!(run_id = %ctx.run_id, node_id = %node.id, "run awaiting input");
                    return Ok(ctx);
                }

                ExecOutcome::Advance { patch, branch } => {
                    if let Some(patch) = &patch {
                        ctx.variables.merge(patch);
                    }

                    let next = match &branch {
                        Some(key) => workflow.graph.labeled_successor(node.id, key),
                        None => workflow.graph.single_successor(node.id),
                    };

                    match (branch, next) {
                        (Some(key), None) => {
                            let (node_id, kind) = (node.id, node.kind());
                            return self
                                .finish_no_matching_branch(ctx, node_id, kind, key)
                                .await;
                        }
                        (_, None) => {
                            ctx.append_log(node.id, node.kind(), StepOutcome::Completed);
                            ctx.status = RunStatus::Completed;
                            info!(run_id = %ctx.run_id, "run completed");
                            self.store.save(&ctx).await?;
                            return Ok(ctx);
                        }
                        (_, Some(next)) => {
                            ctx.append_log(node.id, node.kind(), StepOutcome::Completed);
                            ctx.cursor = next;
                            self.store.save(&ctx).await?;
                        }
                    }
                }
            }
        }
    }

    /// Ends a run whose branch key matched no labeled edge.
    ///
    /// The engine never falls through to an arbitrary edge; the run
    /// terminates here with a distinguishable log entry.
    async fn finish_no_matching_branch(
        &self,
        mut ctx: ExecutionContext,
        node_id: NodeId,
        kind: NodeKind,
        branch: String,
    ) -> Result<ExecutionContext, EngineError> {
        warn!(run_id = %ctx.run_id, branch, "no matching branch, terminating run");
        ctx.append_log(node_id, kind, StepOutcome::NoMatchingBranch { branch });
        ctx.status = RunStatus::Completed;
        self.store.save(&ctx).await?;
        Ok(ctx)
    }

    /// Loads a non-terminal context for resumption.
    async fn load_resumable(&self, run_id: RunId) -> Result<ExecutionContext, EngineError> {
        let ctx = self
            .store
            .load(run_id)
            .await?
            .ok_or(EngineError::RunNotFound { run_id })?;
        if ctx.is_terminal() {
            return Err(EngineError::RunAlreadyTerminal { run_id });
        }
        Ok(ctx)
    }

    /// Checks the stored copy of the run for an external cancellation.
    async fn externally_cancelled(&self, ctx: &ExecutionContext) -> Result<bool, EngineError> {
        let stored = self.store.load(ctx.run_id).await?;
        Ok(stored.is_some_and(|s| s.status == RunStatus::Cancelled))
    }

    fn node_at_cursor<'w>(
        &self,
        workflow: &'w Workflow,
        ctx: &ExecutionContext,
    ) -> Result<&'w Node, EngineError> {
        workflow
            .graph
            .get_node(ctx.cursor)
            .ok_or(EngineError::CursorNodeMissing {
                run_id: ctx.run_id,
                node_id: ctx.cursor,
            })
    }
}
