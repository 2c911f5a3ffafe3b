//! Node executors.
//!
//! [`execute_node`] dispatches on the node's typed config and returns a
//! step-machine outcome: advance (with an optional variable patch and
//! branch key), suspend on a timer, or suspend awaiting input. Retrying
//! transient failures is the driver's job; an executor attempts its
//! side effect exactly once per call.

use crate::collab::{Collaborators, HttpCallRequest};
use crate::condition;
use crate::context::ExecutionContext;
use crate::node::{MenuOption, Node, NodeConfig};
use crate::template;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use std::fmt;
use tracing::debug;

/// Variable path holding the run's recipient address.
///
/// Conversational runs are seeded with the contact they belong to;
/// message-producing nodes fail with a config error when it is absent.
pub const CONTACT_ADDRESS_PATH: &str = "contact.address";

/// The outcome of executing a single node.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    /// The node completed; move the cursor along an edge.
    Advance {
        /// Variable patch to shallow-merge into the context.
        patch: Option<JsonValue>,
        /// Branch key for edge resolution on branching nodes.
        branch: Option<String>,
    },
    /// The run parks until the given instant.
    SuspendTimer {
        /// Earliest instant the run may resume.
        resume_at: DateTime<Utc>,
    },
    /// The run parks until a correlated reply arrives.
    SuspendInput,
}

impl ExecOutcome {
    fn advance() -> Self {
        Self::Advance {
            patch: None,
            branch: None,
        }
    }

    fn advance_branch(branch: impl Into<String>) -> Self {
        Self::Advance {
            patch: None,
            branch: Some(branch.into()),
        }
    }

    fn advance_patch(patch: JsonValue) -> Self {
        Self::Advance {
            patch: Some(patch),
            branch: None,
        }
    }
}

/// A step failure, split by whether a retry could ever help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// The node's configuration is unusable; retrying cannot succeed.
    Config { reason: String },
    /// An external dependency failed; a later attempt may succeed.
    Transient { reason: String },
}

impl StepError {
    fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Returns true when a retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// The human-readable failure reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Config { reason } | Self::Transient { reason } => reason,
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "node config error: {reason}"),
            Self::Transient { reason } => write!(f, "transient step failure: {reason}"),
        }
    }
}

impl std::error::Error for StepError {}

/// Executes one node against the current context.
///
/// # Errors
///
/// Returns [`StepError::Config`] for unusable node configuration and
/// [`StepError::Transient`] when an external dependency failed.
pub async fn execute_node(
    node: &Node,
    ctx: &ExecutionContext,
    collaborators: &Collaborators,
) -> Result<ExecOutcome, StepError> {
    match &node.config {
        NodeConfig::Start => Ok(ExecOutcome::advance()),

        NodeConfig::Content { channel, body } => {
            let rendered = template::render(body, &ctx.variables);
            send_message(collaborators, ctx, channel, &rendered).await?;
            Ok(ExecOutcome::advance())
        }

        NodeConfig::Condition {
            field,
            operator,
            value,
        } => {
            let outcome = condition::evaluate(field, *operator, value, &ctx.variables);
            debug!(
                run_id = %ctx.run_id,
                node_id = %node.id,
                field,
                outcome,
                "condition evaluated"
            );
            Ok(ExecOutcome::advance_branch(if outcome {
                "true"
            } else {
                "false"
            }))
        }

        NodeConfig::Delay { seconds } => {
            let seconds = (*seconds).max(0);
            Ok(ExecOutcome::SuspendTimer {
                resume_at: Utc::now() + Duration::seconds(seconds),
            })
        }

        NodeConfig::Http {
            method,
            url,
            headers,
            body,
            merge_key,
        } => {
            let request = HttpCallRequest {
                method: method.to_string(),
                url: template::render(url, &ctx.variables),
                headers: headers
                    .iter()
                    .map(|(name, value)| {
                        (name.clone(), template::render(value, &ctx.variables))
                    })
                    .collect(),
                body: body
                    .as_deref()
                    .map(|b| template::render(b, &ctx.variables)),
            };

            let response = collaborators.http.call(request).await.map_err(|e| match e {
                crate::collab::HttpCallError::InvalidRequest { message } => {
                    StepError::config(message)
                }
                other => StepError::transient(other.to_string()),
            })?;

            if !response.is_success() {
                return Err(StepError::transient(format!(
                    "http call returned status {}",
                    response.status
                )));
            }

            Ok(ExecOutcome::advance_patch(keyed_patch(
                merge_key,
                response.body,
            )))
        }

        NodeConfig::ToolCall {
            tool,
            params,
            merge_key,
        } => {
            let result = collaborators
                .tools
                .run(tool, params.clone())
                .await
                .map_err(|e| match e {
                    crate::collab::ToolError::UnknownTool { tool } => {
                        StepError::config(format!("unknown tool: {tool}"))
                    }
                    other => StepError::transient(other.to_string()),
                })?;

            Ok(ExecOutcome::advance_patch(keyed_patch(merge_key, result)))
        }

        NodeConfig::AssignQueue { queue_id } => {
            collaborators
                .queues
                .assign(ctx.run_id, *queue_id)
                .await
                .map_err(|e| match e {
                    crate::collab::AssignError::UnknownQueue { queue_id } => {
                        StepError::config(format!("unknown queue: {queue_id}"))
                    }
                    other => StepError::transient(other.to_string()),
                })?;
            Ok(ExecOutcome::advance())
        }

        NodeConfig::Menu {
            prompt,
            options,
            channel,
        } => {
            let rendered = render_menu(prompt, options, ctx);
            send_message(collaborators, ctx, channel, &rendered).await?;
            Ok(ExecOutcome::SuspendInput)
        }
    }
}

async fn send_message(
    collaborators: &Collaborators,
    ctx: &ExecutionContext,
    channel: &str,
    body: &str,
) -> Result<(), StepError> {
    let recipient = contact_address(ctx)?;
    let sender = collaborators
        .senders
        .get(channel)
        .ok_or_else(|| StepError::config(format!("no sender registered for channel '{channel}'")))?;

    sender
        .send(&recipient, body)
        .await
        .map(|_| ())
        .map_err(|e| StepError::transient(e.to_string()))
}

fn keyed_patch(merge_key: &str, value: JsonValue) -> JsonValue {
    let mut patch = serde_json::Map::new();
    patch.insert(merge_key.to_string(), value);
    JsonValue::Object(patch)
}

fn contact_address(ctx: &ExecutionContext) -> Result<String, StepError> {
    match ctx.variables.get_path(CONTACT_ADDRESS_PATH) {
        Some(JsonValue::String(address)) if !address.is_empty() => Ok(address.clone()),
        _ => Err(StepError::config(format!(
            "run context is missing '{CONTACT_ADDRESS_PATH}'"
        ))),
    }
}

fn render_menu(prompt: &str, options: &[MenuOption], ctx: &ExecutionContext) -> String {
    let mut out = template::render(prompt, &ctx.variables);
    for option in options {
        out.push('\n');
        out.push_str(&option.key);
        out.push_str(") ");
        out.push_str(&template::render(&option.text, &ctx.variables));
    }
    out
}
