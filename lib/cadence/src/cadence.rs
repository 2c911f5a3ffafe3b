//! Cadence definitions and jobs.
//!
//! A cadence is an ordered list of stepped follow-up messages. Unlike a
//! workflow it has no graph and no per-run context: everything a worker
//! needs to fire a step rides in the [`CadenceJob`] payload.

use chrono::{DateTime, Utc};
use parley_core::{CadenceId, ContactId, TenantId};
use parley_engine::VariableMap;
use serde::{Deserialize, Serialize};

/// One step of a cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceStep {
    /// Seconds to wait before this step fires, measured from the
    /// previous step's sends.
    pub delay_seconds: i64,
    /// Message body template, rendered per recipient.
    pub message: String,
    /// Channel override for this step; falls back to the recipient's
    /// default channel when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Named provider integration overriding the channel's sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
}

impl CadenceStep {
    /// Creates a step with no channel or integration override.
    #[must_use]
    pub fn new(delay_seconds: i64, message: impl Into<String>) -> Self {
        Self {
            delay_seconds,
            message: message.into(),
            channel: None,
            integration: None,
        }
    }

    /// Sets the channel override.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// A stepped follow-up message sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cadence {
    /// Unique identifier.
    pub id: CadenceId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Human-readable name.
    pub name: String,
    /// Whether new steps may fire.
    pub enabled: bool,
    /// Ordered steps.
    pub steps: Vec<CadenceStep>,
    /// When the cadence was created.
    pub created_at: DateTime<Utc>,
}

impl Cadence {
    /// Creates an enabled cadence with the given steps.
    #[must_use]
    pub fn new(tenant_id: TenantId, name: impl Into<String>, steps: Vec<CadenceStep>) -> Self {
        Self {
            id: CadenceId::new(),
            tenant_id,
            name: name.into(),
            enabled: true,
            steps,
            created_at: Utc::now(),
        }
    }

    /// Returns the step at `index`, if it exists.
    #[must_use]
    pub fn step(&self, index: usize) -> Option<&CadenceStep> {
        self.steps.get(index)
    }

    /// Returns true when `index` is the final step.
    #[must_use]
    pub fn is_last_step(&self, index: usize) -> bool {
        index + 1 >= self.steps.len()
    }
}

/// A contact enrolled in a cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    /// Contact identifier.
    pub id: ContactId,
    /// Delivery address on the contact's channel.
    pub address: String,
    /// The contact's default channel.
    pub default_channel: String,
    /// Per-contact template variables.
    pub variables: VariableMap,
}

/// The payload that fires one cadence step for a set of recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceJob {
    /// The cadence to advance.
    pub cadence_id: CadenceId,
    /// Recipients still active in the cadence.
    pub recipient_ids: Vec<ContactId>,
    /// The step to fire.
    pub step_index: usize,
}
