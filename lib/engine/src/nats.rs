//! NATS-backed persistence and requeue.
//!
//! - [`NatsContextStore`]: run contexts in a JetStream key-value bucket,
//!   keyed by run id, wrapped in a versioned [`Envelope`].
//! - [`NatsDelayQueue`]: resume jobs published to a JetStream work-queue
//!   stream. The due time rides in the payload; the consumer side is
//!   responsible for holding a job until `not_before`.

use crate::envelope::Envelope;
use crate::store::{ContextStore, DelayQueue, QueueError, ResumeJob, StoreError};
use crate::context::ExecutionContext;
use async_nats::jetstream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::RunId;
use serde::{Deserialize, Serialize};

/// Subject for delayed resume jobs.
const DELAY_SUBJECT: &str = "parley.delay.jobs";

/// Stream name for delayed resume jobs.
const DELAY_STREAM_NAME: &str = "PARLEY_DELAY";

/// KV bucket name for run contexts.
const CONTEXTS_BUCKET_NAME: &str = "parley-run-contexts";

/// Configuration for the NATS-backed stores.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URL.
    pub url: String,
    /// Stream name for delayed jobs (defaults to PARLEY_DELAY).
    pub delay_stream_name: Option<String>,
    /// KV bucket name for contexts (defaults to parley-run-contexts).
    pub contexts_bucket_name: Option<String>,
}

impl NatsConfig {
    /// Creates a new config with the given NATS URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            delay_stream_name: None,
            contexts_bucket_name: None,
        }
    }

    fn delay_stream(&self) -> &str {
        self.delay_stream_name.as_deref().unwrap_or(DELAY_STREAM_NAME)
    }

    fn contexts_bucket(&self) -> &str {
        self.contexts_bucket_name
            .as_deref()
            .unwrap_or(CONTEXTS_BUCKET_NAME)
    }
}

/// Wire payload for a delayed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedJob {
    /// The job to deliver.
    pub job: ResumeJob,
    /// Earliest delivery instant.
    pub not_before: DateTime<Utc>,
}

/// Run context persistence in a JetStream KV bucket.
pub struct NatsContextStore {
    bucket: jetstream::kv::Store,
}

impl NatsContextStore {
    /// Connects and ensures the context bucket exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or bucket setup fails.
    pub async fn new(config: &NatsConfig) -> Result<Self, StoreError> {
        let client =
            async_nats::connect(&config.url)
                .await
                .map_err(|e| StoreError::ConnectionFailed {
                    message: e.to_string(),
                })?;

        let jetstream = jetstream::new(client);

        let bucket = jetstream
            .create_key_value(jetstream::kv::Config {
                bucket: config.contexts_bucket().to_string(),
                ..Default::default()
            })
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                message: format!("failed to create context bucket: {e}"),
            })?;

        Ok(Self { bucket })
    }

    fn key(run_id: RunId) -> String {
        run_id.to_string()
    }
}

#[async_trait]
impl ContextStore for NatsContextStore {
    async fn load(&self, run_id: RunId) -> Result<Option<ExecutionContext>, StoreError> {
        let Some(bytes) = self
            .bucket
            .get(Self::key(run_id))
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                message: e.to_string(),
            })?
        else {
            return Ok(None);
        };

        let envelope: Envelope<ExecutionContext> =
            Envelope::from_json_bytes(&bytes).map_err(|e| StoreError::DeserializationFailed {
                message: e.to_string(),
            })?;

        Ok(Some(envelope.into_payload()))
    }

    async fn save(&self, ctx: &ExecutionContext) -> Result<(), StoreError> {
        let envelope = Envelope::new(ctx);
        let bytes = envelope
            .to_json_bytes()
            .map_err(|e| StoreError::SerializationFailed {
                message: e.to_string(),
            })?;

        self.bucket
            .put(Self::key(ctx.run_id), bytes.into())
            .await
            .map_err(|e| StoreError::WriteFailed {
                message: e.to_string(),
            })?;

        Ok(())
    }
}

/// Delayed requeue over a JetStream work-queue stream.
pub struct NatsDelayQueue {
    jetstream: jetstream::Context,
}

impl NatsDelayQueue {
    /// Connects and ensures the delay stream exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or stream setup fails.
    pub async fn new(config: &NatsConfig) -> Result<Self, QueueError> {
        let client =
            async_nats::connect(&config.url)
                .await
                .map_err(|e| QueueError::ConnectionFailed {
                    message: e.to_string(),
                })?;

        let jetstream = jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: config.delay_stream().to_string(),
            subjects: vec![DELAY_SUBJECT.to_string()],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };

        jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("failed to create delay stream: {e}"),
            })?;

        Ok(Self { jetstream })
    }
}

#[async_trait]
impl DelayQueue for NatsDelayQueue {
    async fn enqueue(&self, job: ResumeJob, not_before: DateTime<Utc>) -> Result<(), QueueError> {
        let envelope = Envelope::new(DelayedJob { job, not_before });
        let bytes = envelope
            .to_json_bytes()
            .map_err(|e| QueueError::SerializationFailed {
                message: e.to_string(),
            })?;

        self.jetstream
            .publish(DELAY_SUBJECT, bytes.into())
            .await
            .map_err(|e| QueueError::PublishFailed {
                message: e.to_string(),
            })?
            .await
            .map_err(|e| QueueError::PublishFailed {
                message: e.to_string(),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = NatsConfig::new("nats://localhost:4222");
        assert_eq!(config.delay_stream(), "PARLEY_DELAY");
        assert_eq!(config.contexts_bucket(), "parley-run-contexts");
    }

    #[test]
    fn delayed_job_envelope_round_trip() {
        let job = DelayedJob {
            job: ResumeJob::Workflow { run_id: RunId::new() },
            not_before: Utc::now(),
        };
        let bytes = Envelope::new(job.clone()).to_json_bytes().unwrap();
        let back: Envelope<DelayedJob> = Envelope::from_json_bytes(&bytes).unwrap();
        assert_eq!(back.into_payload(), job);
    }

}
