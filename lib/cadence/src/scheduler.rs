//! The cadence scheduler.
//!
//! [`CadenceScheduler::tick`] fires one step for a batch of recipients:
//! render, send, audit each recipient, then enqueue the next step.
//! The enqueue always happens after every send of the current step has
//! been recorded, so a crash can duplicate at most one step and never
//! skip one.

use crate::cadence::{Cadence, CadenceJob, CadenceStep, Recipient};
use crate::error::CadenceError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parley_core::{CadenceId, ContactId, MessageId};
use parley_engine::store::{DelayQueue, ResumeJob};
use parley_engine::{SenderRegistry, template};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// An auditable cadence event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CadenceEvent {
    /// A step message was delivered to a recipient.
    MessageSent {
        cadence_id: CadenceId,
        contact_id: ContactId,
        step_index: usize,
        message_id: MessageId,
    },
    /// A step message could not be delivered to a recipient.
    SendFailed {
        cadence_id: CadenceId,
        contact_id: ContactId,
        step_index: usize,
        reason: String,
    },
    /// The next step was enqueued.
    StepEnqueued {
        cadence_id: CadenceId,
        step_index: usize,
        not_before: DateTime<Utc>,
    },
    /// The cadence finished its final step.
    Exhausted { cadence_id: CadenceId },
}

/// Records cadence events for compliance and debugging.
///
/// Implementations own durability and timestamps; the scheduler never
/// blocks a step on audit persistence.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Records one event.
    async fn record(&self, event: CadenceEvent);
}

/// In-memory audit log used as a test double.
#[derive(Default)]
pub struct InMemoryAuditLog {
    events: Mutex<Vec<CadenceEvent>>,
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded events, in order.
    pub fn events(&self) -> Vec<CadenceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, event: CadenceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// The outcome of one scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CadenceTick {
    /// The step fired; `advanced` tells whether a next step was enqueued.
    Sent { step_index: usize, advanced: bool },
    /// The final step fired; the sequence is over.
    Exhausted,
}

/// Fires cadence steps and advances the sequence.
///
/// Stateless between ticks: everything it needs arrives in the
/// [`CadenceJob`] and the recipient batch.
pub struct CadenceScheduler<Q> {
    senders: SenderRegistry,
    queue: Arc<Q>,
    audit: Arc<dyn AuditLog>,
}

impl<Q: DelayQueue> CadenceScheduler<Q> {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(senders: SenderRegistry, queue: Arc<Q>, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            senders,
            queue,
            audit,
        }
    }

    /// Fires the job's step for each recipient, then enqueues the next
    /// step if one exists.
    ///
    /// Individual send failures are audited and skipped; they never
    /// abort the batch or block advancement.
    ///
    /// # Errors
    ///
    /// Returns an error for disabled cadences, out-of-range step
    /// indexes, and an unavailable delay queue. In the queue case the
    /// current step's sends have already happened.
    pub async fn tick(
        &self,
        cadence: &Cadence,
        job: &CadenceJob,
        recipients: &[Recipient],
    ) -> Result<CadenceTick, CadenceError> {
        if !cadence.enabled {
            return Err(CadenceError::Disabled {
                cadence_id: cadence.id,
            });
        }

        let step = cadence
            .step(job.step_index)
            .ok_or(CadenceError::UnknownStep {
                cadence_id: cadence.id,
                step_index: job.step_index,
            })?;

        for recipient in recipients {
            match self.send_step(cadence.id, step, job.step_index, recipient).await {
                Ok(message_id) => {
                    self.audit
                        .record(CadenceEvent::MessageSent {
                            cadence_id: cadence.id,
                            contact_id: recipient.id,
                            step_index: job.step_index,
                            message_id,
                        })
                        .await;
                }
                Err(reason) => {
                    warn!(
                        cadence_id = %cadence.id,
                        contact_id = %recipient.id,
                        step_index = job.step_index,
                        reason,
                        "cadence send failed"
                    );
                    self.audit
                        .record(CadenceEvent::SendFailed {
                            cadence_id: cadence.id,
                            contact_id: recipient.id,
                            step_index: job.step_index,
                            reason,
                        })
                        .await;
                }
            }
        }

        if cadence.is_last_step(job.step_index) {
            info!(cadence_id = %cadence.id, "cadence exhausted");
            self.audit
                .record(CadenceEvent::Exhausted {
                    cadence_id: cadence.id,
                })
                .await;
            return Ok(CadenceTick::Exhausted);
        }

        let next_index = job.step_index + 1;
        // is_last_step returned false, so the next step exists.
        let delay = cadence
            .step(next_index)
            .map(|s| s.delay_seconds.max(0))
            .unwrap_or(0);
        let not_before = Utc::now() + Duration::seconds(delay);

        self.queue
            .enqueue(
                ResumeJob::Cadence {
                    cadence_id: cadence.id,
                    recipient_ids: job.recipient_ids.clone(),
                    step_index: next_index,
                },
                not_before,
            )
            .await
            .map_err(|source| CadenceError::QueueUnavailable {
                cadence_id: cadence.id,
                step_index: next_index,
                source,
            })?;

        debug!(cadence_id = %cadence.id, next_index, %not_before, "next cadence step enqueued");
        self.audit
            .record(CadenceEvent::StepEnqueued {
                cadence_id: cadence.id,
                step_index: next_index,
                not_before,
            })
            .await;

        Ok(CadenceTick::Sent {
            step_index: job.step_index,
            advanced: true,
        })
    }

    async fn send_step(
        &self,
        cadence_id: CadenceId,
        step: &CadenceStep,
        step_index: usize,
        recipient: &Recipient,
    ) -> Result<MessageId, String> {
        let channel = step
            .integration
            .as_deref()
            .or(step.channel.as_deref())
            .unwrap_or(&recipient.default_channel);

        let sender = self
            .senders
            .get(channel)
            .ok_or_else(|| format!("no sender registered for channel '{channel}'"))?;

        let body = template::render(&step.message, &recipient.variables);
        debug!(%cadence_id, contact_id = %recipient.id, step_index, channel, "sending cadence step");

        sender
            .send(&recipient.address, &body)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::TenantId;
    use parley_engine::store::QueueError;
    use parley_engine::{MessageSender, SendError, VariableMap};

    /// Shared timeline recording sends and enqueues in arrival order.
    type Timeline = Arc<Mutex<Vec<String>>>;

    struct TimelineSender {
        timeline: Timeline,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl MessageSender for TimelineSender {
        async fn send(&self, recipient: &str, body: &str) -> Result<MessageId, SendError> {
            if self.fail_for.as_deref() == Some(recipient) {
                return Err(SendError::Rejected {
                    message: "blocked".to_string(),
                });
            }
            self.timeline
                .lock()
                .unwrap()
                .push(format!("send:{recipient}:{body}"));
            Ok(MessageId::new())
        }
    }

    struct TimelineQueue {
        timeline: Timeline,
        fail: bool,
        enqueued: Mutex<Vec<(ResumeJob, DateTime<Utc>)>>,
    }

    #[async_trait]
    impl DelayQueue for TimelineQueue {
        async fn enqueue(
            &self,
            job: ResumeJob,
            not_before: DateTime<Utc>,
        ) -> Result<(), QueueError> {
            if self.fail {
                return Err(QueueError::ConnectionFailed {
                    message: "nats unreachable".to_string(),
                });
            }
            let step = match &job {
                ResumeJob::Cadence { step_index, .. } => *step_index,
                ResumeJob::Workflow { .. } => usize::MAX,
            };
            self.timeline.lock().unwrap().push(format!("enqueue:{step}"));
            self.enqueued.lock().unwrap().push((job, not_before));
            Ok(())
        }
    }

    struct Fixture {
        timeline: Timeline,
        queue: Arc<TimelineQueue>,
        audit: Arc<InMemoryAuditLog>,
        scheduler: CadenceScheduler<TimelineQueue>,
    }

    fn fixture_with(fail_queue: bool, fail_for: Option<&str>) -> Fixture {
        let timeline: Timeline = Arc::default();
        let queue = Arc::new(TimelineQueue {
            timeline: Arc::clone(&timeline),
            fail: fail_queue,
            enqueued: Mutex::new(Vec::new()),
        });
        let audit = Arc::new(InMemoryAuditLog::new());
        let senders = SenderRegistry::new().with_sender(
            "email",
            Arc::new(TimelineSender {
                timeline: Arc::clone(&timeline),
                fail_for: fail_for.map(String::from),
            }),
        );
        let scheduler = CadenceScheduler::new(senders, Arc::clone(&queue), audit.clone() as _);
        Fixture {
            timeline,
            queue,
            audit,
            scheduler,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(false, None)
    }

    fn cadence() -> Cadence {
        Cadence::new(
            TenantId::new(),
            "onboarding",
            vec![
                CadenceStep::new(0, "Welcome {{name}}!"),
                CadenceStep::new(3600, "Still with us, {{name}}?"),
            ],
        )
    }

    fn recipient(address: &str, name: &str) -> Recipient {
        let mut variables = VariableMap::new();
        variables.set("name", serde_json::json!(name));
        Recipient {
            id: ContactId::new(),
            address: address.to_string(),
            default_channel: "email".to_string(),
            variables,
        }
    }

    fn job_for(cadence: &Cadence, recipients: &[Recipient], step_index: usize) -> CadenceJob {
        CadenceJob {
            cadence_id: cadence.id,
            recipient_ids: recipients.iter().map(|r| r.id).collect(),
            step_index,
        }
    }

    #[tokio::test]
    async fn sends_render_per_recipient_then_enqueue_follows() {
        let fixture = fixture();
        let cadence = cadence();
        let recipients = vec![recipient("a@x.com", "Ada"), recipient("b@x.com", "Ben")];
        let job = job_for(&cadence, &recipients, 0);

        let tick = fixture
            .scheduler
            .tick(&cadence, &job, &recipients)
            .await
            .unwrap();
        assert_eq!(
            tick,
            CadenceTick::Sent {
                step_index: 0,
                advanced: true
            }
        );

        // Every send of step 0 precedes the enqueue of step 1.
        let timeline = fixture.timeline.lock().unwrap().clone();
        assert_eq!(
            timeline,
            vec![
                "send:a@x.com:Welcome Ada!",
                "send:b@x.com:Welcome Ben!",
                "enqueue:1",
            ]
        );

        // Exactly one enqueue, due after the next step's delay.
        let enqueued = fixture.queue.enqueued.lock().unwrap();
        assert_eq!(enqueued.len(), 1);
        let (ResumeJob::Cadence {
            cadence_id,
            recipient_ids,
            step_index,
        }, not_before) = &enqueued[0]
        else {
            panic!("expected cadence job");
        };
        assert_eq!(*cadence_id, cadence.id);
        assert_eq!(*step_index, 1);
        assert_eq!(recipient_ids.len(), 2);
        assert!(*not_before >= Utc::now() + Duration::seconds(3599));
    }

    #[tokio::test]
    async fn final_step_exhausts_without_enqueue() {
        let fixture = fixture();
        let cadence = cadence();
        let recipients = vec![recipient("a@x.com", "Ada")];
        let job = job_for(&cadence, &recipients, 1);

        let tick = fixture
            .scheduler
            .tick(&cadence, &job, &recipients)
            .await
            .unwrap();
        assert_eq!(tick, CadenceTick::Exhausted);
        assert!(fixture.queue.enqueued.lock().unwrap().is_empty());
        assert!(matches!(
            fixture.audit.events().last(),
            Some(CadenceEvent::Exhausted { .. })
        ));
    }

    #[tokio::test]
    async fn queue_failure_is_loud_after_sends() {
        let fixture = fixture_with(true, None);
        let cadence = cadence();
        let recipients = vec![recipient("a@x.com", "Ada")];
        let job = job_for(&cadence, &recipients, 0);

        let err = fixture
            .scheduler
            .tick(&cadence, &job, &recipients)
            .await
            .unwrap_err();
        assert!(matches!(err, CadenceError::QueueUnavailable { step_index: 1, .. }));

        // The step's sends happened and were audited before the failure.
        let events = fixture.audit.events();
        assert!(matches!(events[0], CadenceEvent::MessageSent { step_index: 0, .. }));
        assert!(!events.iter().any(|e| matches!(e, CadenceEvent::StepEnqueued { .. })));
    }

    #[tokio::test]
    async fn one_failed_recipient_does_not_block_the_batch() {
        let fixture = fixture_with(false, Some("b@x.com"));
        let cadence = cadence();
        let recipients = vec![recipient("a@x.com", "Ada"), recipient("b@x.com", "Ben")];
        let job = job_for(&cadence, &recipients, 0);

        let tick = fixture
            .scheduler
            .tick(&cadence, &job, &recipients)
            .await
            .unwrap();
        assert_eq!(
            tick,
            CadenceTick::Sent {
                step_index: 0,
                advanced: true
            }
        );

        let events = fixture.audit.events();
        assert!(events.iter().any(|e| matches!(e, CadenceEvent::SendFailed { .. })));
        // Advancement still happened.
        assert_eq!(fixture.queue.enqueued.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disabled_cadence_refuses_to_fire() {
        let fixture = fixture();
        let mut cadence = cadence();
        cadence.enabled = false;
        let recipients = vec![recipient("a@x.com", "Ada")];
        let job = job_for(&cadence, &recipients, 0);

        let err = fixture
            .scheduler
            .tick(&cadence, &job, &recipients)
            .await
            .unwrap_err();
        assert!(matches!(err, CadenceError::Disabled { .. }));
        assert!(fixture.timeline.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_step_is_an_error() {
        let fixture = fixture();
        let cadence = cadence();
        let recipients = vec![recipient("a@x.com", "Ada")];
        let job = job_for(&cadence, &recipients, 9);

        let err = fixture
            .scheduler
            .tick(&cadence, &job, &recipients)
            .await
            .unwrap_err();
        assert!(matches!(err, CadenceError::UnknownStep { step_index: 9, .. }));
    }

    #[tokio::test]
    async fn step_channel_override_beats_recipient_default() {
        // Register a sender only under the override channel; the
        // recipient's default has none.
        let timeline: Timeline = Arc::default();
        let queue = Arc::new(TimelineQueue {
            timeline: Arc::clone(&timeline),
            fail: false,
            enqueued: Mutex::new(Vec::new()),
        });
        let audit = Arc::new(InMemoryAuditLog::new());
        let senders = SenderRegistry::new().with_sender(
            "sms",
            Arc::new(TimelineSender {
                timeline: Arc::clone(&timeline),
                fail_for: None,
            }),
        );
        let scheduler = CadenceScheduler::new(senders, queue, audit.clone() as _);

        let cadence = Cadence::new(
            TenantId::new(),
            "sms blast",
            vec![CadenceStep::new(0, "ping").with_channel("sms")],
        );
        let recipients = vec![recipient("+15550001111", "Ada")];
        let job = job_for(&cadence, &recipients, 0);

        let tick = scheduler.tick(&cadence, &job, &recipients).await.unwrap();
        assert_eq!(tick, CadenceTick::Exhausted);
        assert_eq!(
            timeline.lock().unwrap().as_slice(),
            &["send:+15550001111:ping".to_string()]
        );
    }
}
