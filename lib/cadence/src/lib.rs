//! Stepped follow-up cadences for the parley platform.
//!
//! A cadence is a message sequence without a graph: ordered steps with
//! per-step delays, fired to batches of recipients. Workers are
//! stateless; all resume state travels in the delayed job payload, on
//! the same delay-queue contract the workflow engine uses.

pub mod cadence;
pub mod error;
pub mod scheduler;

pub use cadence::{Cadence, CadenceJob, CadenceStep, Recipient};
pub use error::CadenceError;
pub use scheduler::{AuditLog, CadenceEvent, CadenceScheduler, CadenceTick, InMemoryAuditLog};
