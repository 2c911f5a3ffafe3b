//! Core domain types for the parley engagement platform.
//!
//! This crate provides the strongly-typed identifiers shared by the
//! workflow engine and the cadence scheduler.

pub mod id;

pub use id::{
    CadenceId, ContactId, MessageId, ParseIdError, QueueId, RunId, TenantId, WorkflowId,
};
