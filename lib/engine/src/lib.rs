//! Workflow automation engine for the parley platform.
//!
//! This crate interprets directed workflow graphs over conversations:
//!
//! - **Graph Model**: petgraph-backed directed graphs with typed nodes
//!   (start, content, condition, delay, http, tool call, assign queue,
//!   menu) and labeled edges
//! - **Execution Context**: per-run variables, cursor, append-only log
//! - **Run Driver**: synchronous segment execution with cooperative
//!   suspension on delays and menus, bounded retries, and a step budget
//! - **Collaborators**: injected message senders, HTTP caller, tool
//!   runner and queue router
//! - **Persistence**: context store and delay queue contracts with NATS
//!   JetStream implementations

pub mod collab;
pub mod condition;
pub mod context;
pub mod definition;
pub mod driver;
pub mod edge;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod graph;
pub mod http;
pub mod nats;
pub mod node;
pub mod retry;
pub mod settings;
pub mod store;
pub mod template;

pub use collab::{
    AssignError, Collaborators, HttpCallError, HttpCallRequest, HttpCallResponse, HttpCaller,
    MessageSender, QueueRouter, SendError, SenderRegistry, ToolError, ToolRunner,
};
pub use condition::ConditionOperator;
pub use context::{ExecutionContext, LogEntry, RunStatus, StepOutcome, VariableMap};
pub use definition::{Workflow, WorkflowMetadata};
pub use driver::RunDriver;
pub use edge::Edge;
pub use envelope::Envelope;
pub use error::{EngineError, GraphError};
pub use executor::{ExecOutcome, StepError, execute_node};
pub use graph::WorkflowGraph;
pub use http::ReqwestCaller;
pub use nats::{NatsConfig, NatsContextStore, NatsDelayQueue};
pub use node::{MenuOption, Node, NodeConfig, NodeId, NodeKind};
pub use retry::RetryPolicy;
pub use settings::{EngineSettings, RetrySettings};
pub use store::{ContextStore, DelayQueue, QueueError, ResumeJob, StoreError};
pub use template::render;
