//! Collaborator contracts for node executors.
//!
//! The engine's boundary is a set of traits it calls into: message
//! senders, an HTTP caller, a tool runner, and a queue router. They are
//! constructed once at process start, bundled into [`Collaborators`], and
//! passed into the driver — never a package-level mutable singleton.
//! Collaborators receive fully-rendered inputs and return structured
//! results; they never touch the graph or the execution context.

use async_trait::async_trait;
use parley_core::{MessageId, QueueId, RunId};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Sends a rendered message body to a recipient address.
///
/// One implementation per channel (e.g. a phone-number-addressed channel,
/// a platform-id-addressed channel). Retry of failed sends is the
/// implementation's concern, not the engine's.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Sends a message and returns the provider-assigned message id.
    async fn send(&self, recipient: &str, body: &str) -> Result<MessageId, SendError>;
}

/// Errors from message sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The recipient address was rejected by the provider.
    InvalidRecipient { recipient: String },
    /// The provider could not be reached or timed out.
    ProviderUnavailable { message: String },
    /// The provider rejected the message.
    Rejected { message: String },
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRecipient { recipient } => {
                write!(f, "invalid recipient: {recipient}")
            }
            Self::ProviderUnavailable { message } => {
                write!(f, "message provider unavailable: {message}")
            }
            Self::Rejected { message } => write!(f, "message rejected: {message}"),
        }
    }
}

impl std::error::Error for SendError {}

/// Registry of message senders keyed by channel name.
///
/// Built once at startup from the configured providers; lookups use the
/// channel name string stored in node/step config.
#[derive(Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<String, Arc<dyn MessageSender>>,
}

impl SenderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            senders: HashMap::new(),
        }
    }

    /// Registers a sender under a channel name, replacing any previous one.
    #[must_use]
    pub fn with_sender(mut self, channel: impl Into<String>, sender: Arc<dyn MessageSender>) -> Self {
        self.senders.insert(channel.into(), sender);
        self
    }

    /// Returns the sender for a channel, if one is registered.
    #[must_use]
    pub fn get(&self, channel: &str) -> Option<&Arc<dyn MessageSender>> {
        self.senders.get(channel)
    }

    /// Returns the registered channel names.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.senders.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for SenderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderRegistry")
            .field("channels", &self.senders.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A fully-rendered outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCallRequest {
    /// HTTP method, e.g. "POST".
    pub method: String,
    /// Target URL.
    pub url: String,
    /// Header (name, value) pairs.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<String>,
}

/// The response of an outbound HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpCallResponse {
    /// Response status code.
    pub status: u16,
    /// Response body, parsed as JSON when possible, else a JSON string.
    pub body: JsonValue,
}

impl HttpCallResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors from the HTTP caller transport.
///
/// Non-2xx responses are not transport errors; they come back as a
/// [`HttpCallResponse`] and the executor decides what to do with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpCallError {
    /// The request could not be built (bad method or URL).
    InvalidRequest { message: String },
    /// The call did not complete within the configured timeout.
    Timeout,
    /// Connection or protocol failure.
    Transport { message: String },
}

impl std::fmt::Display for HttpCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest { message } => write!(f, "invalid http request: {message}"),
            Self::Timeout => write!(f, "http call timed out"),
            Self::Transport { message } => write!(f, "http transport error: {message}"),
        }
    }
}

impl std::error::Error for HttpCallError {}

/// Issues outbound HTTP calls. The engine owns templating of the
/// request; implementations own the transport.
#[async_trait]
pub trait HttpCaller: Send + Sync {
    /// Performs a single request and returns the response.
    async fn call(&self, request: HttpCallRequest) -> Result<HttpCallResponse, HttpCallError>;
}

/// Errors from tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// No tool registered under this name.
    UnknownTool { tool: String },
    /// The tool ran and failed.
    ExecutionFailed { tool: String, message: String },
    /// The tool did not complete within its time budget.
    Timeout { tool: String },
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTool { tool } => write!(f, "unknown tool: {tool}"),
            Self::ExecutionFailed { tool, message } => {
                write!(f, "tool '{tool}' failed: {message}")
            }
            Self::Timeout { tool } => write!(f, "tool '{tool}' timed out"),
        }
    }
}

impl std::error::Error for ToolError {}

/// Executes named external tools / AI actions.
///
/// Opaque to the engine beyond name and parameter map.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs a tool and returns its structured result.
    async fn run(&self, tool: &str, params: JsonValue) -> Result<JsonValue, ToolError>;
}

/// Errors from queue assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignError {
    /// The queue does not exist.
    UnknownQueue { queue_id: QueueId },
    /// The assignment service could not be reached.
    ServiceUnavailable { message: String },
}

impl std::fmt::Display for AssignError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownQueue { queue_id } => write!(f, "unknown queue: {queue_id}"),
            Self::ServiceUnavailable { message } => {
                write!(f, "assignment service unavailable: {message}")
            }
        }
    }
}

impl std::error::Error for AssignError {}

/// Routes a conversation/run to an agent queue.
#[async_trait]
pub trait QueueRouter: Send + Sync {
    /// Assigns the run's conversation to the target queue.
    async fn assign(&self, run_id: RunId, queue_id: QueueId) -> Result<(), AssignError>;
}

/// The full set of collaborators a driver needs, built once at startup.
#[derive(Clone)]
pub struct Collaborators {
    /// Message senders keyed by channel name.
    pub senders: SenderRegistry,
    /// Outbound HTTP caller.
    pub http: Arc<dyn HttpCaller>,
    /// Tool/AI action runner.
    pub tools: Arc<dyn ToolRunner>,
    /// Queue assignment service.
    pub queues: Arc<dyn QueueRouter>,
}
