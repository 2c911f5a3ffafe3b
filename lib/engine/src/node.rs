//! Workflow node types and configurations.
//!
//! Nodes are the typed steps of a workflow graph. Each node has:
//! - A unique ID within the workflow
//! - A kind (Start, Content, Condition, Delay, ...)
//! - Configuration specific to its kind
//!
//! Node configuration is a tagged union keyed by kind, so every executor
//! receives its own strongly-typed config variant rather than a generic
//! bag of fields. Malformed configs are rejected at deserialization time,
//! not discovered mid-run.

use crate::condition::ConditionOperator;
use parley_core::QueueId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use ulid::Ulid;

/// A unique identifier for a node within a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Ulid);

impl NodeId {
    /// Creates a new random node ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a node ID from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// The kind of a workflow node.
///
/// This is a closed enum: the engine knows how to execute exactly these
/// step types and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The unique entry point of a workflow.
    Start,
    /// Send a templated message through a channel.
    Content,
    /// Evaluate a condition and branch on the result.
    Condition,
    /// Suspend the run until a timer fires.
    Delay,
    /// Issue an outbound HTTP call and merge the response.
    Http,
    /// Invoke a named external tool or AI action.
    ToolCall,
    /// Hand the conversation to an agent queue.
    AssignQueue,
    /// Present options and suspend awaiting the user's reply.
    Menu,
}

impl NodeKind {
    /// Returns true if this node kind selects its successor by branch label.
    #[must_use]
    pub fn is_branching(&self) -> bool {
        matches!(self, Self::Condition | Self::Menu)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Content => "content",
            Self::Condition => "condition",
            Self::Delay => "delay",
            Self::Http => "http",
            Self::ToolCall => "tool_call",
            Self::AssignQueue => "assign_queue",
            Self::Menu => "menu",
        };
        f.write_str(s)
    }
}

/// One selectable option of a menu node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    /// The key the user replies with, also the branch label.
    pub key: String,
    /// The option text shown to the user.
    pub text: String,
}

impl MenuOption {
    /// Creates a new menu option.
    #[must_use]
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// HTTP method for an http node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Configuration for a node, varying by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeConfig {
    /// Entry point. Carries no configuration.
    Start,
    /// Send a rendered message body to the run's contact.
    Content {
        /// Channel name used to pick a message sender.
        channel: String,
        /// Message body template, `{{path}}` placeholders allowed.
        body: String,
    },
    /// Evaluate `{field, operator, value}` against the variable map.
    Condition {
        /// Dotted path into the variable map.
        field: String,
        /// Comparison operator.
        operator: ConditionOperator,
        /// Right-hand side of the comparison.
        value: JsonValue,
    },
    /// Suspend for a fixed duration.
    Delay {
        /// Delay duration in seconds. Must be non-negative.
        seconds: i64,
    },
    /// Outbound HTTP call with variable substitution.
    Http {
        /// HTTP method.
        method: HttpMethod,
        /// URL template.
        url: String,
        /// Header templates as (name, value) pairs.
        #[serde(default)]
        headers: Vec<(String, String)>,
        /// Optional body template.
        #[serde(default)]
        body: Option<String>,
        /// Variable key the response body is merged under.
        merge_key: String,
    },
    /// Invoke a named tool with a parameter map.
    ToolCall {
        /// Tool name, opaque to the engine.
        tool: String,
        /// Parameter map passed through to the tool runner.
        params: JsonValue,
        /// Variable key the structured result is merged under.
        merge_key: String,
    },
    /// Assign the conversation to an agent queue.
    AssignQueue {
        /// Target queue.
        queue_id: QueueId,
    },
    /// Present options and await a correlated reply.
    Menu {
        /// Prompt template shown before the options.
        prompt: String,
        /// Selectable options. Option keys double as branch labels.
        options: Vec<MenuOption>,
        /// Channel name used to deliver the prompt.
        channel: String,
    },
}

impl NodeConfig {
    /// Returns the kind of this node configuration.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Start => NodeKind::Start,
            Self::Content { .. } => NodeKind::Content,
            Self::Condition { .. } => NodeKind::Condition,
            Self::Delay { .. } => NodeKind::Delay,
            Self::Http { .. } => NodeKind::Http,
            Self::ToolCall { .. } => NodeKind::ToolCall,
            Self::AssignQueue { .. } => NodeKind::AssignQueue,
            Self::Menu { .. } => NodeKind::Menu,
        }
    }
}

/// A workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node within the workflow.
    pub id: NodeId,
    /// Human-readable name for this node.
    pub name: String,
    /// Node configuration (determines kind and behavior).
    pub config: NodeConfig,
}

impl Node {
    /// Creates a new node with the given configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            config,
        }
    }

    /// Creates a new node with a specific ID.
    #[must_use]
    pub fn with_id(id: NodeId, name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id,
            name: name.into(),
            config,
        }
    }

    /// Returns the kind of this node.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        let id = NodeId::new();
        let display = id.to_string();
        assert!(display.starts_with("node_"));
    }

    #[test]
    fn config_kind_matches_variant() {
        let content = NodeConfig::Content {
            channel: "whatsapp".to_string(),
            body: "Hi {{name}}".to_string(),
        };
        assert_eq!(content.kind(), NodeKind::Content);

        let delay = NodeConfig::Delay { seconds: 60 };
        assert_eq!(delay.kind(), NodeKind::Delay);
    }

    #[test]
    fn branching_kinds() {
        assert!(NodeKind::Condition.is_branching());
        assert!(NodeKind::Menu.is_branching());
        assert!(!NodeKind::Content.is_branching());
        assert!(!NodeKind::Start.is_branching());
    }

    #[test]
    fn node_serde_roundtrip() {
        let node = Node::new(
            "Greeting",
            NodeConfig::Content {
                channel: "whatsapp".to_string(),
                body: "Hello {{contact.name}}".to_string(),
            },
        );
        let json = serde_json::to_string(&node).expect("serialize");
        let parsed: Node = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(node, parsed);
    }

    #[test]
    fn condition_config_deserializes_from_authoring_shape() {
        let json = serde_json::json!({
            "kind": "condition",
            "field": "age",
            "operator": "greater_than",
            "value": 18
        });
        let config: NodeConfig = serde_json::from_value(json).expect("deserialize");
        assert_eq!(config.kind(), NodeKind::Condition);
    }

    #[test]
    fn http_method_display() {
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert_eq!(HttpMethod::Post.to_string(), "POST");
    }
}
