//! Workflow graph implementation using petgraph.
//!
//! Workflows are directed graphs where nodes are typed steps and edges
//! are control-flow transitions, optionally labeled with a branch key.
//! The graph is read-only during execution; only the authoring surface
//! mutates it.
//!
//! The graph also provides the edge-resolver primitives the driver uses:
//! [`WorkflowGraph::single_successor`] for linear nodes and
//! [`WorkflowGraph::labeled_successor`] for branching nodes.

use crate::edge::Edge;
use crate::error::GraphError;
use crate::node::{Node, NodeId, NodeKind};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A workflow graph using petgraph's directed graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// The underlying directed graph.
    #[serde(with = "graph_serde")]
    graph: DiGraph<Node, Edge>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    #[serde(skip)]
    node_index_map: HashMap<NodeId, NodeIndex>,
}

impl WorkflowGraph {
    /// Creates a new empty workflow graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_index_map: HashMap::new(),
        }
    }

    /// Adds a node to the graph. Returns the node ID.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let node_id = node.id;
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id, index);
        node_id
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(&node_id)?;
        self.graph.node_weight(*index)
    }

    /// Adds an edge between two nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint does not exist. Branch-shape
    /// rules (one edge per label, single edge for linear nodes) are
    /// checked by [`WorkflowGraph::validate`], not here, so an authoring
    /// surface can build incrementally.
    pub fn add_edge(
        &mut self,
        source_id: NodeId,
        target_id: NodeId,
        edge: Edge,
    ) -> Result<(), GraphError> {
        let source_index = self
            .node_index_map
            .get(&source_id)
            .ok_or(GraphError::NodeNotFound { node_id: source_id })?;

        let target_index = self
            .node_index_map
            .get(&target_id)
            .ok_or(GraphError::NodeNotFound { node_id: target_id })?;

        self.graph.add_edge(*source_index, *target_index, edge);
        Ok(())
    }

    /// Returns all nodes in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the unique start node, if the graph has exactly one.
    #[must_use]
    pub fn start_node(&self) -> Option<&Node> {
        let mut starts = self.nodes().filter(|n| n.kind() == NodeKind::Start);
        let first = starts.next()?;
        if starts.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// Returns the outgoing edges of a node as `(target, edge)` pairs.
    pub fn successors(&self, node_id: NodeId) -> Vec<(&Node, &Edge)> {
        let Some(&index) = self.node_index_map.get(&node_id) else {
            return Vec::new();
        };

        self.graph
            .edges_directed(index, Direction::Outgoing)
            .filter_map(|edge| {
                let target = self.graph.node_weight(edge.target())?;
                Some((target, edge.weight()))
            })
            .collect()
    }

    /// Resolves the single successor of a non-branching node.
    ///
    /// Returns `None` when the node has no outgoing edge (terminal node).
    #[must_use]
    pub fn single_successor(&self, node_id: NodeId) -> Option<NodeId> {
        self.successors(node_id).first().map(|(node, _)| node.id)
    }

    /// Resolves the successor reached through the edge labeled `branch`.
    ///
    /// Returns `None` when no outgoing edge carries that label; the
    /// driver treats that as a fail-safe terminal rather than picking an
    /// arbitrary edge.
    #[must_use]
    pub fn labeled_successor(&self, node_id: NodeId, branch: &str) -> Option<NodeId> {
        self.successors(node_id)
            .into_iter()
            .find(|(_, edge)| edge.matches(branch))
            .map(|(node, _)| node.id)
    }

    /// Validates the structural invariants of the graph:
    ///
    /// - exactly one start node
    /// - non-branching nodes have at most one outgoing edge, unlabeled
    /// - branching nodes have at most one outgoing edge per label, and
    ///   every outgoing edge is labeled
    ///
    /// Cycles are legal; the driver's step budget bounds them at runtime.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), GraphError> {
        let start_count = self
            .nodes()
            .filter(|n| n.kind() == NodeKind::Start)
            .count();
        match start_count {
            0 => return Err(GraphError::MissingStart),
            1 => {}
            count => return Err(GraphError::MultipleStarts { count }),
        }

        for node in self.nodes() {
            let outgoing = self.successors(node.id);
            if node.kind().is_branching() {
                let mut seen = HashSet::new();
                for (_, edge) in &outgoing {
                    let Some(label) = edge.label.as_deref() else {
                        return Err(GraphError::UnlabeledBranch { node_id: node.id });
                    };
                    if !seen.insert(label.to_string()) {
                        return Err(GraphError::DuplicateBranchLabel {
                            node_id: node.id,
                            label: label.to_string(),
                        });
                    }
                }
            } else if outgoing.len() > 1 {
                return Err(GraphError::MultipleSuccessors { node_id: node.id });
            }
        }

        Ok(())
    }

    /// Rebuilds the node index map after deserialization.
    pub fn rebuild_index_map(&mut self) {
        self.node_index_map.clear();
        for index in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(index) {
                self.node_index_map.insert(node.id, index);
            }
        }
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom serde for petgraph DiGraph: nodes plus (source, target, edge)
/// triples keyed by stable node IDs rather than petgraph indices.
mod graph_serde {
    use super::*;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeStruct;

    pub fn serialize<S>(graph: &DiGraph<Node, Edge>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let nodes: Vec<_> = graph.node_weights().cloned().collect();
        let edges: Vec<_> = graph
            .edge_references()
            .map(|e| {
                let source_id = graph.node_weight(e.source()).map(|n| n.id);
                let target_id = graph.node_weight(e.target()).map(|n| n.id);
                (source_id, target_id, e.weight().clone())
            })
            .collect();

        let mut state = serializer.serialize_struct("Graph", 2)?;
        state.serialize_field("nodes", &nodes)?;
        state.serialize_field("edges", &edges)?;
        state.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DiGraph<Node, Edge>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        type EdgeTuple = (Option<NodeId>, Option<NodeId>, Edge);

        struct GraphVisitor;

        impl<'de> Visitor<'de> for GraphVisitor {
            type Value = DiGraph<Node, Edge>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a workflow graph with nodes and edges")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut nodes: Option<Vec<Node>> = None;
                let mut edges: Option<Vec<EdgeTuple>> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "nodes" => nodes = Some(map.next_value()?),
                        "edges" => edges = Some(map.next_value()?),
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }

                let nodes = nodes.unwrap_or_default();
                let edges = edges.unwrap_or_default();

                let mut graph = DiGraph::new();
                let mut id_to_index = HashMap::new();

                for node in nodes {
                    let id = node.id;
                    let index = graph.add_node(node);
                    id_to_index.insert(id, index);
                }

                for (source_id, target_id, edge) in edges {
                    let (Some(source), Some(target)) = (source_id, target_id) else {
                        continue;
                    };
                    let (Some(&source_idx), Some(&target_idx)) =
                        (id_to_index.get(&source), id_to_index.get(&target))
                    else {
                        continue;
                    };
                    graph.add_edge(source_idx, target_idx, edge);
                }

                Ok(graph)
            }
        }

        deserializer.deserialize_struct("Graph", &["nodes", "edges"], GraphVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionOperator;
    use crate::node::NodeConfig;
    use serde_json::json;

    fn start_node() -> Node {
        Node::new("Start", NodeConfig::Start)
    }

    fn content_node(name: &str) -> Node {
        Node::new(
            name,
            NodeConfig::Content {
                channel: "whatsapp".to_string(),
                body: "hi".to_string(),
            },
        )
    }

    fn condition_node(name: &str) -> Node {
        Node::new(
            name,
            NodeConfig::Condition {
                field: "age".to_string(),
                operator: ConditionOperator::GreaterThan,
                value: json!(18),
            },
        )
    }

    #[test]
    fn add_and_get_node() {
        let mut graph = WorkflowGraph::new();
        let node = start_node();
        let node_id = node.id;
        graph.add_node(node);

        let retrieved = graph.get_node(node_id);
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().name, "Start");
    }

    #[test]
    fn add_edge_rejects_missing_endpoint() {
        let mut graph = WorkflowGraph::new();
        let start = start_node();
        let start_id = start.id;
        graph.add_node(start);

        let result = graph.add_edge(start_id, NodeId::new(), Edge::unlabeled());
        assert!(matches!(result, Err(GraphError::NodeNotFound { .. })));
    }

    #[test]
    fn single_successor_resolution() {
        let mut graph = WorkflowGraph::new();
        let start = start_node();
        let content = content_node("Greeting");
        let start_id = start.id;
        let content_id = content.id;

        graph.add_node(start);
        graph.add_node(content);
        graph
            .add_edge(start_id, content_id, Edge::unlabeled())
            .unwrap();

        assert_eq!(graph.single_successor(start_id), Some(content_id));
        // Terminal node has no successor.
        assert_eq!(graph.single_successor(content_id), None);
    }

    #[test]
    fn labeled_successor_resolution() {
        let mut graph = WorkflowGraph::new();
        let cond = condition_node("Adult?");
        let adult = content_node("Adult");
        let minor = content_node("Minor");
        let cond_id = cond.id;
        let adult_id = adult.id;
        let minor_id = minor.id;

        graph.add_node(cond);
        graph.add_node(adult);
        graph.add_node(minor);
        graph
            .add_edge(cond_id, adult_id, Edge::labeled("true"))
            .unwrap();
        graph
            .add_edge(cond_id, minor_id, Edge::labeled("false"))
            .unwrap();

        assert_eq!(graph.labeled_successor(cond_id, "true"), Some(adult_id));
        assert_eq!(graph.labeled_successor(cond_id, "false"), Some(minor_id));
        assert_eq!(graph.labeled_successor(cond_id, "maybe"), None);
    }

    #[test]
    fn validate_requires_exactly_one_start() {
        let mut graph = WorkflowGraph::new();
        graph.add_node(content_node("Orphan"));
        assert!(matches!(graph.validate(), Err(GraphError::MissingStart)));

        let mut graph = WorkflowGraph::new();
        graph.add_node(start_node());
        graph.add_node(start_node());
        assert!(matches!(
            graph.validate(),
            Err(GraphError::MultipleStarts { count: 2 })
        ));
    }

    #[test]
    fn validate_rejects_fanout_from_linear_node() {
        let mut graph = WorkflowGraph::new();
        let start = start_node();
        let a = content_node("A");
        let b = content_node("B");
        let start_id = start.id;
        let a_id = a.id;
        let b_id = b.id;

        graph.add_node(start);
        graph.add_node(a);
        graph.add_node(b);
        graph.add_edge(start_id, a_id, Edge::unlabeled()).unwrap();
        graph.add_edge(start_id, b_id, Edge::unlabeled()).unwrap();

        assert!(matches!(
            graph.validate(),
            Err(GraphError::MultipleSuccessors { .. })
        ));
    }

    #[test]
    fn validate_rejects_unlabeled_condition_edge() {
        let mut graph = WorkflowGraph::new();
        let start = start_node();
        let cond = condition_node("C");
        let a = content_node("A");
        let start_id = start.id;
        let cond_id = cond.id;
        let a_id = a.id;

        graph.add_node(start);
        graph.add_node(cond);
        graph.add_node(a);
        graph.add_edge(start_id, cond_id, Edge::unlabeled()).unwrap();
        graph.add_edge(cond_id, a_id, Edge::unlabeled()).unwrap();

        assert!(matches!(
            graph.validate(),
            Err(GraphError::UnlabeledBranch { .. })
        ));
    }

    #[test]
    fn validate_rejects_duplicate_branch_labels() {
        let mut graph = WorkflowGraph::new();
        let start = start_node();
        let cond = condition_node("C");
        let a = content_node("A");
        let b = content_node("B");
        let start_id = start.id;
        let cond_id = cond.id;
        let a_id = a.id;
        let b_id = b.id;

        graph.add_node(start);
        graph.add_node(cond);
        graph.add_node(a);
        graph.add_node(b);
        graph.add_edge(start_id, cond_id, Edge::unlabeled()).unwrap();
        graph.add_edge(cond_id, a_id, Edge::labeled("true")).unwrap();
        graph.add_edge(cond_id, b_id, Edge::labeled("true")).unwrap();

        assert!(matches!(
            graph.validate(),
            Err(GraphError::DuplicateBranchLabel { .. })
        ));
    }

    #[test]
    fn cycles_pass_validation() {
        // Retry loops are legal; the step budget bounds them at runtime.
        let mut graph = WorkflowGraph::new();
        let start = start_node();
        let a = content_node("A");
        let b = content_node("B");
        let start_id = start.id;
        let a_id = a.id;
        let b_id = b.id;

        graph.add_node(start);
        graph.add_node(a);
        graph.add_node(b);
        graph.add_edge(start_id, a_id, Edge::unlabeled()).unwrap();
        graph.add_edge(a_id, b_id, Edge::unlabeled()).unwrap();
        graph.add_edge(b_id, a_id, Edge::unlabeled()).unwrap();

        assert!(graph.validate().is_ok());
    }

    #[test]
    fn graph_serde_roundtrip() {
        let mut graph = WorkflowGraph::new();
        let start = start_node();
        let content = content_node("Greeting");
        let start_id = start.id;
        let content_id = content.id;

        graph.add_node(start);
        graph.add_node(content);
        graph
            .add_edge(start_id, content_id, Edge::unlabeled())
            .unwrap();

        let json = serde_json::to_string(&graph).expect("serialize");
        let mut parsed: WorkflowGraph = serde_json::from_str(&json).expect("deserialize");
        parsed.rebuild_index_map();

        assert_eq!(parsed.node_count(), 2);
        assert_eq!(parsed.edge_count(), 1);
        assert_eq!(parsed.single_successor(start_id), Some(content_id));
    }
}
