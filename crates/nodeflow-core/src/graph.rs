//! Workflow graph model.
//!
//! A workflow is a set of `Node`s connected by directed `Edge`s. Nodes carry
//! only their kind-specific configuration; execution state is kept by the
//! engine in a separate table keyed by node id.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{NodeflowError, Result};
use crate::types::NodeId;

/// Model used when an agent node has none configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Prompt given to freshly created trigger nodes.
pub const DEFAULT_TRIGGER_PROMPT: &str = "Write a poem about coding.";

/// Canvas position. The engine never reads it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Configuration of a trigger node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerSettings {
    #[serde(default)]
    pub initial_prompt: String,
}

/// Configuration of an agent node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub use_search: bool,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl AgentSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            temperature: None,
            use_search: false,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_search(mut self, use_search: bool) -> Self {
        self.use_search = use_search;
        self
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

/// The closed set of node kinds, each with only its own configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Trigger(TriggerSettings),
    Agent(AgentSettings),
    Search,
    Output,
}

impl NodeKind {
    /// Short machine name, as used in graph files.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Trigger(_) => "trigger",
            NodeKind::Agent(_) => "agent",
            NodeKind::Search => "search",
            NodeKind::Output => "output",
        }
    }

    /// Label given to new nodes of this kind.
    pub fn default_label(&self) -> &'static str {
        match self {
            NodeKind::Trigger(_) => "Start Trigger",
            NodeKind::Agent(_) => "Gemini Agent",
            NodeKind::Search => "Google Search",
            NodeKind::Output => "Output Viewer",
        }
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self, NodeKind::Trigger(_))
    }
}

/// A single pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub position: Position,
}

impl Node {
    /// Create a node with a fresh id and the kind's default label.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            label: kind.default_label().to_string(),
            kind,
            position: Position::default(),
        }
    }

    pub fn trigger(initial_prompt: impl Into<String>) -> Self {
        Self::new(NodeKind::Trigger(TriggerSettings {
            initial_prompt: initial_prompt.into(),
        }))
    }

    pub fn agent(settings: AgentSettings) -> Self {
        Self::new(NodeKind::Agent(settings))
    }

    pub fn search() -> Self {
        Self::new(NodeKind::Search)
    }

    pub fn output() -> Self {
        Self::new(NodeKind::Output)
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }
}

/// A directed connection between two nodes. Edges carry no data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("e{}-{}", source, target),
            source,
            target,
        }
    }
}

/// Nodes in insertion order plus the edge list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The starter pipeline: Trigger -> Agent -> Output.
    pub fn demo() -> Self {
        let mut graph = Self::new();
        let nodes = [
            Node::trigger("Who is the CEO of Google?")
                .with_id("1")
                .at(100.0, 300.0),
            Node::agent(
                AgentSettings::new(DEFAULT_MODEL)
                    .with_system_instruction("You are a concise assistant."),
            )
            .with_id("2")
            .at(500.0, 300.0),
            Node::output()
                .with_id("3")
                .with_label("Final Output")
                .at(900.0, 300.0),
        ];
        for node in nodes {
            graph.nodes.push(node);
        }
        graph.edges.push(Edge::new("1", "2"));
        graph.edges.push(Edge::new("2", "3"));
        graph
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Mutable access for the editing surface (e.g. a properties form).
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    /// Add a node. Ids must be unique.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId> {
        if self.node(&node.id).is_some() {
            return Err(NodeflowError::DuplicateNode(node.id.to_string()));
        }
        let id = node.id.clone();
        self.nodes.push(node);
        Ok(id)
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let idx = self.nodes.iter().position(|n| &n.id == id)?;
        self.edges.retain(|e| &e.source != id && &e.target != id);
        Some(self.nodes.remove(idx))
    }

    /// Connect `source -> target`.
    ///
    /// Self-loops and unknown endpoints are rejected. Connecting an already
    /// connected pair returns the existing edge.
    pub fn connect(&mut self, source: &NodeId, target: &NodeId) -> Result<&Edge> {
        if source == target {
            return Err(NodeflowError::SelfLoop(source.to_string()));
        }
        for id in [source, target] {
            if self.node(id).is_none() {
                return Err(NodeflowError::UnknownNode(id.to_string()));
            }
        }

        let idx = match self
            .edges
            .iter()
            .position(|e| &e.source == source && &e.target == target)
        {
            Some(idx) => idx,
            None => {
                let mut edge = Edge::new(source.clone(), target.clone());
                edge.id = self.unused_edge_id(&edge.id);
                self.edges.push(edge);
                self.edges.len() - 1
            }
        };
        Ok(&self.edges[idx])
    }

    /// `base`, or `base-N` with the smallest N >= 2 not already taken.
    ///
    /// Node ids may contain `-`, so `e{source}-{target}` alone can collide.
    fn unused_edge_id(&self, base: &str) -> String {
        let taken = |id: &str| self.edges.iter().any(|e| e.id == id);
        if !taken(base) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Remove an edge by id.
    pub fn disconnect(&mut self, edge_id: &str) -> Option<Edge> {
        let idx = self.edges.iter().position(|e| e.id == edge_id)?;
        Some(self.edges.remove(idx))
    }

    /// Edges leaving `id`, in stored order.
    pub fn outgoing<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.source == id)
    }

    /// Trigger nodes in node order.
    pub fn triggers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind.is_trigger())
    }

    /// Check the invariants of a graph that was built outside `connect`/`add_node`,
    /// e.g. deserialized from a file.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(&node.id) {
                return Err(NodeflowError::DuplicateNode(node.id.to_string()));
            }
        }

        let mut pairs = HashSet::new();
        let mut edge_ids = HashSet::new();
        for edge in &self.edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(NodeflowError::DuplicateEdgeId(edge.id.clone()));
            }
            if edge.source == edge.target {
                return Err(NodeflowError::SelfLoop(edge.source.to_string()));
            }
            for id in [&edge.source, &edge.target] {
                if !ids.contains(id) {
                    return Err(NodeflowError::UnknownNode(id.to_string()));
                }
            }
            if !pairs.insert((&edge.source, &edge.target)) {
                return Err(NodeflowError::DuplicateEdge {
                    source_id: edge.source.to_string(),
                    target_id: edge.target.to_string(),
                });
            }
        }
        Ok(())
    }
}
