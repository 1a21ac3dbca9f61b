use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique node identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier of one workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution status of a node within one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

impl NodeStatus {
    /// `Success` and `Error` end a firing.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Success | NodeStatus::Error)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Idle => "idle",
            NodeStatus::Running => "running",
            NodeStatus::Success => "success",
            NodeStatus::Error => "error",
        };
        f.pad(s)
    }
}

/// Observable execution fields of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeExecution {
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl NodeExecution {
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Events emitted by the execution engine during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run was accepted and is about to reset node state.
    RunStarted {
        run_id: RunId,
        at: DateTime<Utc>,
    },
    /// A node was reset to idle at run start.
    NodeReset { node_id: NodeId },
    /// A node was dequeued and marked running.
    NodeStarted { node_id: NodeId, input: String },
    /// A node finished its behavior.
    NodeSucceeded {
        node_id: NodeId,
        output: String,
        elapsed_ms: u64,
    },
    /// A node's behavior failed; its branch stops here.
    NodeFailed {
        node_id: NodeId,
        error: String,
        elapsed_ms: u64,
    },
    /// The queue drained.
    RunCompleted {
        run_id: RunId,
        firings: usize,
        truncated: bool,
        elapsed_ms: u64,
    },
    /// The run failed before any node executed.
    RunFailed { run_id: RunId, error: String },
}

impl RunEvent {
    /// The node this event is addressed to, if any.
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            RunEvent::NodeReset { node_id }
            | RunEvent::NodeStarted { node_id, .. }
            | RunEvent::NodeSucceeded { node_id, .. }
            | RunEvent::NodeFailed { node_id, .. } => Some(node_id),
            RunEvent::RunStarted { .. }
            | RunEvent::RunCompleted { .. }
            | RunEvent::RunFailed { .. } => None,
        }
    }
}
