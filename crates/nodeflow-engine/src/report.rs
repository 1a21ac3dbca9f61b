use serde::{Deserialize, Serialize};

use nodeflow_core::types::{NodeId, RunId};

/// Result of one node firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FiringOutcome {
    Success { output: String },
    Error { message: String },
}

/// One dequeued `(node, payload)` work item and what came of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFiring {
    pub node_id: NodeId,
    pub input: String,
    #[serde(flatten)]
    pub outcome: FiringOutcome,
    /// Execution time in milliseconds, excluding the pacing delay.
    pub elapsed_ms: u64,
}

impl NodeFiring {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, FiringOutcome::Success { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match &self.outcome {
            FiringOutcome::Success { output } => Some(output),
            FiringOutcome::Error { .. } => None,
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    /// Firings in execution order.
    pub firings: Vec<NodeFiring>,
    pub elapsed_ms: u64,
    /// The firing cap was hit and queued work was dropped.
    pub truncated: bool,
}

impl RunReport {
    /// Whether every firing succeeded.
    pub fn succeeded(&self) -> bool {
        self.firings.iter().all(NodeFiring::succeeded)
    }

    /// Firings of one node, in order.
    pub fn firings_of<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a NodeFiring> + 'a {
        self.firings.iter().filter(move |f| &f.node_id == id)
    }
}
