//! Per-node execution state and its projection from run events.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use nodeflow_core::types::{NodeExecution, NodeId, NodeStatus, RunEvent};

/// Fold one event into a node's observable fields.
///
/// A firing keeps the previous output visible while running. Success replaces
/// the output and clears any error; failure records the error message.
pub fn project(current: &NodeExecution, event: &RunEvent) -> NodeExecution {
    match event {
        RunEvent::NodeReset { .. } => NodeExecution::idle(),
        RunEvent::NodeStarted { .. } => NodeExecution {
            status: NodeStatus::Running,
            ..current.clone()
        },
        RunEvent::NodeSucceeded { output, .. } => NodeExecution {
            status: NodeStatus::Success,
            output: Some(output.clone()),
            error_message: None,
        },
        RunEvent::NodeFailed { error, .. } => NodeExecution {
            status: NodeStatus::Error,
            output: current.output.clone(),
            error_message: Some(error.clone()),
        },
        RunEvent::RunStarted { .. } | RunEvent::RunCompleted { .. } | RunEvent::RunFailed { .. } => {
            current.clone()
        }
    }
}

/// Execution state of every node, keyed by node id.
///
/// Only the engine writes; each write replaces a whole entry, so a reader
/// never observes a half-updated node.
#[derive(Debug, Default)]
pub struct StatusBoard {
    entries: RwLock<HashMap<NodeId, NodeExecution>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of one node. Unknown nodes read as idle.
    pub fn get(&self, id: &NodeId) -> NodeExecution {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<NodeId, NodeExecution> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn apply(&self, event: &RunEvent) {
        let Some(id) = event.node_id() else {
            return;
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let next = project(entries.get(id).unwrap_or(&NodeExecution::idle()), event);
        entries.insert(id.clone(), next);
    }

    pub(crate) fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> NodeId {
        NodeId::from("n")
    }

    #[test]
    fn test_success_sets_output_and_clears_error() {
        let failed = NodeExecution {
            status: NodeStatus::Error,
            output: None,
            error_message: Some("old".into()),
        };
        let next = project(
            &failed,
            &RunEvent::NodeSucceeded {
                node_id: id(),
                output: "text".into(),
                elapsed_ms: 1,
            },
        );
        assert_eq!(next.status, NodeStatus::Success);
        assert_eq!(next.output.as_deref(), Some("text"));
        assert!(next.error_message.is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let done = NodeExecution {
            status: NodeStatus::Success,
            output: Some("x".into()),
            error_message: None,
        };
        assert_eq!(project(&done, &RunEvent::NodeReset { node_id: id() }), NodeExecution::idle());
    }

    #[test]
    fn test_started_keeps_previous_output() {
        let done = NodeExecution {
            status: NodeStatus::Success,
            output: Some("first".into()),
            error_message: None,
        };
        let next = project(
            &done,
            &RunEvent::NodeStarted {
                node_id: id(),
                input: "second".into(),
            },
        );
        assert_eq!(next.status, NodeStatus::Running);
        assert_eq!(next.output.as_deref(), Some("first"));
    }

    #[test]
    fn test_board_applies_only_node_events() {
        let board = StatusBoard::new();
        board.apply(&RunEvent::NodeStarted {
            node_id: id(),
            input: "p".into(),
        });
        board.apply(&RunEvent::NodeFailed {
            node_id: id(),
            error: "quota".into(),
            elapsed_ms: 3,
        });
        board.apply(&RunEvent::RunFailed {
            run_id: Default::default(),
            error: "ignored".into(),
        });

        let state = board.get(&id());
        assert_eq!(state.status, NodeStatus::Error);
        assert_eq!(state.error_message.as_deref(), Some("quota"));
        assert_eq!(board.snapshot().len(), 1);
        assert_eq!(board.get(&NodeId::from("other")), NodeExecution::idle());
    }
}
