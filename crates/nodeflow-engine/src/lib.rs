//! Workflow execution engine.
//!
//! `WorkflowEngine` walks a graph breadth-first from its trigger node,
//! invoking each node's behavior and feeding its output to every successor.
//! Execution state is kept in a `StatusBoard` and mirrored as `RunEvent`s on
//! an `EventBus`.

pub mod executor;
pub mod report;
pub mod status;

pub use executor::WorkflowEngine;
pub use report::{FiringOutcome, NodeFiring, RunReport};
pub use status::{project, StatusBoard};
