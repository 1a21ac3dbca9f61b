pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{NodeflowError, Result};
pub use event::EventBus;
pub use graph::{Edge, Graph, Node, NodeKind, Position};
pub use traits::{AgentClient, InvocationConfig};
pub use types::*;
