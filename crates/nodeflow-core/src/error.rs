use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeflowError {
    // Run errors
    #[error("No Start Trigger found.")]
    NoTrigger,

    #[error("A workflow run is already in progress")]
    RunInProgress,

    // Agent invocation errors
    #[error("{0}")]
    Invocation(String),

    #[error("API key is missing. Set {0} or provider.api_key in the config file.")]
    MissingCredential(String),

    // Graph editing errors
    #[error("Node cannot connect to itself: {0}")]
    SelfLoop(String),

    #[error("Node not found: {0}")]
    UnknownNode(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Duplicate edge: {source_id} -> {target_id}")]
    DuplicateEdge { source_id: String, target_id: String },

    #[error("Duplicate edge id: {0}")]
    DuplicateEdgeId(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NodeflowError {
    /// Whether this error is recorded on the failing node instead of failing the run.
    pub fn is_node_scoped(&self) -> bool {
        matches!(
            self,
            NodeflowError::Invocation(_) | NodeflowError::MissingCredential(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NodeflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_trigger_message_matches_alert_text() {
        assert_eq!(NodeflowError::NoTrigger.to_string(), "No Start Trigger found.");
    }

    #[test]
    fn invocation_message_is_passed_through() {
        let err = NodeflowError::Invocation("HTTP 429: quota".into());
        assert_eq!(err.to_string(), "HTTP 429: quota");
        assert!(err.is_node_scoped());
    }

    #[test]
    fn run_level_errors_are_not_node_scoped() {
        assert!(!NodeflowError::NoTrigger.is_node_scoped());
        assert!(!NodeflowError::RunInProgress.is_node_scoped());
        assert!(NodeflowError::MissingCredential("GEMINI_API_KEY".into()).is_node_scoped());
    }
}
