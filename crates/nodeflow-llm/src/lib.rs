pub mod providers;
pub mod retry;

use std::sync::Arc;

use nodeflow_core::config::ProviderConfig;
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::AgentClient;

pub use providers::gemini::GeminiClient;
pub use retry::RetryingClient;

/// Create the agent client for the configured provider.
///
/// The client is wrapped in a [`RetryingClient`] when `[provider.retry]` is set.
pub fn create_client(config: &ProviderConfig) -> Result<Arc<dyn AgentClient>> {
    let client: Box<dyn AgentClient> = match config.kind.as_str() {
        "gemini" | "google" => Box::new(GeminiClient::new(config.clone())?),
        other => {
            return Err(NodeflowError::Config(format!(
                "Unsupported provider: {}",
                other
            )))
        }
    };

    let client: Arc<dyn AgentClient> = match &config.retry {
        Some(retry) => Arc::new(RetryingClient::new(client, retry.clone())),
        None => Arc::from(client),
    };
    Ok(client)
}
