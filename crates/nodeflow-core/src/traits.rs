use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::{AgentSettings, DEFAULT_MODEL};

/// Temperature used when a request does not set one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Substituted when the provider answers without usable text.
pub const EMPTY_RESPONSE_FALLBACK: &str = "No response generated.";

/// System instruction used by [`AgentClient::search`].
pub const SEARCH_INSTRUCTION: &str =
    "You are a search engine. Provide a concise summary of the search results for the user's query.";

/// Per-request settings for a text-generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationConfig {
    pub model: String,
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub use_search: bool,
}

impl InvocationConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            temperature: None,
            use_search: false,
        }
    }

    /// Grounded search summarization on the default fast model.
    pub fn search() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_instruction: Some(SEARCH_INSTRUCTION.to_string()),
            temperature: None,
            use_search: true,
        }
    }

    pub fn temperature_or_default(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }
}

impl From<&AgentSettings> for InvocationConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            model: settings.model.clone(),
            system_instruction: settings.system_instruction.clone(),
            temperature: settings.temperature,
            use_search: settings.use_search,
        }
    }
}

/// External text-generation capability.
///
/// Implementations return the generated text, with grounding citations
/// appended when the provider supplies them. An empty provider answer is not
/// a failure; it yields [`EMPTY_RESPONSE_FALLBACK`].
pub trait AgentClient: Send + Sync + 'static {
    /// Generate text for `prompt`.
    fn invoke(&self, prompt: &str, config: &InvocationConfig) -> BoxFuture<'_, Result<String>>;

    /// Search-grounded summary of `query`.
    fn search(&self, query: &str) -> BoxFuture<'_, Result<String>> {
        self.invoke(query, &InvocationConfig::search())
    }
}
