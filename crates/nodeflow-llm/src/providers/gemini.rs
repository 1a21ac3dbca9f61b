use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use nodeflow_core::config::ProviderConfig;
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::{AgentClient, InvocationConfig, EMPTY_RESPONSE_FALLBACK};

/// Google Gemini native API client (`generateContent`).
pub struct GeminiClient {
    http: Client,
    config: ProviderConfig,
}

impl GeminiClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| NodeflowError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    fn resolve_model(&self, requested: &str) -> String {
        let requested = requested.trim();
        if requested.is_empty() {
            self.config.default_model.clone()
        } else {
            requested.to_string()
        }
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: None,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    google_search: GoogleSearch,
}

#[derive(Serialize, Debug)]
struct GoogleSearch {}

#[derive(Serialize, Debug)]
struct GenerationConfig {
    temperature: f32,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize, Debug)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Deserialize, Debug)]
struct WebSource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

// ── Conversion ───────────────────────────────────────────────────

fn build_request(prompt: &str, config: &InvocationConfig) -> GenerateRequest {
    let system_instruction = config
        .system_instruction
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| GeminiContent {
            role: None,
            parts: vec![GeminiPart::text(s)],
        });

    let tools = if config.use_search {
        vec![GeminiTool {
            google_search: GoogleSearch {},
        }]
    } else {
        vec![]
    };

    GenerateRequest {
        contents: vec![GeminiContent {
            role: Some("user".to_string()),
            parts: vec![GeminiPart::text(prompt)],
        }],
        system_instruction,
        tools,
        generation_config: GenerationConfig {
            temperature: config.temperature_or_default(),
        },
    }
}

/// Format grounding chunks as `*Sources: [title](uri), ...*`.
///
/// Chunks without both a title and a uri are skipped.
fn format_citations(chunks: &[GroundingChunk]) -> Option<String> {
    let links = chunks
        .iter()
        .filter_map(|chunk| {
            let web = chunk.web.as_ref()?;
            match (web.title.as_deref(), web.uri.as_deref()) {
                (Some(title), Some(uri)) if !title.is_empty() && !uri.is_empty() => {
                    Some(format!("[{}]({})", title, uri))
                }
                _ => None,
            }
        })
        .collect::<Vec<_>>();

    if links.is_empty() {
        None
    } else {
        Some(format!("*Sources: {}*", links.join(", ")))
    }
}

/// Turn a provider response into the node payload.
fn render_response(response: GenerateResponse) -> String {
    let candidate = response.candidates.into_iter().next();

    let text = candidate
        .as_ref()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter(|p| !p.thought.unwrap_or(false))
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| EMPTY_RESPONSE_FALLBACK.to_string());

    let citations = candidate
        .as_ref()
        .and_then(|c| c.grounding_metadata.as_ref())
        .and_then(|m| format_citations(&m.grounding_chunks));

    match citations {
        Some(sources) => format!("{}\n\n{}", text, sources),
        None => text,
    }
}

impl AgentClient for GeminiClient {
    fn invoke(&self, prompt: &str, config: &InvocationConfig) -> BoxFuture<'_, Result<String>> {
        let prompt = prompt.to_string();
        let config = config.clone();

        Box::pin(async move {
            let api_key = self
                .config
                .resolve_api_key()
                .ok_or_else(|| NodeflowError::MissingCredential(self.config.api_key_env.clone()))?;

            let model = self.resolve_model(&config.model);
            let body = build_request(&prompt, &config);

            debug!(
                model = %model,
                use_search = config.use_search,
                prompt_len = prompt.len(),
                "Calling Gemini generateContent"
            );

            let response = self
                .http
                .post(self.endpoint(&model))
                .header("content-type", "application/json")
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    warn!(model = %model, error = %e, "Gemini request failed");
                    if e.is_timeout() {
                        NodeflowError::Invocation(format!("Request timeout: {}", e))
                    } else if e.is_connect() {
                        NodeflowError::Invocation(format!("HTTP connection error: {}", e))
                    } else {
                        NodeflowError::Invocation(e.to_string())
                    }
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                warn!(model = %model, status = %status, "Gemini returned an error status");
                return Err(NodeflowError::Invocation(format!("HTTP {}: {}", status, body)));
            }

            let parsed: GenerateResponse = response.json().await.map_err(|e| {
                NodeflowError::Invocation(format!("Failed to parse Gemini response: {}", e))
            })?;

            Ok(render_response(parsed))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GenerateResponse {
        serde_json::from_str(json).unwrap()
    }

    fn client_for(server: &mockito::Server, api_key: Option<&str>) -> GeminiClient {
        GeminiClient::new(ProviderConfig {
            api_key: api_key.map(str::to_string),
            api_key_env: "NODEFLOW_TEST_GEMINI_UNSET".into(),
            base_url: server.url(),
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_request_shape() {
        let config = InvocationConfig::new("gemini-2.5-flash");
        let body = serde_json::to_value(build_request("hello", &config)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("tools").is_none());
        let temperature = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_request_with_search_and_instruction() {
        let body = serde_json::to_value(build_request("q", &InvocationConfig::search())).unwrap();
        assert_eq!(body["tools"][0], serde_json::json!({ "googleSearch": {} }));
        assert!(body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("You are a search engine."));
    }

    #[test]
    fn test_render_joins_text_parts() {
        let response = parse(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Sundar "},{"text":"Pichai"}]}}]}"#,
        );
        assert_eq!(render_response(response), "Sundar Pichai");
    }

    #[test]
    fn test_render_skips_thought_parts() {
        let response = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"thinking...","thought":true},{"text":"answer"}]}}]}"#,
        );
        assert_eq!(render_response(response), "answer");
    }

    #[test]
    fn test_render_empty_uses_fallback() {
        assert_eq!(render_response(parse(r#"{}"#)), "No response generated.");
        assert_eq!(
            render_response(parse(r#"{"candidates":[{"content":{"parts":[]}}]}"#)),
            "No response generated."
        );
    }

    #[test]
    fn test_render_appends_citations() {
        let response = parse(
            r#"{"candidates":[{
                "content":{"parts":[{"text":"Answer"}]},
                "groundingMetadata":{"groundingChunks":[
                    {"web":{"uri":"https://a.example","title":"A"}},
                    {"web":{"uri":"https://b.example"}},
                    {"web":{"uri":"https://c.example","title":"C"}}
                ]}
            }]}"#,
        );
        assert_eq!(
            render_response(response),
            "Answer\n\n*Sources: [A](https://a.example), [C](https://c.example)*"
        );
    }

    #[test]
    fn test_render_unusable_citations_add_nothing() {
        let response = parse(
            r#"{"candidates":[{
                "content":{"parts":[{"text":"Answer"}]},
                "groundingMetadata":{"groundingChunks":[{"web":{"title":"no uri"}},{}]}
            }]}"#,
        );
        assert_eq!(render_response(response), "Answer");
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.5-flash:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": "Who is the CEO of Google?" }] }],
                "systemInstruction": { "parts": [{ "text": "You are a concise assistant." }] }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"Sundar Pichai"}]}}]}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("test-key"));
        let config = InvocationConfig {
            system_instruction: Some("You are a concise assistant.".into()),
            ..InvocationConfig::new("gemini-2.5-flash")
        };
        let text = client
            .invoke("Who is the CEO of Google?", &config)
            .await
            .unwrap();

        assert_eq!(text, "Sundar Pichai");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_model_uses_default() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.5-flash:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("test-key"));
        let text = client
            .invoke("hi", &InvocationConfig::new(""))
            .await
            .unwrap();

        assert_eq!(text, "No response generated.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_invocation_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.5-flash:generateContent")
            .with_status(429)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let client = client_for(&server, Some("test-key"));
        let err = client.search("rust").await.unwrap_err();

        match err {
            NodeflowError::Invocation(msg) => {
                assert!(msg.contains("429"), "message was {}", msg);
                assert!(msg.contains("quota exceeded"));
            }
            other => panic!("expected Invocation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_credential_never_hits_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client
            .invoke("hi", &InvocationConfig::new("gemini-2.5-flash"))
            .await
            .unwrap_err();

        assert!(matches!(err, NodeflowError::MissingCredential(ref var) if var == "NODEFLOW_TEST_GEMINI_UNSET"));
        mock.assert_async().await;
    }
}
