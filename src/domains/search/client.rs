//! Grounded-search backend abstraction and its Gemini implementation.
//!
//! The [`SearchBackend`] trait is the only seam the rest of the server sees.
//! [`GeminiClient`] talks to the `generateContent` REST endpoint with the
//! Google Search tool enabled and maps grounding metadata into attributions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::SearchError;
use super::types::{Attribution, Generation, GenerationRequest, ThinkingLevel};
use crate::core::config::GeminiConfig;

/// Finish reasons that mean the answer was withheld by safety filtering.
const BLOCKED_FINISH_REASONS: [&str; 4] = ["SAFETY", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

/// An external generative-search service.
///
/// Implementations must be safe to share between concurrent requests.
/// Dropping the returned future must abort the underlying call.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Generate a grounded answer for the given request.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, SearchError>;
}

/// HTTP client for the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl GeminiClient {
    /// Create a client from the Gemini section of the configuration.
    pub fn new(config: &GeminiConfig) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl SearchBackend for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, SearchError> {
        let url = self.endpoint(&request.model);
        debug!(model = %request.model, max_output_tokens = request.max_output_tokens, "calling generateContent");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest::from(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error_from_body(status.as_u16(), &body));
        }

        parse_generation(&body)
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    tools: Vec<RequestTool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct RequestTool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_level: Option<ThinkingLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_budget: Option<i32>,
}

impl From<&GenerationRequest> for GenerateContentRequest {
    fn from(request: &GenerationRequest) -> Self {
        let thinking_config = (request.thinking_level.is_some()
            || request.thinking_budget.is_some())
        .then(|| ThinkingConfig {
            thinking_level: request.thinking_level,
            thinking_budget: request.thinking_budget,
        });

        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart {
                    text: request.prompt.clone(),
                }],
            }],
            tools: vec![RequestTool {
                google_search: GoogleSearch {},
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
                thinking_config,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
    domain: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Build an API error from a non-success response body.
fn api_error_from_body(status: u16, body: &str) -> SearchError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    SearchError::api(status, message)
}

/// Parse a successful `generateContent` body into a [`Generation`].
fn parse_generation(body: &str) -> Result<Generation, SearchError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::malformed(format!("invalid JSON body: {}", e)))?;

    if let Some(feedback) = &response.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            let detail = feedback
                .block_reason_message
                .as_deref()
                .map(|msg| format!("{}: {}", reason, msg))
                .unwrap_or_else(|| reason.clone());
            return Err(SearchError::content_blocked(format!("prompt blocked ({})", detail)));
        }
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| SearchError::malformed("response contained no candidates"))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKED_FINISH_REASONS.contains(&reason) {
            return Err(SearchError::content_blocked(format!(
                "response blocked (finish reason {})",
                reason
            )));
        }
    }

    let generated_text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| !part.thought)
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    let attributions = candidate
        .grounding_metadata
        .map(|metadata| {
            metadata
                .grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .map(attribution_from_web)
                .collect()
        })
        .unwrap_or_default();

    Ok(Generation {
        generated_text,
        attributions,
    })
}

fn attribution_from_web(web: WebChunk) -> Attribution {
    let url = web.uri.unwrap_or_default();
    let title = web.title.unwrap_or_default();
    let domain = web
        .domain
        .filter(|d| !d.is_empty())
        .or_else(|| (!title.is_empty()).then(|| title.clone()))
        .unwrap_or_else(|| host_of(&url));

    Attribution { title, domain, url }
}

/// Host of an absolute URL; empty when the URL does not parse.
fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "What is Rust?".to_string(),
            model: "gemini-test".to_string(),
            max_output_tokens: 256,
            temperature: 0.0,
            thinking_level: None,
            thinking_budget: None,
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(GenerateContentRequest::from(&request())).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "What is Rust?");
        assert_eq!(body["tools"][0]["google_search"], serde_json::json!({}));
        assert_eq!(body["generationConfig"]["temperature"], 0.0);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert!(body["generationConfig"].get("thinkingConfig").is_none());
    }

    #[test]
    fn test_request_body_includes_thinking_hint() {
        let mut req = request();
        req.thinking_level = Some(ThinkingLevel::High);
        let body = serde_json::to_value(GenerateContentRequest::from(&req)).unwrap();

        assert_eq!(
            body["generationConfig"]["thinkingConfig"],
            serde_json::json!({"thinkingLevel": "HIGH"})
        );
    }

    #[test]
    fn test_parse_generation_text_and_sources() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Rust is "},
                    {"text": "a language."}
                ]},
                "finishReason": "STOP",
                "groundingMetadata": {"groundingChunks": [
                    {"web": {"uri": "https://redirect.example/1", "title": "rust-lang.org"}},
                    {"web": {"uri": "https://doc.rust-lang.org/book", "title": "The Book", "domain": "doc.rust-lang.org"}},
                    {"retrievedContext": {}}
                ]}
            }]
        }"#;

        let generation = parse_generation(body).unwrap();
        assert_eq!(generation.generated_text, "Rust is a language.");
        assert_eq!(generation.attributions.len(), 2);
        assert_eq!(generation.attributions[0].domain, "rust-lang.org");
        assert_eq!(generation.attributions[1].domain, "doc.rust-lang.org");
        assert_eq!(generation.attributions[1].title, "The Book");
    }

    #[test]
    fn test_parse_generation_prompt_blocked() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = parse_generation(body).unwrap_err();
        assert!(matches!(err, SearchError::ContentBlocked(_)));
    }

    #[test]
    fn test_parse_generation_finish_reason_blocked() {
        let body = r#"{"candidates": [{"finishReason": "PROHIBITED_CONTENT"}]}"#;
        let err = parse_generation(body).unwrap_err();
        assert!(matches!(err, SearchError::ContentBlocked(_)));
    }

    #[test]
    fn test_parse_generation_no_candidates() {
        let err = parse_generation("{}").unwrap_err();
        assert!(matches!(err, SearchError::MalformedResponse(_)));
    }

    #[test]
    fn test_api_error_uses_envelope_message() {
        let body = r#"{"error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}}"#;
        match api_error_from_body(403, body) {
            SearchError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_falls_back_to_raw_body() {
        match api_error_from_body(502, " upstream down ") {
            SearchError::Api { message, .. } => assert_eq!(message, "upstream down"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://example.com/path?q=1"), "example.com");
        assert_eq!(host_of("http://user@example.org:8080/"), "example.org");
        assert_eq!(host_of("http://[::1]:8080/x"), "[::1]");
        assert_eq!(host_of("example.net"), "");
        assert_eq!(host_of("not a url"), "");
    }

    #[test]
    fn test_domain_falls_back_to_url_host() {
        let attribution = attribution_from_web(WebChunk {
            uri: Some("https://[2001:db8::1]/page".to_string()),
            title: None,
            domain: None,
        });
        assert_eq!(attribution.domain, "[2001:db8::1]");
        assert_eq!(attribution.title, "");
    }
}
