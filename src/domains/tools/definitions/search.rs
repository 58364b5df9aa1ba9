//! Grounded web search tool definition.
//!
//! Decodes the untyped wire arguments into a [`SearchQuery`] once, then hands
//! it to the [`SearchService`]. Every outcome, including bad input and
//! upstream failures, comes back as an [`InvocationResult`].

use std::sync::Arc;

use rmcp::{handler::server::tool::schema_for_type, model::JsonObject};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::domains::search::{SearchQuery, SearchService, ThinkingLevel};
use crate::domains::tools::handlers::{InvocationResult, ToolHandler};
use crate::domains::tools::registry::ToolDescriptor;

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the search tool (schema only; decoding is done by [`decode_query`]).
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// The search question.
    #[schemars(
        description = "The search query. Please describe it as if asking a question in natural language, rather than specifying keywords. Example: [What are the most contributive biological factors to human civilizational evolution, according to the latest research?]"
    )]
    pub query: String,

    /// Output token limit for this search.
    #[schemars(description = "Maximum number of tokens for the response")]
    pub max_token: Option<f64>,

    /// Reasoning effort hint.
    #[schemars(
        description = "Optional thinking level for the model: MINIMAL, LOW, MEDIUM or HIGH (default: server setting)"
    )]
    pub thinking_level: Option<String>,
}

/// Argument keys accepted for the question, in priority order.
const QUESTION_KEYS: [&str; 2] = ["query", "question"];

/// Reasons a set of wire arguments cannot become a [`SearchQuery`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Missing or empty query parameter")]
    MissingQuery,

    #[error("Invalid thinking_level parameter: {0}")]
    InvalidThinkingLevel(String),
}

/// Decode untyped tool arguments into a typed query.
///
/// `max_token` is only honoured when it is a JSON number that truncates to a
/// positive integer; anything else means "use the server default".
pub fn decode_query(arguments: &JsonObject) -> Result<SearchQuery, DecodeError> {
    let question = QUESTION_KEYS
        .iter()
        .filter_map(|key| arguments.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|q| !q.is_empty())
        .ok_or(DecodeError::MissingQuery)?
        .to_string();

    let max_tokens = arguments
        .get("max_token")
        .and_then(Value::as_f64)
        .map(f64::trunc)
        .filter(|n| *n >= 1.0)
        .map(|n| n.min(f64::from(u32::MAX)) as u32);

    let thinking_level = match arguments.get("thinking_level").and_then(Value::as_str) {
        Some(raw) => {
            ThinkingLevel::parse_optional(raw).map_err(DecodeError::InvalidThinkingLevel)?
        }
        None => None,
    };

    Ok(SearchQuery {
        question,
        max_tokens,
        thinking_level,
    })
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Search tool - answers a natural-language question with grounded sources.
pub struct SearchTool {
    service: Arc<SearchService>,
}

impl SearchTool {
    /// Tool name as registered in MCP.
    pub const NAME: &'static str = "search";

    /// Tool description shown to clients.
    pub const DESCRIPTION: &'static str = "Searches the web using Gemini Grounded Search. Expect more accurate results by searching in a natural language question format rather than by keywords.";

    pub fn new(service: Arc<SearchService>) -> Self {
        Self { service }
    }

    /// Describe this tool, advertising the server's default output limit.
    pub fn descriptor(&self) -> ToolDescriptor {
        let mut schema = schema_for_type::<SearchParams>();
        let default_max = self.service.defaults().max_tokens;

        if let Some(max_token) = schema
            .get_mut("properties")
            .and_then(Value::as_object_mut)
            .and_then(|props| props.get_mut("max_token"))
            .and_then(Value::as_object_mut)
        {
            max_token.insert(
                "description".to_string(),
                Value::String(format!(
                    "Maximum number of tokens for the response (default: {})",
                    default_max
                )),
            );
        }

        ToolDescriptor::new(Self::NAME, Self::DESCRIPTION, schema)
    }

    /// Execute a decoded query.
    #[instrument(skip(self), fields(question = %query.question))]
    pub async fn execute(&self, query: &SearchQuery) -> InvocationResult {
        let result = match self.service.search(query).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "failed to search");
                return InvocationResult::failure(format!(
                    "failed to generate grounded content: {}",
                    e
                ));
            }
        };

        debug!(sources = result.sources.len(), "search completed");

        match result.to_json() {
            Ok(json) => InvocationResult::success(json),
            Err(e) => {
                error!(error = %e, "failed to convert response to JSON");
                InvocationResult::failure(e.to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl ToolHandler for SearchTool {
    async fn call(&self, arguments: JsonObject) -> InvocationResult {
        match decode_query(&arguments) {
            Ok(query) => self.execute(&query).await,
            Err(e) => {
                warn!(error = %e, "rejecting search call");
                InvocationResult::failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domains::search::{
        Attribution, Generation, GenerationRequest, QueryTemplate, SearchBackend, SearchDefaults,
        SearchError,
    };
    use std::sync::Mutex;

    /// In-memory backend that records every request it receives.
    pub(crate) struct RecordingBackend {
        pub requests: Mutex<Vec<GenerationRequest>>,
        outcome: fn() -> Result<Generation, SearchError>,
    }

    impl RecordingBackend {
        pub(crate) fn new(outcome: fn() -> Result<Generation, SearchError>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                outcome,
            }
        }

        pub(crate) fn calls(&self) -> Vec<GenerationRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl SearchBackend for RecordingBackend {
        async fn generate(&self, request: &GenerationRequest) -> Result<Generation, SearchError> {
            self.requests.lock().unwrap().push(request.clone());
            (self.outcome)()
        }
    }

    pub(crate) fn answer() -> Result<Generation, SearchError> {
        Ok(Generation {
            generated_text: "T".to_string(),
            attributions: vec![Attribution {
                title: "A".to_string(),
                domain: "a.com".to_string(),
                url: "http://a.com".to_string(),
            }],
        })
    }

    pub(crate) fn defaults() -> SearchDefaults {
        SearchDefaults {
            model: "gemini-test".to_string(),
            max_tokens: 5000,
            query_template: None,
            thinking_level: None,
            thinking_budget: None,
        }
    }

    fn tool_with(backend: Arc<RecordingBackend>, defaults: SearchDefaults) -> SearchTool {
        SearchTool::new(Arc::new(SearchService::new(backend, defaults)))
    }

    fn args(value: serde_json::Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_missing_or_empty_query_never_calls_backend() {
        let backend = Arc::new(RecordingBackend::new(answer));
        let tool = tool_with(backend.clone(), defaults());

        for arguments in [
            serde_json::json!({}),
            serde_json::json!({"query": ""}),
            serde_json::json!({"query": "   "}),
            serde_json::json!({"question": ""}),
            serde_json::json!({"query": 42}),
        ] {
            let result = tool.call(args(arguments)).await;
            assert_eq!(
                result,
                InvocationResult::failure("Missing or empty query parameter")
            );
        }

        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_success_payload_contains_text_and_groundings() {
        let backend = Arc::new(RecordingBackend::new(answer));
        let tool = tool_with(backend, defaults());

        let payload = match tool.call(args(serde_json::json!({"query": "q"}))).await {
            InvocationResult::Success(payload) => payload,
            other => panic!("expected success, got {other:?}"),
        };

        let decoded: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded["text"], "T");
        assert_eq!(
            decoded["groundings"][0],
            serde_json::json!({"title": "A", "domain": "a.com", "url": "http://a.com"})
        );
    }

    #[tokio::test]
    async fn test_max_token_defaulting() {
        let backend = Arc::new(RecordingBackend::new(answer));
        let tool = tool_with(backend.clone(), defaults());

        for arguments in [
            serde_json::json!({"query": "q"}),
            serde_json::json!({"query": "q", "max_token": 0}),
            serde_json::json!({"query": "q", "max_token": -3}),
            serde_json::json!({"query": "q", "max_token": "many"}),
        ] {
            tool.call(args(arguments)).await;
        }
        tool.call(args(serde_json::json!({"query": "q", "max_token": 1234})))
            .await;
        tool.call(args(serde_json::json!({"query": "q", "max_token": 99.9})))
            .await;

        let limits: Vec<u32> = backend
            .calls()
            .iter()
            .map(|r| r.max_output_tokens)
            .collect();
        assert_eq!(limits, vec![5000, 5000, 5000, 5000, 1234, 99]);
    }

    #[tokio::test]
    async fn test_fixed_temperature_model_and_template() {
        let backend = Arc::new(RecordingBackend::new(answer));
        let mut defaults = defaults();
        defaults.query_template = Some(QueryTemplate::parse("Research this: %s").unwrap());
        let tool = tool_with(backend.clone(), defaults);

        tool.call(args(serde_json::json!({"question": "why?"}))).await;

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt, "Research this: why?");
        assert_eq!(calls[0].model, "gemini-test");
        assert_eq!(calls[0].temperature, 0.0);
    }

    #[tokio::test]
    async fn test_thinking_level_request_overrides_default() {
        let backend = Arc::new(RecordingBackend::new(answer));
        let mut defaults = defaults();
        defaults.thinking_level = Some(ThinkingLevel::Low);
        let tool = tool_with(backend.clone(), defaults);

        tool.call(args(serde_json::json!({"query": "q"}))).await;
        tool.call(args(serde_json::json!({"query": "q", "thinking_level": "high"})))
            .await;
        tool.call(args(serde_json::json!({"query": "q", "thinking_level": ""})))
            .await;

        let levels: Vec<_> = backend.calls().iter().map(|r| r.thinking_level).collect();
        assert_eq!(
            levels,
            vec![
                Some(ThinkingLevel::Low),
                Some(ThinkingLevel::High),
                Some(ThinkingLevel::Low)
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_thinking_level_is_failure() {
        let backend = Arc::new(RecordingBackend::new(answer));
        let tool = tool_with(backend.clone(), defaults());

        let result = tool
            .call(args(serde_json::json!({"query": "q", "thinking_level": "turbo"})))
            .await;
        assert!(result.is_failure());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_errors_become_failures() {
        fn api_error() -> Result<Generation, SearchError> {
            Err(SearchError::api(429, "quota exceeded"))
        }
        fn blocked() -> Result<Generation, SearchError> {
            Err(SearchError::content_blocked("SAFETY"))
        }

        let tool = tool_with(Arc::new(RecordingBackend::new(api_error)), defaults());
        match tool.call(args(serde_json::json!({"query": "q"}))).await {
            InvocationResult::Failure(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("quota exceeded"));
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let tool = tool_with(Arc::new(RecordingBackend::new(blocked)), defaults());
        match tool.call(args(serde_json::json!({"query": "q"}))).await {
            InvocationResult::Failure(msg) => assert!(msg.contains("Content blocked")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_descriptor_schema() {
        let backend = Arc::new(RecordingBackend::new(answer));
        let tool = tool_with(backend, defaults());
        let descriptor = tool.descriptor();

        assert_eq!(descriptor.name, "search");
        let schema = serde_json::Value::Object((*descriptor.input_schema).clone());
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], serde_json::json!(["query"]));
        assert_eq!(
            schema["properties"]["max_token"]["description"],
            "Maximum number of tokens for the response (default: 5000)"
        );
    }
}
