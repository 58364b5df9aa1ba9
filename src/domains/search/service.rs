//! Search service: applies server defaults and calls the backend.
//!
//! The service owns every server-level search setting (model, default output
//! limit, query template, thinking defaults) so tool handlers only deal with
//! the per-request [`SearchQuery`].

use std::sync::Arc;

use tracing::{debug, error, info};

use super::client::SearchBackend;
use super::error::SearchError;
use super::types::{GenerationRequest, QueryTemplate, SearchQuery, SearchResult, ThinkingLevel};
use crate::core::config::GeminiConfig;

/// Sampling temperature used for every search; grounded answers should be deterministic.
pub const SEARCH_TEMPERATURE: f32 = 0.0;

/// Server-level defaults applied to every search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDefaults {
    pub model: String,
    pub max_tokens: u32,
    pub query_template: Option<QueryTemplate>,
    pub thinking_level: Option<ThinkingLevel>,
    pub thinking_budget: Option<i32>,
}

impl From<&GeminiConfig> for SearchDefaults {
    fn from(config: &GeminiConfig) -> Self {
        Self {
            model: config.model_name.clone(),
            max_tokens: config.max_tokens,
            query_template: config.query_template.clone(),
            thinking_level: config.thinking_level,
            thinking_budget: config.thinking_budget,
        }
    }
}

/// Executes grounded searches against a [`SearchBackend`].
pub struct SearchService {
    backend: Arc<dyn SearchBackend>,
    defaults: SearchDefaults,
}

impl SearchService {
    /// Create a new search service.
    pub fn new(backend: Arc<dyn SearchBackend>, defaults: SearchDefaults) -> Self {
        info!(model = %defaults.model, max_tokens = defaults.max_tokens, "Initializing SearchService");
        Self { backend, defaults }
    }

    /// The defaults applied by this service.
    pub fn defaults(&self) -> &SearchDefaults {
        &self.defaults
    }

    /// Resolve a client query into the exact backend request.
    pub fn build_request(&self, query: &SearchQuery) -> GenerationRequest {
        let prompt = match &self.defaults.query_template {
            Some(template) => template.render(&query.question),
            None => query.question.clone(),
        };

        GenerationRequest {
            prompt,
            model: self.defaults.model.clone(),
            max_output_tokens: query.max_tokens.unwrap_or(self.defaults.max_tokens),
            temperature: SEARCH_TEMPERATURE,
            thinking_level: query.thinking_level.or(self.defaults.thinking_level),
            thinking_budget: self.defaults.thinking_budget,
        }
    }

    /// Run one search. Failures are logged with their kind and returned; no retry.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult, SearchError> {
        let request = self.build_request(query);
        debug!(
            question = %query.question,
            max_tokens = request.max_output_tokens,
            thinking_level = ?request.thinking_level,
            "executing search"
        );

        match self.backend.generate(&request).await {
            Ok(generation) => Ok(SearchResult::from(generation)),
            Err(err) => {
                match &err {
                    SearchError::Api { status, message } => {
                        error!(status_code = status, message = %message, "API error in search");
                    }
                    SearchError::ContentBlocked(reason) => {
                        error!(reason = %reason, "content blocked error in search");
                    }
                    other => {
                        error!(kind = other.kind(), error = %other, "search failed");
                    }
                }
                Err(err)
            }
        }
    }
}
