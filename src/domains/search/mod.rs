//! Search domain module.
//!
//! Everything needed to turn a validated question into a grounded answer:
//!
//! - `client.rs` - The [`SearchBackend`] seam and the Gemini HTTP client
//! - `service.rs` - Server defaults, query templating, error classification
//! - `types.rs` - Queries, results, groundings and thinking levels
//! - `error.rs` - Search-specific error types

mod client;
mod error;
mod service;
mod types;

pub use client::{GeminiClient, SearchBackend};
pub use error::SearchError;
pub use service::{SEARCH_TEMPERATURE, SearchDefaults, SearchService};
pub use types::{
    Attribution, Generation, GenerationRequest, QueryTemplate, SearchQuery, SearchResult, Source,
    TEMPLATE_PLACEHOLDER, ThinkingLevel,
};
