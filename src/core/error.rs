//! Error types and handling for the MCP server.
//!
//! This module defines a unified error type that can represent errors from
//! all domains and layers, so startup code can use `?` across them.

use thiserror::Error;

/// A specialized Result type for MCP server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the MCP server.
#[derive(Debug, Error)]
pub enum Error {
    /// Error originating from the tools domain.
    #[error("Tool error: {0}")]
    Tool(#[from] crate::domains::tools::ToolError),

    /// Error originating from the search domain.
    #[error("Search error: {0}")]
    Search(#[from] crate::domains::search::SearchError),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Transport start-up or shutdown failures.
    #[error("Transport error: {0}")]
    Transport(#[from] super::transport::TransportError),
}
