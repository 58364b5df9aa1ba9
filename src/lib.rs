//! Grounded Search MCP Server Library
//!
//! A Model Context Protocol (MCP) server exposing a single `search` tool:
//! ask a question, get back an answer grounded in Google Search results
//! together with the web sources it cites.
//!
//! # Architecture
//!
//! - **core**: configuration, error handling, the transport-agnostic
//!   protocol session engine, server assembly and the transports
//!   (stdio and streamable HTTP)
//! - **domains**: business logic organized by bounded contexts
//!   - **tools**: tool registry, handlers and the `search` tool
//!   - **search**: search service and the Gemini backend
//!
//! # Example
//!
//! ```rust,no_run
//! use grounded_search_mcp_server::core::{Config, ConfigOverrides, McpServer, TransportConfig, TransportService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None, &ConfigOverrides::default())?;
//!     let server = McpServer::new(config)?;
//!     TransportService::new(TransportConfig::Stdio).run(server).await?;
//!     Ok(())
//! }
//! ```

#[cfg(not(any(feature = "stdio", feature = "http")))]
compile_error!("enable at least one transport feature: `stdio` or `http`");

pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, McpServer, Result};
