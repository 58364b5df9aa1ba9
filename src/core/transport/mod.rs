//! Transport layer for the MCP server.
//!
//! This module provides two transport implementations:
//! - **STDIO**: newline-delimited JSON-RPC on standard input/output - feature: `stdio`
//! - **HTTP**: streamable HTTP with a request-filter chain - feature: `http`
//!
//! Each transport owns the connection lifecycle and hands every message to
//! the shared [`SessionEngine`](crate::core::SessionEngine).
//!
//! # Feature Flags
//!
//! - `stdio` (default): STDIO transport - no extra dependencies
//! - `http` (default): HTTP transport - adds axum, tower, tower-http

mod config;
mod error;
mod service;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub mod middleware;

#[cfg(feature = "stdio")]
pub mod stdio;

pub use config::{HEALTH_PATH, HttpConfig, TransportConfig};
pub use error::{TransportError, TransportResult};
pub use service::TransportService;
