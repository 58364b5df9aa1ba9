//! Core module containing shared infrastructure components.
//!
//! This module provides the foundational building blocks for the MCP server:
//! error handling, configuration, the protocol session engine, server
//! assembly and the transport layer.

pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod transport;

pub use config::{Config, ConfigError, ConfigOverrides};
pub use error::{Error, Result};
pub use server::McpServer;
pub use session::{ErrorObserver, Session, SessionEngine, SessionState};
pub use transport::{TransportConfig, TransportService};
