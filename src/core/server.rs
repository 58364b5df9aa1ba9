//! MCP server assembly.
//!
//! Wires configuration, the search backend, the tool registry and the
//! session engine together. Transports receive a [`McpServer`] and only talk
//! to its [`SessionEngine`].

use std::sync::Arc;

use tracing::info;

use super::config::Config;
use super::error::Result;
use super::session::{ServerIdentity, SessionEngine};
use crate::domains::search::{GeminiClient, SearchBackend, SearchDefaults, SearchService};
use crate::domains::tools::build_tool_registry;

const INSTRUCTIONS: &str = "This server answers questions with Google Search grounding. \
Call the `search` tool with a natural-language query; the result contains the answer text \
and the web sources it was grounded on.";

/// The assembled MCP server.
#[derive(Clone)]
pub struct McpServer {
    /// Server configuration.
    config: Arc<Config>,

    /// Protocol engine shared by every transport session.
    engine: Arc<SessionEngine>,
}

impl McpServer {
    /// Create a server backed by the Gemini API.
    pub fn new(config: Config) -> Result<Self> {
        let client = GeminiClient::new(&config.gemini)?;
        Self::with_backend(config, Arc::new(client))
    }

    /// Create a server with a custom search backend.
    pub fn with_backend(config: Config, backend: Arc<dyn SearchBackend>) -> Result<Self> {
        let config = Arc::new(config);

        let search = Arc::new(SearchService::new(
            backend,
            SearchDefaults::from(&config.gemini),
        ));
        let registry = Arc::new(build_tool_registry(search)?);
        info!(
            "Registered {} tool(s): {}",
            registry.len(),
            registry.tool_names().join(", ")
        );

        let identity = ServerIdentity {
            name: config.server.name.clone(),
            version: config.server.version.clone(),
            instructions: INSTRUCTIONS.to_string(),
        };

        Ok(Self {
            engine: Arc::new(SessionEngine::new(registry, identity)),
            config,
        })
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.config.server.version
    }

    /// Get the server configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Get the session engine.
    pub fn engine(&self) -> &Arc<SessionEngine> {
        &self.engine
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::config::{GeminiConfig, LoggingConfig, ServerConfig};
    use crate::core::transport::HttpConfig;
    use crate::domains::search::{Generation, SearchError};
    use crate::domains::tools::definitions::search::tests::{RecordingBackend, answer};

    pub(crate) fn test_config() -> Config {
        Config {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            gemini: GeminiConfig {
                api_key: "test-key".to_string(),
                model_name: "gemini-test".to_string(),
                max_tokens: 5000,
                query_template: None,
                thinking_level: None,
                thinking_budget: None,
                base_url: "http://127.0.0.1:9".to_string(),
                timeout_seconds: 5,
            },
            http: HttpConfig::default(),
        }
    }

    /// Server over an in-memory backend that answers with `outcome`.
    pub(crate) fn test_server(
        outcome: fn() -> std::result::Result<Generation, SearchError>,
    ) -> (McpServer, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::new(outcome));
        let server = McpServer::with_backend(test_config(), backend.clone()).unwrap();
        (server, backend)
    }

    #[test]
    fn test_server_identity_from_config() {
        let (server, _) = test_server(answer);
        assert_eq!(server.name(), "grounded-search-mcp");
        assert_eq!(server.version(), env!("CARGO_PKG_VERSION"));
        assert_eq!(server.config().gemini.model_name, "gemini-test");
    }

    #[test]
    fn test_new_builds_gemini_client() {
        let server = McpServer::new(test_config()).unwrap();
        assert_eq!(server.name(), "grounded-search-mcp");
    }
}
