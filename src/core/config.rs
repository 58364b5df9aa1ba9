//! Configuration management for the MCP server.
//!
//! Values are merged once, at startup, with a fixed precedence:
//! CLI flag > environment variable > configuration file > built-in default.
//! Call sites only ever see the merged, validated [`Config`].

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{Level, debug};

use super::transport::HttpConfig;
use crate::domains::search::{QueryTemplate, ThinkingLevel};

/// Configuration file looked up when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Default model used for grounded search.
pub const DEFAULT_MODEL_NAME: &str = "gemini-3-pro-preview";

/// Default output-token limit when neither the config nor the request sets one.
pub const DEFAULT_MAX_TOKENS: u32 = 5000;

/// Default Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default timeout for a single backend call.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error(
        "Gemini API key is required. Set gemini.api_key in the configuration file, use the --api-key flag or the GEMINI_API_KEY environment variable"
    )]
    MissingApiKey,
}

impl ConfigError {
    fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Main configuration structure for the MCP server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Grounded-search backend configuration.
    pub gemini: GeminiConfig,

    /// HTTP transport configuration.
    pub http: HttpConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "grounded-search-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,

    /// Enable debug-level logging.
    pub debug: bool,
}

impl LoggingConfig {
    /// Most verbose level that is logged.
    pub fn level(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }
}

/// Configuration for the Gemini grounded-search backend.
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub query_template: Option<QueryTemplate>,
    pub thinking_level: Option<ThinkingLevel>,
    pub thinking_budget: Option<i32>,
    pub base_url: String,
    pub timeout_seconds: u64,
}

/// Custom Debug implementation to redact secrets from logs.
impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model_name", &self.model_name)
            .field("max_tokens", &self.max_tokens)
            .field("query_template", &self.query_template)
            .field("thinking_level", &self.thinking_level)
            .field("thinking_budget", &self.thinking_budget)
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Values given on the command line. `None` leaves lower layers intact.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log: Option<String>,
    pub debug: Option<bool>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub thinking_level: Option<String>,
}

// ============================================================================
// Raw (unvalidated) layers
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    log: Option<String>,
    debug: Option<bool>,
    gemini: RawGemini,
    http: RawHttp,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawGemini {
    api_key: Option<String>,
    model_name: Option<String>,
    max_tokens: Option<i64>,
    query_template: Option<String>,
    thinking_level: Option<String>,
    thinking_budget: Option<i32>,
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHttp {
    host: Option<String>,
    port: Option<u16>,
    endpoint_path: Option<String>,
    auth_token: Option<String>,
    allowed_origins: Option<Vec<String>>,
    heartbeat_seconds: Option<i64>,
    shutdown_grace_seconds: Option<u64>,
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, format!("'{}': {}", value, e)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(
            key,
            format!("'{}' is not a boolean", other),
        )),
    }
}

impl RawConfig {
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment variables. Empty values count as unset.
    fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("LOG_PATH") {
            self.log = Some(v);
        }
        if let Some(v) = var("DEBUG") {
            self.debug = Some(parse_bool("DEBUG", &v)?);
        }

        let gemini = &mut self.gemini;
        if let Some(v) = var("GEMINI_API_KEY") {
            gemini.api_key = Some(v);
        }
        if let Some(v) = var("GEMINI_MODEL_NAME") {
            gemini.model_name = Some(v);
        }
        if let Some(v) = var("GEMINI_MAX_TOKENS") {
            gemini.max_tokens = Some(parse_env("GEMINI_MAX_TOKENS", &v)?);
        }
        if let Some(v) = var("GEMINI_QUERY_TEMPLATE") {
            gemini.query_template = Some(v);
        }
        if let Some(v) = var("GEMINI_THINKING_LEVEL") {
            gemini.thinking_level = Some(v);
        }
        if let Some(v) = var("GEMINI_THINKING_BUDGET") {
            gemini.thinking_budget = Some(parse_env("GEMINI_THINKING_BUDGET", &v)?);
        }
        if let Some(v) = var("GEMINI_BASE_URL") {
            gemini.base_url = Some(v);
        }
        if let Some(v) = var("GEMINI_TIMEOUT_SECONDS") {
            gemini.timeout_seconds = Some(parse_env("GEMINI_TIMEOUT_SECONDS", &v)?);
        }

        let http = &mut self.http;
        if let Some(v) = var("MCP_HTTP_HOST") {
            http.host = Some(v);
        }
        if let Some(v) = var("MCP_HTTP_PORT") {
            http.port = Some(parse_env("MCP_HTTP_PORT", &v)?);
        }
        if let Some(v) = var("MCP_HTTP_ENDPOINT_PATH") {
            http.endpoint_path = Some(v);
        }
        if let Some(v) = var("MCP_HTTP_AUTH_TOKEN") {
            http.auth_token = Some(v);
        }
        if let Some(v) = var("MCP_HTTP_ALLOWED_ORIGINS") {
            http.allowed_origins = Some(
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        if let Some(v) = var("MCP_HTTP_HEARTBEAT_SECONDS") {
            http.heartbeat_seconds = Some(parse_env("MCP_HTTP_HEARTBEAT_SECONDS", &v)?);
        }
        if let Some(v) = var("MCP_HTTP_SHUTDOWN_GRACE_SECONDS") {
            http.shutdown_grace_seconds =
                Some(parse_env("MCP_HTTP_SHUTDOWN_GRACE_SECONDS", &v)?);
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(log) = &overrides.log {
            self.log = Some(log.clone());
        }
        if let Some(debug) = overrides.debug {
            self.debug = Some(debug);
        }
        if let Some(api_key) = &overrides.api_key {
            self.gemini.api_key = Some(api_key.clone());
        }
        if let Some(model) = &overrides.model {
            self.gemini.model_name = Some(model.clone());
        }
        if let Some(level) = &overrides.thinking_level {
            self.gemini.thinking_level = Some(level.clone());
        }
    }

    fn into_config(self) -> Result<Config, ConfigError> {
        let gemini = self.gemini;

        let api_key = gemini
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let max_tokens = gemini
            .max_tokens
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let query_template = gemini
            .query_template
            .filter(|t| !t.is_empty())
            .map(|t| QueryTemplate::parse(&t))
            .transpose()
            .map_err(|e| ConfigError::invalid("gemini.query_template", e))?;

        let thinking_level = match gemini.thinking_level {
            Some(raw) => ThinkingLevel::parse_optional(&raw)
                .map_err(|e| ConfigError::invalid("gemini.thinking_level", e))?,
            None => None,
        };

        let timeout_seconds = gemini
            .timeout_seconds
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);

        let defaults = HttpConfig::default();
        let raw_http = self.http;
        let http = HttpConfig {
            host: raw_http.host.unwrap_or(defaults.host),
            port: raw_http.port.unwrap_or(defaults.port),
            endpoint_path: raw_http.endpoint_path.unwrap_or(defaults.endpoint_path),
            auth_token: raw_http.auth_token.filter(|t| !t.is_empty()),
            allowed_origins: raw_http.allowed_origins.unwrap_or_default(),
            heartbeat_seconds: raw_http
                .heartbeat_seconds
                .unwrap_or(defaults.heartbeat_seconds),
            shutdown_grace_seconds: raw_http
                .shutdown_grace_seconds
                .filter(|s| *s > 0)
                .unwrap_or(defaults.shutdown_grace_seconds),
        };
        http.validate()
            .map_err(|e| ConfigError::invalid("http.endpoint_path", e))?;

        Ok(Config {
            server: ServerConfig::default(),
            logging: LoggingConfig {
                file: self.log.filter(|l| !l.is_empty()).map(PathBuf::from),
                debug: self.debug.unwrap_or(false),
            },
            gemini: GeminiConfig {
                api_key,
                model_name: gemini
                    .model_name
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
                max_tokens,
                query_template,
                thinking_level,
                thinking_budget: gemini.thinking_budget,
                base_url: gemini
                    .base_url
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                timeout_seconds,
            },
            http,
        })
    }
}

impl Config {
    /// Load configuration from file, `.env`/process environment and CLI overrides.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_with(path, overrides, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] but with an injected environment lookup.
    ///
    /// With no explicit path, `config.toml` is used when present; an explicit
    /// path that cannot be read is an error.
    pub fn load_with<F>(
        path: Option<&Path>,
        overrides: &ConfigOverrides,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut raw = match path {
            Some(path) => RawConfig::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    RawConfig::from_file(default_path)?
                } else {
                    debug!("No {} found, using defaults and environment", DEFAULT_CONFIG_PATH);
                    RawConfig::default()
                }
            }
        };

        raw.apply_env(env)?;
        raw.apply_overrides(overrides);
        raw.into_config()
    }
}
