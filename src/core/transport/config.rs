//! Transport configuration types.

use std::time::Duration;

/// Path of the unauthenticated liveness endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Transport selected at startup.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    /// Line-delimited JSON-RPC over standard input/output.
    #[cfg(feature = "stdio")]
    Stdio,

    /// Streamable HTTP.
    #[cfg(feature = "http")]
    Http(HttpConfig),
}

/// HTTP transport configuration.
///
/// Always compiled so configuration files stay portable between builds.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Host address to bind to.
    pub host: String,

    /// Port number to listen on.
    pub port: u16,

    /// Path of the protocol endpoint.
    pub endpoint_path: String,

    /// Bearer token required on the protocol endpoint, if any.
    pub auth_token: Option<String>,

    /// Origins allowed to call the protocol endpoint; empty disables the check.
    pub allowed_origins: Vec<String>,

    /// Keep-alive interval for open event streams; `<= 0` disables it.
    pub heartbeat_seconds: i64,

    /// Deadline for each shutdown stage.
    pub shutdown_grace_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            endpoint_path: "/mcp".to_string(),
            auth_token: None,
            allowed_origins: Vec::new(),
            heartbeat_seconds: 0,
            shutdown_grace_seconds: 10,
        }
    }
}

/// Custom Debug implementation to redact the bearer token from logs.
impl std::fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("endpoint_path", &self.endpoint_path)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("allowed_origins", &self.allowed_origins)
            .field("heartbeat_seconds", &self.heartbeat_seconds)
            .field("shutdown_grace_seconds", &self.shutdown_grace_seconds)
            .finish()
    }
}

impl HttpConfig {
    /// Get the bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Heartbeat interval, if enabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        u64::try_from(self.heartbeat_seconds)
            .ok()
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    /// Deadline applied to each shutdown stage independently.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Check the endpoint path can be routed next to the health endpoint.
    pub fn validate(&self) -> Result<(), String> {
        if !self.endpoint_path.starts_with('/') {
            return Err(format!(
                "endpoint path '{}' must start with '/'",
                self.endpoint_path
            ));
        }
        if self.endpoint_path == HEALTH_PATH {
            return Err(format!("endpoint path must not be {}", HEALTH_PATH));
        }
        Ok(())
    }
}

impl TransportConfig {
    /// Get a description of this transport for logging.
    pub fn description(&self) -> String {
        match self {
            #[cfg(feature = "stdio")]
            Self::Stdio => "STDIO (standard MCP mode)".to_string(),
            #[cfg(feature = "http")]
            Self::Http(cfg) => format!("HTTP on {}{}", cfg.address(), cfg.endpoint_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_disabled_when_not_positive() {
        let mut config = HttpConfig::default();
        assert_eq!(config.heartbeat_interval(), None);
        config.heartbeat_seconds = -1;
        assert_eq!(config.heartbeat_interval(), None);
        config.heartbeat_seconds = 30;
        assert_eq!(config.heartbeat_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_validate_endpoint_path() {
        let mut config = HttpConfig::default();
        assert!(config.validate().is_ok());
        config.endpoint_path = "mcp".to_string();
        assert!(config.validate().is_err());
        config.endpoint_path = "/health".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = HttpConfig {
            auth_token: Some("hunter2".to_string()),
            ..Default::default()
        };
        let debug_str = format!("{:?}", config);
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }
}
