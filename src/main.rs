//! MCP Server Entry Point
//!
//! Parses the command line, loads configuration, initializes logging and
//! runs the server over the selected transport.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

use grounded_search_mcp_server::core::config::LoggingConfig;
use grounded_search_mcp_server::core::{
    Config, ConfigOverrides, McpServer, TransportConfig, TransportService,
};

#[derive(Debug, Parser)]
#[command(name = "grounded-search-mcp", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve MCP over stdin/stdout.
    #[cfg(feature = "stdio")]
    #[command(alias = "s")]
    Server(ServerArgs),

    /// Serve MCP over streamable HTTP.
    #[cfg(feature = "http")]
    #[command(name = "httpserver")]
    HttpServer(HttpServerArgs),
}

/// Flags override environment variables, which override the file.
#[derive(Debug, Args)]
struct ServerArgs {
    /// Configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Append logs to this file [env: LOG_PATH].
    #[arg(short, long, value_name = "FILE")]
    log: Option<String>,

    /// Enable debug logging [env: DEBUG].
    #[arg(short, long)]
    debug: bool,

    /// Gemini API key [env: GEMINI_API_KEY].
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Gemini model name [env: GEMINI_MODEL_NAME].
    #[arg(short, long)]
    model: Option<String>,

    /// Default thinking level: MINIMAL, LOW, MEDIUM or HIGH [env: GEMINI_THINKING_LEVEL].
    #[arg(long)]
    thinking_level: Option<String>,
}

impl ServerArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log: self.log.clone(),
            debug: self.debug.then_some(true),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            thinking_level: self.thinking_level.clone(),
        }
    }
}

#[derive(Debug, Args)]
struct HttpServerArgs {
    /// Configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "stdio")]
        Command::Server(args) => {
            let config = load_config(args.config.as_deref(), &args.overrides())?;
            run(config, TransportConfig::Stdio).await
        }
        #[cfg(feature = "http")]
        Command::HttpServer(args) => {
            let config = load_config(args.config.as_deref(), &ConfigOverrides::default())?;
            let http = config.http.clone();
            run(config, TransportConfig::Http(http)).await
        }
    }
}

fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
    let config = Config::load(path, overrides).context("Failed to load configuration")?;
    init_logging(&config.logging)?;
    Ok(config)
}

async fn run(config: Config, transport: TransportConfig) -> Result<()> {
    info!("Starting {} v{}", config.server.name, config.server.version);
    debug!(?config, "Configuration loaded");

    let server = McpServer::new(config).context("Failed to initialize server")?;

    info!("Server initialized");

    TransportService::new(transport)
        .run(server)
        .await
        .context("Transport failed")?;

    info!("Server shutting down");

    Ok(())
}

/// Initialize the logging subsystem.
///
/// Logs go to stderr, or are appended to the configured log file. Stdout is
/// never used: it carries the stdio protocol stream.
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(logging.level().into());

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}
