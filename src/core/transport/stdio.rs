//! STDIO transport implementation.
//!
//! Standard input/output transport for MCP - the default and recommended mode.
//! Messages are newline-delimited JSON-RPC; stdout carries nothing else.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use super::TransportResult;
use crate::core::session::JsonRpcResponse;
use crate::core::{McpServer, SessionEngine};

/// STDIO transport handler.
pub struct StdioTransport;

impl StdioTransport {
    /// Run the STDIO transport until stdin reaches end of file.
    pub async fn run(server: McpServer) -> TransportResult<()> {
        info!("Ready - communicating via stdin/stdout");

        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        Self::serve(server.engine(), stdin, stdout).await?;

        info!("STDIO transport finished");
        Ok(())
    }

    /// Drive one session over an arbitrary line-oriented stream pair.
    pub async fn serve<R, W>(engine: &SessionEngine, mut reader: R, mut writer: W) -> TransportResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let session = engine.open_session().await;
        session.start();
        let mut buf = Vec::new();

        let result = loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    debug!("stdin closed");
                    break Ok(());
                }
                Ok(_) => {}
                Err(e) => break Err(e.into()),
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    debug!("Discarding line that is not valid UTF-8: {}", e);
                    let response =
                        JsonRpcResponse::parse_error("Parse error: message is not valid UTF-8");
                    if let Err(e) = write_line(&mut writer, &response.to_wire()).await {
                        break Err(e.into());
                    }
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            match session.handle(line).await {
                Ok(Some(response)) => {
                    if let Err(e) = write_line(&mut writer, &response).await {
                        break Err(e.into());
                    }
                }
                Ok(None) => {}
                Err(closed) => {
                    debug!("{}", closed);
                    break Ok(());
                }
            }
        };

        engine.close_session(session.id()).await;
        result
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, message: &str) -> std::io::Result<()> {
    writer.write_all(message.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
