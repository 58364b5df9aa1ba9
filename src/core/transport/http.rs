//! HTTP transport implementation.
//!
//! Streamable HTTP: JSON-RPC messages are POSTed to the protocol endpoint,
//! `GET` on the same path opens a server-sent-event stream for the session
//! and `DELETE` ends the session. Sessions are identified by the
//! `Mcp-Session-Id` header, handed out in the response to `initialize`.
//!
//! ## Endpoints
//!
//! ```text
//! GET    /health     liveness probe, outside the filter chain
//! POST   {endpoint}  one JSON-RPC message
//! GET    {endpoint}  SSE stream (keep-alive comments when a heartbeat is set)
//! DELETE {endpoint}  close the session
//! ```
//!
//! ## Shutdown
//!
//! On SIGINT/SIGTERM the listener stops accepting connections, then the
//! protocol binding and the listener are each closed under their own
//! deadline.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    middleware,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use bytes::Bytes;
use futures::StreamExt;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::middleware::{FilterChain, apply_filters};
use super::{HEALTH_PATH, HttpConfig, TransportError, TransportResult};
use crate::core::McpServer;
use crate::core::session::{JsonRpcResponse, Session, SessionEngine, peek_method};

/// Header carrying the session identifier.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// HTTP transport handler.
pub struct HttpTransport {
    config: HttpConfig,
}

// ============================================================================
// Protocol binding
// ============================================================================

/// Connects the session engine to HTTP requests and tracks in-flight work.
pub struct HttpBinding {
    engine: Arc<SessionEngine>,
    heartbeat: Option<Duration>,
    /// Cancelled when shutdown begins; new protocol requests get 503.
    closing: CancellationToken,
    /// Cancelled when the drain deadline passes; in-flight requests give up.
    abort: CancellationToken,
    in_flight: TaskTracker,
}

impl HttpBinding {
    pub fn new(engine: Arc<SessionEngine>, heartbeat: Option<Duration>) -> Self {
        Self {
            engine,
            heartbeat,
            closing: CancellationToken::new(),
            abort: CancellationToken::new(),
            in_flight: TaskTracker::new(),
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Refuse new requests, close every session and wait for in-flight
    /// requests. Requests still running after `grace` are aborted.
    pub async fn shutdown(&self, grace: Duration) -> TransportResult<()> {
        self.closing.cancel();
        let closed = self.engine.close_all().await;
        debug!("Closed {} session(s)", closed);

        self.in_flight.close();
        match tokio::time::timeout(grace, self.in_flight.wait()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(
                    "{} request(s) still running after {:?}, aborting",
                    self.in_flight.len(),
                    grace
                );
                self.abort.cancel();
                Err(TransportError::shutdown_timeout("protocol binding", grace))
            }
        }
    }

    /// Run one message through `session`. A session opened by this very
    /// request is kept only when the engine answers it successfully.
    async fn dispatch(&self, session: &Session, raw: &str, opened: bool) -> Response {
        let _in_flight = self.in_flight.token();

        let outcome = tokio::select! {
            outcome = session.handle_message(raw) => outcome,
            _ = self.abort.cancelled() => {
                let response = JsonRpcResponse::internal_error(
                    request_id(raw),
                    "Request aborted: server is shutting down",
                );
                return json_response(session.id(), response.to_wire());
            }
        };

        match outcome {
            Ok(Some(response)) if opened && response.error.is_some() => {
                self.engine.close_session(session.id()).await;
                debug!(session = %session.id(), "Discarded session after failed initialize");
                (StatusCode::OK, json_body(response.to_wire())).into_response()
            }
            Ok(Some(response)) => json_response(session.id(), response.to_wire()),
            Ok(None) if opened => {
                self.engine.close_session(session.id()).await;
                StatusCode::ACCEPTED.into_response()
            }
            Ok(None) => with_session_id(StatusCode::ACCEPTED.into_response(), session.id()),
            Err(closed) if self.is_closing() => {
                debug!("{}", closed);
                service_unavailable()
            }
            Err(closed) => (StatusCode::NOT_FOUND, closed.to_string()).into_response(),
        }
    }
}

#[derive(Clone)]
struct AppState {
    binding: Arc<HttpBinding>,
}

/// Build the router: `/health` plus the filtered protocol endpoint.
pub fn router(config: &HttpConfig, binding: Arc<HttpBinding>) -> Router {
    let chain = Arc::new(FilterChain::from_config(config));

    let endpoint = Router::new()
        .route(
            &config.endpoint_path,
            get(handle_get).post(handle_post).delete(handle_delete),
        )
        .layer(middleware::from_fn_with_state(chain, apply_filters))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { binding });

    Router::new()
        .route(HEALTH_PATH, get(health_check))
        .merge(endpoint)
}

impl HttpTransport {
    /// Create a new HTTP transport with the given config.
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    /// Run the HTTP transport until SIGINT/SIGTERM.
    pub async fn run(self, server: McpServer) -> TransportResult<()> {
        self.config.validate().map_err(TransportError::init)?;

        let addr = self.config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        let auth_status = if self.config.auth_token.is_some() {
            "enabled"
        } else {
            "disabled"
        };
        info!(
            "Ready - listening on {} (streamable HTTP, auth {})",
            addr, auth_status
        );
        info!("  → MCP:    {}", self.config.endpoint_path);
        info!("  → Health: GET {}", HEALTH_PATH);

        self.serve_until(listener, server, shutdown_signal()).await
    }

    /// Serve on `listener` until `signal` resolves, then shut down.
    pub async fn serve_until<F>(
        self,
        listener: TcpListener,
        server: McpServer,
        signal: F,
    ) -> TransportResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let binding = Arc::new(HttpBinding::new(
            server.engine().clone(),
            self.config.heartbeat_interval(),
        ));
        let app = router(&self.config, binding.clone());

        let stop_accepting = CancellationToken::new();
        let accept_stopped = stop_accepting.clone().cancelled_owned();
        let mut server_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(accept_stopped)
                .await
        });

        tokio::select! {
            _ = signal => info!("Shutdown signal received"),
            result = &mut server_task => {
                error!("HTTP listener stopped unexpectedly");
                return flatten_server_result(result);
            }
        }

        stop_accepting.cancel();

        let grace = self.config.shutdown_grace();
        if let Err(e) = binding.shutdown(grace).await {
            warn!("Protocol binding shutdown: {}", e);
        }

        match tokio::time::timeout(grace, &mut server_task).await {
            Ok(result) => {
                flatten_server_result(result)?;
                info!("HTTP server stopped");
                Ok(())
            }
            Err(_) => {
                server_task.abort();
                error!("HTTP listener did not stop within {:?}", grace);
                Err(TransportError::shutdown_timeout("HTTP listener", grace))
            }
        }
    }
}

fn flatten_server_result(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> TransportResult<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TransportError::http(e.to_string())),
        Err(e) => Err(TransportError::http(format!("server task failed: {}", e))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "ok")
}

async fn handle_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let binding = &state.binding;
    if binding.is_closing() {
        return service_unavailable();
    }

    let Ok(raw) = std::str::from_utf8(&body) else {
        let response = JsonRpcResponse::parse_error("Request body is not valid UTF-8");
        return (StatusCode::BAD_REQUEST, json_body(response.to_wire())).into_response();
    };

    let (session, opened) = match session_id(&headers) {
        Some(id) => match binding.engine.session(id).await {
            Some(session) => (session, false),
            None => return session_not_found(),
        },
        None if peek_method(raw).as_deref() == Some("initialize") => {
            let session = binding.engine.open_session().await;
            session.start();
            (session, true)
        }
        None => {
            return (
                StatusCode::BAD_REQUEST,
                "Missing Mcp-Session-Id header; send initialize first",
            )
                .into_response();
        }
    };

    let response = binding.dispatch(&session, raw, opened).await;
    if opened && response.headers().contains_key(SESSION_ID_HEADER) {
        info!(session = %session.id(), "HTTP session created");
    }
    response
}

async fn handle_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let binding = &state.binding;
    if binding.is_closing() {
        return service_unavailable();
    }
    let Some(id) = session_id(&headers) else {
        return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response();
    };
    let Some(session) = binding.engine.session(id).await else {
        return session_not_found();
    };

    debug!(session = %session.id(), "Opening event stream");
    let session_closed = session.close_token();
    let closing = binding.closing.clone();
    let stream = futures::stream::pending::<Result<Event, Infallible>>().take_until(async move {
        tokio::select! {
            _ = session_closed.cancelled() => {},
            _ = closing.cancelled() => {},
        }
    });

    let response = match binding.heartbeat {
        Some(interval) => Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(interval))
            .into_response(),
        None => Sse::new(stream).into_response(),
    };
    with_session_id(response, session.id())
}

async fn handle_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(id) = session_id(&headers) else {
        return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response();
    };

    if state.binding.engine.close_session(id).await {
        info!(session = %id, "HTTP session closed by client");
        StatusCode::NO_CONTENT.into_response()
    } else {
        session_not_found()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn request_id(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.get("id").cloned())
        .unwrap_or(Value::Null)
}

fn json_body(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], body)
}

fn json_response(session_id: &str, body: String) -> Response {
    with_session_id(
        (StatusCode::OK, json_body(body)).into_response(),
        session_id,
    )
}

fn with_session_id(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

fn session_not_found() -> Response {
    (StatusCode::NOT_FOUND, "Session not found").into_response()
}

fn service_unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response()
}
