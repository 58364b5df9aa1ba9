//! Protocol session engine.
//!
//! Turns raw JSON-RPC messages into raw JSON-RPC responses. The engine knows
//! nothing about pipes, sockets or HTTP bodies: transports open a [`Session`],
//! feed it one message at a time through [`Session::handle`] and close it when
//! their stream ends.
//!
//! ## Session lifecycle
//!
//! ```text
//! Idle -> AwaitingRequest -> Dispatching -> AwaitingRequest ... -> Closed
//! ```
//!
//! Requests of one session are dispatched in arrival order. Different
//! sessions run concurrently; the tool registry they share is read-only.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use rmcp::model::{CallToolResult, JsonObject};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domains::tools::{InvocationResult, ToolRegistry};

/// Protocol versions this server can speak, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// ============================================================================
// JSON-RPC messages
// ============================================================================

/// JSON-RPC request structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC response structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Parse error (the message was not JSON).
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::error(Value::Null, PARSE_ERROR, msg)
    }

    /// Method not found error.
    pub fn method_not_found(id: Value) -> Self {
        Self::error(id, METHOD_NOT_FOUND, "Method not found")
    }

    /// Invalid request error.
    pub fn invalid_request(id: Value, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_REQUEST, msg)
    }

    /// Invalid params error.
    pub fn invalid_params(id: Value, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, msg)
    }

    /// Internal error.
    pub fn internal_error(id: Value, msg: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR, msg)
    }

    /// Serialize for the wire.
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            error!("Failed to serialize JSON-RPC response: {}", e);
            format!(
                r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"Failed to serialize response"}}}}"#,
                INTERNAL_ERROR
            )
        })
    }
}

#[derive(Deserialize)]
struct MethodOnly {
    method: String,
}

/// Read the `method` of a raw message without dispatching it.
pub fn peek_method(raw: &str) -> Option<String> {
    serde_json::from_str::<MethodOnly>(raw)
        .ok()
        .map(|m| m.method)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    #[serde(default)]
    protocol_version: Option<String>,
}

#[derive(Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<JsonObject>,
}

// ============================================================================
// Error observer
// ============================================================================

/// A dispatch failure reported to the [`ErrorObserver`].
#[derive(Debug, Clone, Copy)]
pub struct DispatchError<'a> {
    pub session_id: &'a str,
    pub id: &'a Value,
    pub method: &'a str,
    pub error: &'a JsonRpcError,
}

/// Side-effect-only hook invoked for every error response.
///
/// Observers cannot change the response. A panicking observer is contained.
pub trait ErrorObserver: Send + Sync {
    fn on_error(&self, event: &DispatchError<'_>);
}

/// Default observer: logs `{id, method, error}` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ErrorObserver for LoggingObserver {
    fn on_error(&self, event: &DispatchError<'_>) {
        error!(
            session = event.session_id,
            id = %event.id,
            method = event.method,
            code = event.error.code,
            error = %event.error.message,
            "MCP error occurred"
        );
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingRequest,
    Dispatching,
    Closed,
}

/// Returned when a message reaches a session that has been closed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("session {0} is closed")]
pub struct SessionClosed(pub String);

/// Name, version and instructions reported in `initialize`.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub instructions: String,
}

/// State shared by every session of one engine.
struct Dispatcher {
    registry: Arc<ToolRegistry>,
    identity: ServerIdentity,
    observer: Arc<dyn ErrorObserver>,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    protocol_version: Option<String>,
}

/// One logical client conversation.
pub struct Session {
    id: String,
    dispatcher: Arc<Dispatcher>,
    inner: Mutex<SessionInner>,
    /// Serializes dispatch so requests are answered in arrival order.
    turn: tokio::sync::Mutex<()>,
    closed: CancellationToken,
}

impl Session {
    fn new(id: String, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            id,
            dispatcher,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                protocol_version: None,
            }),
            turn: tokio::sync::Mutex::new(()),
            closed: CancellationToken::new(),
        }
    }

    /// Opaque session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lock_inner().state
    }

    /// Protocol version negotiated by `initialize`, if any.
    pub fn protocol_version(&self) -> Option<String> {
        self.lock_inner().protocol_version.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the session closes.
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Mark the transport as ready to receive requests.
    pub fn start(&self) {
        let mut inner = self.lock_inner();
        if inner.state == SessionState::Idle {
            inner.state = SessionState::AwaitingRequest;
        }
    }

    /// Close the session. Further messages are rejected.
    pub fn close(&self) {
        self.lock_inner().state = SessionState::Closed;
        self.closed.cancel();
        debug!(session = %self.id, "Session closed");
    }

    /// Handle one raw message. Returns `None` for notifications.
    pub async fn handle(&self, raw: &str) -> Result<Option<String>, SessionClosed> {
        Ok(self.handle_message(raw).await?.map(|r| r.to_wire()))
    }

    /// Like [`Session::handle`], but hands back the structured response.
    pub async fn handle_message(
        &self,
        raw: &str,
    ) -> Result<Option<JsonRpcResponse>, SessionClosed> {
        let _turn = self.turn.lock().await;
        if self.is_closed() {
            return Err(SessionClosed(self.id.clone()));
        }

        self.set_state(SessionState::Dispatching);
        let response = self.dispatch(raw).await;
        if !self.is_closed() {
            self.set_state(SessionState::AwaitingRequest);
        }

        Ok(response)
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        self.lock_inner().state = state;
    }

    async fn dispatch(&self, raw: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                let response = JsonRpcResponse::parse_error(format!("Parse error: {}", e));
                self.report(&response, "");
                return Some(response);
            }
        };

        if value.is_array() {
            let response =
                JsonRpcResponse::invalid_request(Value::Null, "Batch requests are not supported");
            self.report(&response, "");
            return Some(response);
        }

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                let response =
                    JsonRpcResponse::invalid_request(id, format!("Invalid Request: {}", e));
                self.report(&response, "");
                return Some(response);
            }
        };

        if request.jsonrpc != "2.0" {
            let response = JsonRpcResponse::invalid_request(id, "Invalid Request: jsonrpc must be \"2.0\"");
            self.report(&response, &request.method);
            return Some(response);
        }

        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return None;
        };

        let response = self.process_request(id, request.method.as_str(), request.params).await;
        if response.error.is_some() {
            self.report(&response, &request.method);
        }
        Some(response)
    }

    #[instrument(skip(self, params), fields(session = %self.id))]
    async fn process_request(
        &self,
        id: Value,
        method: &str,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        debug!("Processing {} request", method);
        match method {
            "initialize" => self.handle_initialize(id, params),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, params).await,
            _ => {
                warn!("Unknown method: {}", method);
                JsonRpcResponse::method_not_found(id)
            }
        }
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => {
                info!(session = %self.id, "Client sent initialized notification");
            }
            other => debug!(session = %self.id, "Received notification: {}", other),
        }
    }

    fn handle_initialize(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let requested = params
            .and_then(|p| serde_json::from_value::<InitializeParams>(p).ok())
            .and_then(|p| p.protocol_version);

        let negotiated = requested
            .as_deref()
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
            .to_string();

        info!(session = %self.id, protocol_version = %negotiated, "Processing initialize request");
        self.lock_inner().protocol_version = Some(negotiated.clone());

        let identity = &self.dispatcher.identity;
        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "protocolVersion": negotiated,
                "capabilities": {
                    "tools": { "listChanged": false }
                },
                "serverInfo": {
                    "name": identity.name,
                    "version": identity.version
                },
                "instructions": identity.instructions
            }),
        )
    }

    fn handle_tools_list(&self, id: Value) -> JsonRpcResponse {
        let tools = self.dispatcher.registry.list_tools();
        match serde_json::to_value(tools) {
            Ok(tools) => JsonRpcResponse::success(id, serde_json::json!({ "tools": tools })),
            Err(e) => JsonRpcResponse::internal_error(id, format!("Failed to list tools: {}", e)),
        }
    }

    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::invalid_params(id, "Missing params");
        };

        let params: CallToolParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::invalid_params(id, format!("Invalid params: {}", e)),
        };

        let handler = match self.dispatcher.registry.resolve(&params.name) {
            Ok(h) => h,
            Err(e) => return JsonRpcResponse::invalid_params(id, e.to_string()),
        };

        info!(session = %self.id, tool = %params.name, "Calling tool");
        let arguments = params.arguments.unwrap_or_default();
        let outcome = AssertUnwindSafe(handler.call(arguments))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!(tool = %params.name, "Tool handler panicked");
                InvocationResult::failure(format!("Tool '{}' failed unexpectedly", params.name))
            });

        match serde_json::to_value(CallToolResult::from(outcome)) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                JsonRpcResponse::internal_error(id, format!("Failed to encode tool result: {}", e))
            }
        }
    }

    fn report(&self, response: &JsonRpcResponse, method: &str) {
        let Some(error) = &response.error else {
            return;
        };
        let event = DispatchError {
            session_id: &self.id,
            id: &response.id,
            method,
            error,
        };
        let observer = &self.dispatcher.observer;
        if std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_error(&event))).is_err() {
            warn!("Error observer panicked; ignoring");
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Owns the sessions of one server process.
pub struct SessionEngine {
    dispatcher: Arc<Dispatcher>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionEngine {
    /// Create an engine that logs dispatch errors.
    pub fn new(registry: Arc<ToolRegistry>, identity: ServerIdentity) -> Self {
        Self::with_observer(registry, identity, Arc::new(LoggingObserver))
    }

    /// Create an engine with a custom error observer.
    pub fn with_observer(
        registry: Arc<ToolRegistry>,
        identity: ServerIdentity,
        observer: Arc<dyn ErrorObserver>,
    ) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher {
                registry,
                identity,
                observer,
            }),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a new session with a fresh identifier.
    pub async fn open_session(&self) -> Arc<Session> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), self.dispatcher.clone()));
        self.sessions.write().await.insert(id, session.clone());
        debug!(session = %session.id(), "Session opened");
        session
    }

    /// Look up an open session.
    pub async fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Close and forget a session. Returns `false` if it was unknown.
    pub async fn close_session(&self, id: &str) -> bool {
        match self.sessions.write().await.remove(id) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Close every session. Returns how many were open.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (_, session) in &drained {
            session.close();
        }
        drained.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
