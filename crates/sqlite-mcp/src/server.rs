// sqlite-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: JSON-RPC dispatcher and axum HTTP transport.
// Purpose: Expose the SQLite tools via JSON-RPC 2.0 over HTTP.
// Dependencies: sqlite-mcp-config, sqlite-mcp-store, axum, tokio
// ============================================================================

//! ## Overview
//! [`Dispatcher::handle`] takes raw request bytes and returns an HTTP status
//! with a JSON-RPC envelope. It enforces the body limit before parsing,
//! resolves the method, routes tool calls through [`ToolRouter`], and
//! encodes every failure with its [`ErrorKind`]. [`McpServer`] hosts the
//! dispatcher behind axum and moves each dispatch onto the blocking pool.
//! Security posture: request bodies are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_LENGTH;
use axum::routing::get;
use axum::routing::post;
use http_body_util::LengthLimitError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use sqlite_mcp_config::AuditConfig;
use sqlite_mcp_config::SqliteMcpConfig;
use sqlite_mcp_store::ConnectionManager;
use sqlite_mcp_store::ErrorKind;
use sqlite_mcp_store::QueryExecutor;
use tokio::net::TcpListener;

use crate::audit::McpAuditEvent;
use crate::audit::McpAuditEventParams;
use crate::audit::McpAuditSink;
use crate::audit::McpFileAuditSink;
use crate::audit::McpNoopAuditSink;
use crate::audit::McpStderrAuditSink;
use crate::catalog::ToolDefinition;
use crate::catalog::ToolName;
use crate::telemetry::McpMethod;
use crate::telemetry::McpOutcome;
use crate::telemetry::SLOW_REQUEST_THRESHOLD;
use crate::telemetry::ServerStats;
use crate::tools::ToolError;
use crate::tools::ToolRouter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Server name reported by `initialize`.
pub const SERVER_NAME: &str = "sqlite-mcp-server";

/// Server version reported by `initialize`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON-RPC code for unparseable JSON.
const PARSE_ERROR_CODE: i64 = -32700;

/// JSON-RPC code for a malformed envelope.
const INVALID_REQUEST_CODE: i64 = -32600;

// ============================================================================
// SECTION: MCP Server
// ============================================================================

/// MCP server instance.
pub struct McpServer {
    /// Server configuration.
    config: SqliteMcpConfig,
    /// Request dispatcher.
    dispatcher: Dispatcher,
}

impl McpServer {
    /// Builds a new MCP server from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when validation or initialization fails.
    pub fn from_config(mut config: SqliteMcpConfig) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let manager = ConnectionManager::new(config.pool_config())
            .map_err(|err| McpServerError::Init(err.to_string()))?;
        let executor = QueryExecutor::new(manager, config.executor_limits());
        let router = ToolRouter::new(executor).map_err(|err| McpServerError::Init(err.to_string()))?;
        if let Some(default_path) = &config.database.default_path {
            let database = router.manager().resolve(default_path).map_err(|err| {
                McpServerError::Config(format!("database.default_path: {err}"))
            })?;
            tracing::info!(database = %database, "default database configured");
            router.set_default_database(database);
        }
        let audit = build_audit_sink(&config.audit)?;
        let dispatcher = Dispatcher::new(router, config.server.max_body_bytes, audit);
        Ok(Self {
            config,
            dispatcher,
        })
    }

    /// Returns the request dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the axum application serving this server's routes.
    ///
    /// Peer addresses reach the audit trail only when the app is served with
    /// `into_make_service_with_connect_info::<SocketAddr>()`.
    #[must_use]
    pub fn app(&self) -> Router {
        build_app(self.dispatcher.clone())
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when binding or serving fails.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), McpServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| McpServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| McpServerError::Transport(format!("http bind failed on {addr}: {err}")))?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves, then
    /// closes every pooled connection.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::Transport`] when the HTTP server fails.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), McpServerError> {
        if let Ok(local) = listener.local_addr() {
            tracing::info!(address = %local, "sqlite-mcp listening");
        }
        let app = self.app();
        let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| McpServerError::Transport(format!("http server failed: {err}")));
        let closed = self.dispatcher.router().manager().shutdown_all();
        tracing::info!(closed, "connection pool shut down");
        result
    }
}

/// Builds the audit sink selected by configuration.
fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn McpAuditSink>, McpServerError> {
    if !config.enabled {
        return Ok(Arc::new(McpNoopAuditSink));
    }
    match &config.path {
        Some(path) => McpFileAuditSink::new(std::path::Path::new(path))
            .map(|sink| Arc::new(sink) as Arc<dyn McpAuditSink>)
            .map_err(|err| McpServerError::Init(format!("audit log {path}: {err}"))),
        None => Ok(Arc::new(McpStderrAuditSink)),
    }
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Shared state for HTTP handlers.
#[derive(Clone)]
struct ServerState {
    /// Request dispatcher.
    dispatcher: Dispatcher,
}

/// Builds the axum router.
fn build_app(dispatcher: Dispatcher) -> Router {
    let state = Arc::new(ServerState {
        dispatcher,
    });
    Router::new()
        .route("/", post(handle_rpc).get(handle_status))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Handles `POST /` JSON-RPC requests.
///
/// The peer address is optional so the router also works when served
/// without connect info.
async fn handle_rpc(State(state): State<Arc<ServerState>>, request: Request) -> (StatusCode, Json<Value>) {
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr);
    let limit = state.dispatcher.max_body_bytes();
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if let Some(length) = declared
        && length > limit
    {
        let response = state.dispatcher.reject_oversized(length, peer);
        return (response.status, Json(response.body));
    }
    let bytes = match axum::body::to_bytes(request.into_body(), limit.saturating_add(1)).await {
        Ok(bytes) => bytes,
        Err(err) if is_length_limit(&err) => {
            let response = state.dispatcher.reject_oversized(limit.saturating_add(1), peer);
            return (response.status, Json(response.body));
        }
        Err(err) => {
            let response = state.dispatcher.reject_unreadable(&err.to_string(), peer);
            return (response.status, Json(response.body));
        }
    };
    let dispatcher = state.dispatcher.clone();
    match tokio::task::spawn_blocking(move || dispatcher.handle(&bytes, peer)).await {
        Ok(response) => (response.status, Json(response.body)),
        Err(err) => {
            tracing::error!(error = %err, "dispatch task failed");
            let response =
                failure_envelope(Value::Null, &ToolError::Internal("request handling failed".to_string()));
            (StatusCode::OK, Json(response.into_value()))
        }
    }
}

/// Handles `GET /health`.
async fn handle_health(State(state): State<Arc<ServerState>>) -> Json<Value> {
    let router = state.dispatcher.router();
    Json(json!({
        "status": "healthy",
        "timestamp_ms": now_ms(),
        "default_database": router.default_database().map(|path| path.to_string_lossy()),
        "stats": state.dispatcher.stats().snapshot(),
        "pool": router.manager().stats(),
    }))
}

/// Handles `GET /`.
async fn handle_status(State(state): State<Arc<ServerState>>) -> Json<Value> {
    let tools: Vec<&str> = ToolName::all().iter().map(|tool| tool.as_str()).collect();
    Json(json!({
        "name": SERVER_NAME,
        "version": SERVER_VERSION,
        "protocolVersion": PROTOCOL_VERSION,
        "transport": "http",
        "endpoints": { "rpc": "POST /", "health": "GET /health" },
        "default_database": state.dispatcher.router().default_database().map(|path| path.to_string_lossy()),
        "tools": tools,
    }))
}

/// Returns true when a body read stopped at the length limit.
fn is_length_limit(err: &axum::Error) -> bool {
    let root: &(dyn std::error::Error + 'static) = err;
    let mut current = Some(root);
    while let Some(error) = current {
        if error.is::<LengthLimitError>() {
            return true;
        }
        current = error.source();
    }
    false
}

/// Milliseconds since the Unix epoch.
fn now_ms() -> u64 {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// SECTION: JSON-RPC Types
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier; absent for notifications.
    #[serde(default)]
    id: Option<Value>,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Serializes the envelope, falling back to a fixed error body.
    fn into_value(self) -> Value {
        serde_json::to_value(&self).unwrap_or_else(|_| {
            json!({
                "jsonrpc": "2.0",
                "id": Value::Null,
                "error": {
                    "code": ErrorKind::ExecutionFailed.jsonrpc_code(),
                    "message": "serialization failure",
                    "data": { "kind": ErrorKind::ExecutionFailed.as_str() }
                }
            })
        })
    }
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Human-readable error message.
    message: String,
    /// Error classification.
    data: JsonRpcErrorData,
}

/// Structured error details.
#[derive(Debug, Serialize)]
struct JsonRpcErrorData {
    /// Error kind label.
    kind: &'static str,
    /// Sanitized SQL fragment for driver failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    sql: Option<String>,
}

/// `tools/call` parameters.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    arguments: Value,
}

/// `tools/list` result payload.
#[derive(Debug, Serialize)]
struct ToolListResult {
    /// Registered tool definitions.
    tools: Vec<ToolDefinition>,
}

/// `tools/call` result payload.
#[derive(Debug, Serialize)]
struct ToolCallResult {
    /// Text rendering of the payload.
    content: Vec<ToolContent>,
    /// Payload as structured JSON.
    #[serde(rename = "structuredContent")]
    structured_content: Value,
    /// Always false; failures are JSON-RPC errors.
    #[serde(rename = "isError")]
    is_error: bool,
}

/// Tool output content blocks.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolContent {
    /// JSON payload rendered as text.
    Text {
        /// Rendered payload.
        text: String,
    },
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Status and JSON body for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// JSON-RPC envelope.
    pub body: Value,
}

/// Outcome of one request before encoding.
struct Handled {
    /// HTTP status.
    status: StatusCode,
    /// Envelope to send.
    response: JsonRpcResponse,
    /// Method classification.
    method: McpMethod,
    /// Tool reached, if any.
    tool: Option<ToolName>,
    /// Error kind, if the request failed.
    error_kind: Option<ErrorKind>,
    /// Request id rendered as text.
    request_id: Option<String>,
}

/// Decodes JSON-RPC envelopes and routes them to the tool router.
#[derive(Clone)]
pub struct Dispatcher {
    /// Tool router.
    router: ToolRouter,
    /// Maximum accepted request body size.
    max_body_bytes: usize,
    /// Request counters.
    stats: Arc<ServerStats>,
    /// Audit sink.
    audit: Arc<dyn McpAuditSink>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(router: ToolRouter, max_body_bytes: usize, audit: Arc<dyn McpAuditSink>) -> Self {
        Self {
            router,
            max_body_bytes,
            stats: Arc::new(ServerStats::new()),
            audit,
        }
    }

    /// Returns the tool router.
    #[must_use]
    pub const fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Returns the request counters.
    #[must_use]
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Returns the body size limit.
    #[must_use]
    pub const fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Handles one raw request body.
    #[must_use]
    pub fn handle(&self, bytes: &[u8], peer: Option<SocketAddr>) -> DispatchResponse {
        let started = Instant::now();
        let handled = self.process(bytes);
        self.finish(handled, bytes.len(), peer, started)
    }

    /// Answers a request whose body exceeded the limit without reading it.
    #[must_use]
    pub fn reject_oversized(&self, request_bytes: usize, peer: Option<SocketAddr>) -> DispatchResponse {
        let started = Instant::now();
        let handled = self.oversized();
        self.finish(handled, request_bytes, peer, started)
    }

    /// Answers a request whose body could not be read.
    #[must_use]
    pub fn reject_unreadable(&self, detail: &str, peer: Option<SocketAddr>) -> DispatchResponse {
        let started = Instant::now();
        let handled = envelope_failure(
            StatusCode::BAD_REQUEST,
            INVALID_REQUEST_CODE,
            ErrorKind::InvalidParameters,
            format!("failed to read request body: {detail}"),
        );
        self.finish(handled, 0, peer, started)
    }

    /// Builds the oversized-body outcome.
    fn oversized(&self) -> Handled {
        envelope_failure(
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::RequestTooLarge.jsonrpc_code(),
            ErrorKind::RequestTooLarge,
            format!("request body exceeds {} bytes", self.max_body_bytes),
        )
    }

    /// Parses the envelope and routes it.
    fn process(&self, bytes: &[u8]) -> Handled {
        if bytes.len() > self.max_body_bytes {
            return self.oversized();
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return envelope_failure(
                StatusCode::BAD_REQUEST,
                INVALID_REQUEST_CODE,
                ErrorKind::InvalidParameters,
                "empty request body".to_string(),
            );
        }
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(err) => {
                return envelope_failure(
                    StatusCode::BAD_REQUEST,
                    PARSE_ERROR_CODE,
                    ErrorKind::InvalidParameters,
                    format!("parse error: {err}"),
                );
            }
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request = match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) if request.jsonrpc == "2.0" && !request.method.is_empty() => request,
            Ok(_) => {
                return with_id(
                    envelope_failure(
                        StatusCode::BAD_REQUEST,
                        INVALID_REQUEST_CODE,
                        ErrorKind::InvalidParameters,
                        "invalid request: jsonrpc must be \"2.0\" and method non-empty".to_string(),
                    ),
                    id,
                );
            }
            Err(err) => {
                return with_id(
                    envelope_failure(
                        StatusCode::BAD_REQUEST,
                        INVALID_REQUEST_CODE,
                        ErrorKind::InvalidParameters,
                        format!("invalid request: {err}"),
                    ),
                    id,
                );
            }
        };
        if !matches!(request.id, None | Some(Value::Null | Value::String(_) | Value::Number(_))) {
            return envelope_failure(
                StatusCode::BAD_REQUEST,
                INVALID_REQUEST_CODE,
                ErrorKind::InvalidParameters,
                "invalid request: id must be a string, number, or null".to_string(),
            );
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        let request_id = request.id.as_ref().filter(|id| !id.is_null()).map(render_id);
        let (method, tool, outcome) =
            match std::panic::catch_unwind(AssertUnwindSafe(|| self.route(request))) {
                Ok(routed) => routed,
                Err(_) => {
                    tracing::error!("handler panicked");
                    (
                        McpMethod::Other,
                        None,
                        Err(ToolError::Internal("unexpected failure while handling request".to_string())),
                    )
                }
            };
        let (response, error_kind) = match outcome {
            Ok(result) => (success_envelope(id, result), None),
            Err(err) => (failure_envelope(id, &err), Some(err.kind())),
        };
        Handled {
            status: StatusCode::OK,
            response,
            method,
            tool,
            error_kind,
            request_id,
        }
    }

    /// Resolves the method and runs it.
    fn route(&self, request: JsonRpcRequest) -> (McpMethod, Option<ToolName>, Result<Value, ToolError>) {
        let params = request.params.unwrap_or(Value::Null);
        match request.method.as_str() {
            "initialize" => (McpMethod::Initialize, None, Ok(initialize_result())),
            "notifications/initialized" => (McpMethod::Initialized, None, Ok(json!({}))),
            "ping" => (McpMethod::Ping, None, Ok(json!({}))),
            "tools/list" => {
                let listing = ToolListResult {
                    tools: self.router.list_tools(),
                };
                (
                    McpMethod::ToolsList,
                    None,
                    serde_json::to_value(listing).map_err(|_| ToolError::Serialization),
                )
            }
            "tools/call" => {
                let call = match serde_json::from_value::<ToolCallParams>(params) {
                    Ok(call) => call,
                    Err(err) => {
                        return (
                            McpMethod::ToolsCall,
                            None,
                            Err(ToolError::InvalidParams(format!("invalid tool call params: {err}"))),
                        );
                    }
                };
                let tool = ToolName::parse(&call.name);
                let outcome = self
                    .router
                    .handle_tool_call(&call.name, call.arguments)
                    .and_then(wrap_tool_result);
                (McpMethod::ToolsCall, tool, outcome)
            }
            other => match ToolName::parse(other) {
                Some(tool) => {
                    (McpMethod::DirectTool, Some(tool), self.router.handle_tool_call(other, params))
                }
                None => (
                    McpMethod::Other,
                    None,
                    Err(ToolError::UnknownMethod(other.to_string())),
                ),
            },
        }
    }

    /// Encodes the outcome, updates counters, and emits the audit event.
    fn finish(
        &self,
        handled: Handled,
        request_bytes: usize,
        peer: Option<SocketAddr>,
        started: Instant,
    ) -> DispatchResponse {
        let error_code = handled.response.error.as_ref().map(|error| error.code);
        let body = handled.response.into_value();
        let response_bytes = serde_json::to_vec(&body).map_or(0, |encoded| encoded.len());
        let elapsed = started.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let outcome = if error_code.is_some() { McpOutcome::Error } else { McpOutcome::Ok };
        self.stats.record(outcome, elapsed);
        self.audit.record(&McpAuditEvent::new(McpAuditEventParams {
            request_id: handled.request_id,
            peer_ip: peer.map(|addr| addr.ip().to_string()),
            method: handled.method,
            tool: handled.tool,
            outcome,
            error_code,
            error_kind: handled.error_kind.map(ErrorKind::as_str),
            request_bytes,
            response_bytes,
            elapsed_ms,
        }));
        let tool = handled.tool.map(ToolName::as_str);
        let error_kind = handled.error_kind.map(ErrorKind::as_str);
        if elapsed >= SLOW_REQUEST_THRESHOLD {
            tracing::warn!(
                method = handled.method.as_str(),
                tool,
                elapsed_ms,
                "slow request"
            );
        }
        tracing::debug!(
            method = handled.method.as_str(),
            tool,
            outcome = outcome.as_str(),
            error_kind,
            elapsed_ms,
            "request handled"
        );
        DispatchResponse {
            status: handled.status,
            body,
        }
    }
}

// ============================================================================
// SECTION: Envelope Helpers
// ============================================================================

/// Result payload for `initialize`.
fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
    })
}

/// Wraps a tool payload in the `tools/call` content shape.
fn wrap_tool_result(payload: Value) -> Result<Value, ToolError> {
    let text = serde_json::to_string_pretty(&payload).map_err(|_| ToolError::Serialization)?;
    serde_json::to_value(ToolCallResult {
        content: vec![ToolContent::Text {
            text,
        }],
        structured_content: payload,
        is_error: false,
    })
    .map_err(|_| ToolError::Serialization)
}

/// Builds a success envelope.
fn success_envelope(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

/// Builds an error envelope for a routed failure.
fn failure_envelope(id: Value, error: &ToolError) -> JsonRpcResponse {
    let kind = error.kind();
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError {
            code: kind.jsonrpc_code(),
            message: error.to_string(),
            data: JsonRpcErrorData {
                kind: kind.as_str(),
                sql: error.sql_fragment().map(str::to_string),
            },
        }),
    }
}

/// Builds an outcome for a request rejected before routing.
fn envelope_failure(status: StatusCode, code: i64, kind: ErrorKind, message: String) -> Handled {
    Handled {
        status,
        response: JsonRpcResponse {
            jsonrpc: "2.0",
            id: Value::Null,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: JsonRpcErrorData {
                    kind: kind.as_str(),
                    sql: None,
                },
            }),
        },
        method: McpMethod::Invalid,
        tool: None,
        error_kind: Some(kind),
        request_id: None,
    }
}

/// Echoes a usable request id on an envelope failure.
fn with_id(mut handled: Handled, id: Value) -> Handled {
    if matches!(id, Value::String(_) | Value::Number(_)) {
        handled.request_id = Some(render_id(&id));
        handled.response.id = id;
    }
    handled
}

/// Renders a request id for audit records.
fn render_id(id: &Value) -> String {
    match id {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// MCP server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
