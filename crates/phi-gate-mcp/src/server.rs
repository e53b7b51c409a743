// crates/phi-gate-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: JSON-RPC server over HTTP and stdio transports.
// Purpose: Expose the PHI Gate tool catalog and mediated tool calls.
// Dependencies: phi-gate-core, phi-gate-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! The server speaks JSON-RPC 2.0 and always routes invocations through
//! [`crate::tools::ToolRouter`]. `initialize` and `tools.list` are served
//! without credentials; `tools.call` is the only method that reaches a tool.
//! Request bodies are untrusted: size is checked before parsing, and error
//! messages for internal failures are generic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::USER_AGENT;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use phi_gate_core::AuditStore;
use phi_gate_core::InMemoryAuditStore;
use phi_gate_core::InMemoryRecordSource;
use phi_gate_core::RecordSource;
use phi_gate_store_sqlite::SqliteAuditStore;
use phi_gate_store_sqlite::SqliteRecordSource;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use crate::audit::AuditWriter;
use crate::audit::JsonlAuditStore;
use crate::auth::RequestContext;
use crate::config::AuditStoreKind;
use crate::config::PhiGateConfig;
use crate::config::RecordSourceKind;
use crate::config::ServerTransport;
use crate::geo::CachedGeoLocator;
use crate::token::TokenValidator;
use crate::tools::ToolError;
use crate::tools::ToolRouter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Protocol version reported by `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";
/// Server name reported by `initialize`.
const SERVER_NAME: &str = "phi-gate";
/// Maximum accepted stdio header line.
const MAX_HEADER_LINE_BYTES: usize = 1024;

// ============================================================================
// SECTION: MCP Server
// ============================================================================

/// MCP server instance.
pub struct McpServer {
    /// Server configuration.
    config: PhiGateConfig,
    /// Tool router for request dispatch.
    router: ToolRouter,
}

impl McpServer {
    /// Builds a server and its collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when configuration is invalid or a
    /// collaborator cannot be initialized.
    pub fn from_config(config: PhiGateConfig) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let validator = TokenValidator::from_config(&config.auth)
            .map_err(|err| McpServerError::Init(err.to_string()))?;
        let store = build_audit_store(&config)?;
        let source = build_record_source(&config)?;
        let geo = CachedGeoLocator::from_config(&config.geolocation)
            .map_err(|err| McpServerError::Init(err.to_string()))?;
        let audit = AuditWriter::new(
            store,
            geo,
            config.risk.policy(),
            Duration::from_millis(config.geolocation.timeout_ms),
        );
        let router = ToolRouter::new(
            Arc::new(validator),
            source,
            audit,
            config.records.fetch_timeout(),
        );
        Ok(Self { config, router })
    }

    /// Builds a server around an existing router.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::Config`] when configuration is invalid.
    pub fn with_router(config: PhiGateConfig, router: ToolRouter) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        Ok(Self { config, router })
    }

    /// Returns the tool router.
    #[must_use]
    pub const fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Builds the HTTP application (`POST /mcp`, `GET /health`).
    #[must_use]
    pub fn http_app(&self) -> Router {
        let state = Arc::new(ServerState {
            router: self.router.clone(),
            max_body_bytes: self.config.server.max_body_bytes,
            trust_forwarded_headers: self.config.server.trust_forwarded_headers,
        });
        Router::new()
            .route("/mcp", post(handle_http))
            .route("/health", get(handle_health))
            .layer(DefaultBodyLimit::max(self.config.server.max_body_bytes))
            .with_state(state)
    }

    /// Serves requests using the configured transport.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the transport fails.
    pub async fn serve(self) -> Result<(), McpServerError> {
        match self.config.server.transport {
            ServerTransport::Http => self.serve_http().await,
            ServerTransport::Stdio => self.serve_stdio().await,
        }
    }

    /// Serves JSON-RPC over HTTP.
    async fn serve_http(self) -> Result<(), McpServerError> {
        let addr = self
            .config
            .server
            .bind_addr()
            .map_err(|err| McpServerError::Config(err.to_string()))?;
        let app = self.http_app();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| McpServerError::Transport(format!("http bind failed: {err}")))?;
        tracing::info!(target: "phi_gate::server", %addr, "serving JSON-RPC over http");
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|err| McpServerError::Transport(format!("http server failed: {err}")))
    }

    /// Serves JSON-RPC over stdin/stdout.
    async fn serve_stdio(self) -> Result<(), McpServerError> {
        let env_name = &self.config.server.stdio_token_env;
        let token = std::env::var(env_name).ok().filter(|token| !token.trim().is_empty());
        if token.is_none() {
            tracing::warn!(
                target: "phi_gate::server",
                env = env_name.as_str(),
                "no stdio bearer token set; tool calls will be rejected"
            );
        }
        tracing::info!(target: "phi_gate::server", "serving JSON-RPC over stdio");
        let context = RequestContext::stdio(token.as_deref());
        let reader = tokio::io::BufReader::new(tokio::io::stdin());
        run_stdio(
            &self.router,
            &context,
            self.config.server.max_body_bytes,
            reader,
            tokio::io::stdout(),
        )
        .await
    }
}

/// Builds the configured audit store.
fn build_audit_store(config: &PhiGateConfig) -> Result<Arc<dyn AuditStore>, McpServerError> {
    let store: Arc<dyn AuditStore> = match config.audit.store {
        AuditStoreKind::Memory => {
            tracing::warn!(
                target: "phi_gate::server",
                "audit store is in-memory; records are lost on exit"
            );
            Arc::new(InMemoryAuditStore::new())
        }
        AuditStoreKind::Sqlite => Arc::new(
            SqliteAuditStore::open(&config.audit.sqlite())
                .map_err(|err| McpServerError::Init(err.to_string()))?,
        ),
        AuditStoreKind::Jsonl => Arc::new(
            JsonlAuditStore::open(&config.audit.path)
                .map_err(|err| McpServerError::Init(err.to_string()))?,
        ),
    };
    Ok(store)
}

/// Builds the configured record source.
fn build_record_source(config: &PhiGateConfig) -> Result<Arc<dyn RecordSource>, McpServerError> {
    let source: Arc<dyn RecordSource> = match config.records.source {
        RecordSourceKind::Memory => Arc::new(InMemoryRecordSource::new()),
        RecordSourceKind::Sqlite => Arc::new(
            SqliteRecordSource::open(&config.records.sqlite())
                .map_err(|err| McpServerError::Init(err.to_string()))?,
        ),
    };
    Ok(source)
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Shared state for HTTP handlers.
struct ServerState {
    /// Tool router for request dispatch.
    router: ToolRouter,
    /// Maximum allowed request body size.
    max_body_bytes: usize,
    /// Whether proxy headers name the caller IP.
    trust_forwarded_headers: bool,
}

/// Handles `POST /mcp`.
async fn handle_http(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> impl IntoResponse {
    let (status, response) = match body {
        Ok(bytes) if bytes.len() <= state.max_body_bytes => {
            let context = http_request_context(peer, &headers, state.trust_forwarded_headers);
            handle_payload(&state.router, &context, &bytes).await
        }
        Ok(_) => payload_too_large(),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            payload_too_large()
        }
        Err(_) => error_response(
            StatusCode::BAD_REQUEST,
            Value::Null,
            -32600,
            "unreadable request body".to_string(),
        ),
    };
    (status, axum::Json(response))
}

/// Handles `GET /health`.
async fn handle_health() -> impl IntoResponse {
    axum::Json(json!({ "status": "ok" }))
}

/// Builds the request context for an HTTP caller.
fn http_request_context(
    peer: SocketAddr,
    headers: &HeaderMap,
    trust_forwarded_headers: bool,
) -> RequestContext {
    let header_text =
        |name: HeaderName| headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string);
    let ip = if trust_forwarded_headers {
        forwarded_ip(headers).unwrap_or_else(|| peer.ip())
    } else {
        peer.ip()
    };
    RequestContext::http(Some(ip), header_text(AUTHORIZATION), header_text(USER_AGENT))
}

/// Reads the caller IP from `X-Forwarded-For` (first hop) or `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let text = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    text("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .and_then(|hop| hop.trim().parse().ok())
        .or_else(|| text("x-real-ip").and_then(|value| value.trim().parse().ok()))
}

// ============================================================================
// SECTION: Stdio Transport
// ============================================================================

/// Result of reading one stdio frame.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// Complete payload.
    Payload(Vec<u8>),
    /// Payload exceeded the limit and was discarded.
    TooLarge,
    /// Input closed between frames.
    Closed,
}

/// Serves framed JSON-RPC until the input closes.
async fn run_stdio<R, W>(
    router: &ToolRouter,
    context: &RequestContext,
    max_body_bytes: usize,
    mut reader: R,
    mut writer: W,
) -> Result<(), McpServerError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let (_, response) = match read_framed(&mut reader, max_body_bytes).await? {
            Frame::Payload(bytes) => handle_payload(router, context, &bytes).await,
            Frame::TooLarge => payload_too_large(),
            Frame::Closed => return Ok(()),
        };
        let payload = serde_json::to_vec(&response)
            .map_err(|err| McpServerError::Transport(format!("serialization failed: {err}")))?;
        write_framed(&mut writer, &payload).await?;
    }
}

/// Reads a `Content-Length` framed payload.
async fn read_framed<R>(reader: &mut R, max_body_bytes: usize) -> Result<Frame, McpServerError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    let mut line = String::new();
    loop {
        line.clear();
        let read = (&mut *reader)
            .take(u64::try_from(MAX_HEADER_LINE_BYTES).unwrap_or(u64::MAX))
            .read_line(&mut line)
            .await
            .map_err(|err| McpServerError::Transport(format!("stdio read failed: {err}")))?;
        if read == 0 {
            if saw_header {
                return Err(McpServerError::Transport("stdio closed mid-frame".to_string()));
            }
            return Ok(Frame::Closed);
        }
        if !line.ends_with('\n') {
            return Err(McpServerError::Transport("stdio header line too long".to_string()));
        }
        if line.trim().is_empty() {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            let parsed = value
                .trim()
                .parse::<usize>()
                .map_err(|_| McpServerError::Transport("invalid content length".to_string()))?;
            content_length = Some(parsed);
        }
    }
    let len = content_length
        .ok_or_else(|| McpServerError::Transport("missing content length".to_string()))?;
    if len > max_body_bytes {
        let discard = u64::try_from(len).unwrap_or(u64::MAX);
        tokio::io::copy(&mut (&mut *reader).take(discard), &mut tokio::io::sink())
            .await
            .map_err(|err| McpServerError::Transport(format!("stdio read failed: {err}")))?;
        return Ok(Frame::TooLarge);
    }
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|err| McpServerError::Transport(format!("stdio read failed: {err}")))?;
    Ok(Frame::Payload(buf))
}

/// Writes a `Content-Length` framed payload.
async fn write_framed<W>(writer: &mut W, payload: &[u8]) -> Result<(), McpServerError>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    let write_err =
        |err: std::io::Error| McpServerError::Transport(format!("stdio write failed: {err}"));
    writer.write_all(header.as_bytes()).await.map_err(write_err)?;
    writer.write_all(payload).await.map_err(write_err)?;
    writer.flush().await.map_err(write_err)
}

// ============================================================================
// SECTION: JSON-RPC Handling
// ============================================================================

/// Incoming JSON-RPC request.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// Protocol version; `2.0` when present.
    #[serde(default)]
    jsonrpc: Option<String>,
    /// Request identifier.
    #[serde(default)]
    id: Value,
    /// Method name.
    method: String,
    /// Method parameters.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// Protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Caller-safe message.
    message: String,
}

/// `tools.call` parameters.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Tool arguments.
    #[serde(default)]
    arguments: Value,
}

/// Parses a raw payload and dispatches it.
async fn handle_payload(
    router: &ToolRouter,
    context: &RequestContext,
    bytes: &[u8],
) -> (StatusCode, JsonRpcResponse) {
    let Ok(value) = serde_json::from_slice::<Value>(bytes) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            Value::Null,
            -32700,
            "parse error".to_string(),
        );
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    match serde_json::from_value::<JsonRpcRequest>(value) {
        Ok(request) => handle_request(router, context, request).await,
        Err(_) => error_response(
            StatusCode::BAD_REQUEST,
            id,
            -32600,
            "invalid json-rpc request".to_string(),
        ),
    }
}

/// Dispatches a parsed request by method.
async fn handle_request(
    router: &ToolRouter,
    base_context: &RequestContext,
    request: JsonRpcRequest,
) -> (StatusCode, JsonRpcResponse) {
    let JsonRpcRequest { jsonrpc, id, method, params } = request;
    if jsonrpc.as_deref().is_some_and(|version| version != "2.0") {
        return error_response(
            StatusCode::BAD_REQUEST,
            id,
            -32600,
            "invalid json-rpc version".to_string(),
        );
    }
    match method.as_str() {
        "initialize" => success_response(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
                "capabilities": { "tools": {} },
                "tools": router.list_tools(),
            }),
        ),
        "tools.list" | "tools/list" => success_response(id, json!({ "tools": router.list_tools() })),
        "tools.call" => {
            let Ok(call) =
                serde_json::from_value::<ToolCallParams>(params.unwrap_or(Value::Null))
            else {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    id,
                    -32602,
                    "invalid tool params".to_string(),
                );
            };
            let context = match request_id(&id) {
                Some(request_id) => base_context.clone().with_request_id(request_id),
                None => base_context.clone(),
            };
            match router.call_tool(&context, &call.name, call.arguments).await {
                Ok(result) => success_response(id, result),
                Err(err) => jsonrpc_error(id, err),
            }
        }
        _ => error_response(StatusCode::BAD_REQUEST, id, -32601, "method not found".to_string()),
    }
}

/// Renders a request identifier for diagnostics.
fn request_id(id: &Value) -> Option<String> {
    match id {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Maps a tool failure onto a status and JSON-RPC error.
fn jsonrpc_error(id: Value, error: ToolError) -> (StatusCode, JsonRpcResponse) {
    let (status, code, message) = match error {
        ToolError::UnknownTool(name) => {
            (StatusCode::BAD_REQUEST, -32004, format!("unknown tool: {name}"))
        }
        ToolError::Unauthenticated(message) => {
            (StatusCode::UNAUTHORIZED, -32001, format!("unauthenticated: {message}"))
        }
        ToolError::Unauthorized(message) => (StatusCode::FORBIDDEN, -32003, message),
        ToolError::InvalidParams(message) => (StatusCode::BAD_REQUEST, -32602, message),
        ToolError::Internal(_) => (StatusCode::OK, -32603, "internal error".to_string()),
    };
    error_response(status, id, code, message)
}

/// Builds a success envelope.
fn success_response(id: Value, result: Value) -> (StatusCode, JsonRpcResponse) {
    (StatusCode::OK, JsonRpcResponse { jsonrpc: "2.0", id, result: Some(result), error: None })
}

/// Builds an error envelope.
fn error_response(
    status: StatusCode,
    id: Value,
    code: i64,
    message: String,
) -> (StatusCode, JsonRpcResponse) {
    (
        status,
        JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError { code, message }),
        },
    )
}

/// Builds the oversized-payload error.
fn payload_too_large() -> (StatusCode, JsonRpcResponse) {
    error_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        Value::Null,
        -32070,
        "request body too large".to_string(),
    )
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

#[cfg(test)]
mod tests;
