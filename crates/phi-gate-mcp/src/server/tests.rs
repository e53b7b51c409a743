// crates/phi-gate-mcp/src/server/tests.rs
// ============================================================================
// Module: MCP Server Unit Tests
// Description: Framing, method routing, and error mapping checks.
// Purpose: Validate the JSON-RPC surface without binding sockets.
// Dependencies: phi-gate-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Drives [`handle_payload`] and the stdio loop against an in-memory router
//! whose authenticator accepts a single fixed bearer token.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only JSON-RPC assertions."
)]

use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use phi_gate_core::Identity;
use phi_gate_core::InMemoryAuditStore;
use phi_gate_core::InMemoryRecordSource;
use phi_gate_core::Role;
use phi_gate_core::SubjectId;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use super::Frame;
use super::forwarded_ip;
use super::handle_payload;
use super::read_framed;
use super::run_stdio;
use crate::audit::AuditWriter;
use crate::auth::AuthError;
use crate::auth::Authenticator;
use crate::auth::RequestContext;
use crate::tools::ToolRouter;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Accepts `Bearer good` as an Admin caller.
struct FixedAuthenticator;

impl Authenticator for FixedAuthenticator {
    fn authenticate(&self, ctx: &RequestContext) -> Result<Identity, AuthError> {
        match ctx.auth_header.as_deref() {
            Some("Bearer good") => Ok(Identity::new(SubjectId::new("admin-1"), Role::Admin, Map::new())),
            _ => Err(AuthError::Unauthenticated("invalid token".to_string())),
        }
    }
}

/// Rejects every caller and remembers the request ids it saw.
#[derive(Default)]
struct RecordingAuthenticator {
    /// Request ids in call order.
    seen: Mutex<Vec<Option<String>>>,
}

impl Authenticator for RecordingAuthenticator {
    fn authenticate(&self, ctx: &RequestContext) -> Result<Identity, AuthError> {
        self.seen.lock().unwrap().push(ctx.request_id.clone());
        Err(AuthError::Unauthenticated("invalid token".to_string()))
    }
}

fn router(store: &InMemoryAuditStore) -> ToolRouter {
    let source = InMemoryRecordSource::new();
    let mut row = Map::new();
    row.insert("patient_id".to_string(), json!("P-1"));
    row.insert("name".to_string(), json!("Ada Lovelace"));
    source.insert_overview(row).unwrap();
    ToolRouter::new(
        Arc::new(FixedAuthenticator),
        Arc::new(source),
        AuditWriter::with_store(Arc::new(store.clone())),
        Duration::from_secs(5),
    )
}

fn framed(payload: &str) -> Vec<u8> {
    format!("Content-Length: {}\r\n\r\n{payload}", payload.len()).into_bytes()
}

/// Splits framed output into parsed JSON payloads.
fn unframe(mut bytes: &[u8]) -> Vec<Value> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let text = std::str::from_utf8(bytes).unwrap();
        let header_end = text.find("\r\n\r\n").unwrap();
        let len: usize =
            text[..header_end].trim_start_matches("Content-Length:").trim().parse().unwrap();
        let start = header_end + 4;
        out.push(serde_json::from_slice(&bytes[start..start + len]).unwrap());
        bytes = &bytes[start + len..];
    }
    out
}

async fn call(router: &ToolRouter, ctx: &RequestContext, body: &str) -> (StatusCode, Value) {
    let (status, response) = handle_payload(router, ctx, body.as_bytes()).await;
    (status, serde_json::to_value(&response).unwrap())
}

// ============================================================================
// SECTION: Method Routing
// ============================================================================

#[tokio::test]
async fn discovery_methods_need_no_credentials() {
    let store = InMemoryAuditStore::new();
    let router = router(&store);
    let ctx = RequestContext::stdio(None);

    for method in ["tools.list", "tools/list"] {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method }).to_string();
        let (status, response) = call(&router, &ctx, &body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 8);
    }

    let body = json!({ "jsonrpc": "2.0", "id": "init", "method": "initialize" }).to_string();
    let (_, response) = call(&router, &ctx, &body).await;
    assert_eq!(response["id"], "init");
    assert_eq!(response["result"]["serverInfo"]["name"], "phi-gate");
    assert!(response["result"]["tools"].is_array());
    assert!(store.records().is_empty());
}

#[tokio::test]
async fn tool_calls_carry_the_jsonrpc_id_as_request_id() {
    let store = InMemoryAuditStore::new();
    let authenticator = Arc::new(RecordingAuthenticator::default());
    let router = ToolRouter::new(
        authenticator.clone(),
        Arc::new(InMemoryRecordSource::new()),
        AuditWriter::with_store(Arc::new(store.clone())),
        Duration::from_secs(5),
    );
    let ctx = RequestContext::stdio(None);
    for id in [json!("req-42"), json!(7), Value::Null] {
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools.call",
            "params": { "name": "get_patient_overview", "arguments": { "patient_id": "P-1" } }
        })
        .to_string();
        let (status, response) = call(&router, &ctx, &body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response["error"]["message"], "unauthenticated: invalid token");
    }
    let seen = authenticator.seen.lock().unwrap().clone();
    assert_eq!(seen, [Some("req-42".to_string()), Some("7".to_string()), None]);
}

#[tokio::test]
async fn unknown_method_is_rejected_without_audit() {
    let store = InMemoryAuditStore::new();
    let router = router(&store);
    let body = json!({ "id": 3, "method": "tools/call", "params": {} }).to_string();
    let (status, response) = call(&router, &RequestContext::stdio(None), &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["id"], 3);
    assert!(store.records().is_empty());
}

#[tokio::test]
async fn tool_call_returns_result_payload() {
    let store = InMemoryAuditStore::new();
    let router = router(&store);
    let ctx = RequestContext::stdio(Some("good"));
    let body = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools.call",
        "params": { "name": "get_patient_overview", "arguments": { "patient_id": "P-1" } }
    })
    .to_string();
    let (status, response) = call(&router, &ctx, &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["result"]["data"]["name"], "Ada Lovelace");
    assert_eq!(response["result"]["is_empty"], false);
    assert_eq!(response["result"]["message"], "Retrieved 1 record(s)");
    assert_eq!(store.records().len(), 1);
}

#[tokio::test]
async fn tool_errors_map_to_reserved_codes() {
    let store = InMemoryAuditStore::new();
    let router = router(&store);

    let body = json!({
        "id": 1,
        "method": "tools.call",
        "params": { "name": "get_patient_overview", "arguments": { "patient_id": "P-1" } }
    })
    .to_string();
    let (status, response) = call(&router, &RequestContext::stdio(Some("bad")), &body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"]["code"], -32001);

    let good = RequestContext::stdio(Some("good"));
    let body = json!({ "id": 2, "method": "tools.call", "params": { "name": "drop_tables" } })
        .to_string();
    let (_, response) = call(&router, &good, &body).await;
    assert_eq!(response["error"]["code"], -32004);

    let body = json!({
        "id": 3,
        "method": "tools.call",
        "params": { "name": "get_admissions", "arguments": {} }
    })
    .to_string();
    let (status, response) = call(&router, &good, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"]["code"], -32602);

    let body = json!({ "id": 4, "method": "tools.call", "params": "nope" }).to_string();
    let (_, response) = call(&router, &good, &body).await;
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn malformed_envelopes_are_rejected() {
    let store = InMemoryAuditStore::new();
    let router = router(&store);
    let ctx = RequestContext::stdio(None);

    let (status, response) = call(&router, &ctx, "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["id"], Value::Null);

    let (_, response) = call(&router, &ctx, r#"{"id":9,"params":{}}"#).await;
    assert_eq!(response["error"]["code"], -32600);
    assert_eq!(response["id"], 9);

    let (_, response) = call(&router, &ctx, r#"{"jsonrpc":"1.0","id":1,"method":"tools.list"}"#).await;
    assert_eq!(response["error"]["code"], -32600);
}

// ============================================================================
// SECTION: Stdio Framing
// ============================================================================

#[tokio::test]
async fn read_framed_accepts_payload_at_limit() {
    let payload = r#"{"jsonrpc":"2.0","id":1,"method":"tools.list"}"#;
    let bytes = framed(payload);
    let mut reader = bytes.as_slice();
    let frame = read_framed(&mut reader, payload.len()).await.unwrap();
    assert_eq!(frame, Frame::Payload(payload.as_bytes().to_vec()));
    assert_eq!(read_framed(&mut reader, payload.len()).await.unwrap(), Frame::Closed);
}

#[tokio::test]
async fn read_framed_discards_payload_over_limit() {
    let payload = r#"{"jsonrpc":"2.0","id":1,"method":"tools.list"}"#;
    let mut bytes = framed(payload);
    bytes.extend(framed("{}"));
    let mut reader = bytes.as_slice();
    assert_eq!(read_framed(&mut reader, payload.len() - 1).await.unwrap(), Frame::TooLarge);
    assert_eq!(read_framed(&mut reader, 16).await.unwrap(), Frame::Payload(b"{}".to_vec()));
}

#[tokio::test]
async fn read_framed_requires_content_length() {
    let mut reader: &[u8] = b"Content-Type: application/json\r\n\r\n{}";
    assert!(read_framed(&mut reader, 1024).await.is_err());

    let mut reader: &[u8] = b"Content-Length: 10\r\n";
    assert!(read_framed(&mut reader, 1024).await.is_err());
}

#[tokio::test]
async fn stdio_loop_answers_each_frame_until_eof() {
    let store = InMemoryAuditStore::new();
    let router = router(&store);
    let ctx = RequestContext::stdio(Some("good"));
    let mut input = framed(r#"{"jsonrpc":"2.0","id":1,"method":"tools.list"}"#);
    input.extend(framed("garbage"));
    input.extend(framed(
        r#"{"id":2,"method":"tools.call","params":{"name":"get_patient_overview","arguments":{"patient_id":"P-404"}}}"#,
    ));
    let mut output = Vec::new();
    run_stdio(&router, &ctx, 4096, input.as_slice(), &mut output).await.unwrap();

    let responses = unframe(&output);
    assert_eq!(responses.len(), 3);
    assert!(responses[0]["result"]["tools"].is_array());
    assert_eq!(responses[1]["error"]["code"], -32700);
    assert_eq!(responses[2]["result"]["is_empty"], true);
    assert_eq!(responses[2]["result"]["data"], Value::Null);
    assert_eq!(responses[2]["result"]["message"], "No matching records found");
}

#[tokio::test]
async fn stdio_loop_reports_oversized_frames() {
    let store = InMemoryAuditStore::new();
    let router = router(&store);
    let input = framed(&format!(r#"{{"id":1,"method":"tools.list","pad":"{}"}}"#, "x".repeat(64)));
    let mut output = Vec::new();
    run_stdio(&router, &RequestContext::stdio(None), 32, input.as_slice(), &mut output)
        .await
        .unwrap();
    let responses = unframe(&output);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["error"]["code"], -32070);
}

// ============================================================================
// SECTION: Client Address
// ============================================================================

#[test]
fn forwarded_ip_prefers_first_hop() {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
    headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
    assert_eq!(forwarded_ip(&headers), Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))));

    headers.remove("x-forwarded-for");
    assert_eq!(forwarded_ip(&headers), Some(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 2))));

    headers.insert("x-real-ip", HeaderValue::from_static("not-an-ip"));
    assert_eq!(forwarded_ip(&headers), None);
}
