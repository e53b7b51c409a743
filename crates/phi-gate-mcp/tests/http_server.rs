// crates/phi-gate-mcp/tests/http_server.rs
// ============================================================================
// Module: HTTP Server Tests
// Description: JSON-RPC over a real loopback listener.
// Purpose: Verify status mapping, body limits, and caller metadata capture.
// Dependencies: phi-gate-core, phi-gate-mcp, axum, reqwest, tempfile, tokio
// ============================================================================

//! ## Overview
//! Each test binds an ephemeral loopback port, serves [`McpServer::http_app`]
//! on it, and talks to it with `reqwest`.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only HTTP assertions."
)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::ObservedSource;
use common::auth_config;
use common::hospital;
use common::router_with;
use common::token;
use phi_gate_core::AuditAction;
use phi_gate_core::InMemoryAuditStore;
use phi_gate_core::Role;
use phi_gate_mcp::McpServer;
use phi_gate_mcp::McpServerError;
use phi_gate_mcp::PhiGateConfig;
use phi_gate_mcp::config::AuditStoreKind;
use phi_gate_mcp::config::RecordSourceKind;
use reqwest::StatusCode;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn config() -> PhiGateConfig {
    let mut config = PhiGateConfig::default();
    config.auth = auth_config();
    config.server.max_body_bytes = 4096;
    config.server.trust_forwarded_headers = true;
    config.audit.store = AuditStoreKind::Memory;
    config.records.source = RecordSourceKind::Memory;
    config
}

async fn spawn(store: &InMemoryAuditStore) -> SocketAddr {
    let router = router_with(
        Arc::new(ObservedSource::new(hospital())),
        Arc::new(store.clone()),
        Duration::from_secs(5),
    );
    let server = McpServer::with_router(config(), router).unwrap();
    let app = server.http_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
    });
    addr
}

async fn post(addr: SocketAddr, bearer: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut request = reqwest::Client::new()
        .post(format!("http://{addr}/mcp"))
        .header("user-agent", "ward-terminal/2.1")
        .header("x-forwarded-for", "203.0.113.5, 10.0.0.2")
        .json(&body);
    if let Some(bearer) = bearer {
        request = request.bearer_auth(bearer);
    }
    let response = request.send().await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

// ============================================================================
// SECTION: Endpoints
// ============================================================================

#[tokio::test]
async fn health_needs_no_credentials() {
    let store = InMemoryAuditStore::new();
    let addr = spawn(&store).await;
    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn tool_call_captures_forwarded_ip_and_user_agent() {
    let store = InMemoryAuditStore::new();
    let addr = spawn(&store).await;
    let bearer = token("nurse-1", Role::Nurse);
    let (status, body) = post(
        addr,
        Some(&bearer),
        json!({
            "jsonrpc": "2.0",
            "id": "req-1",
            "method": "tools.call",
            "params": { "name": "get_appointments", "arguments": { "patient_id": "P-1001" } }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "req-1");
    assert_eq!(body["result"]["data"][0]["appointment_id"], "AP-1");
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].ip.as_deref(), Some("203.0.113.5"));
    assert_eq!(records[0].user_agent.as_deref(), Some("ward-terminal/2.1"));
    assert_eq!(records[0].action, AuditAction::ToolSuccess);
}

#[tokio::test]
async fn errors_map_onto_http_statuses() {
    let store = InMemoryAuditStore::new();
    let addr = spawn(&store).await;
    let call = |name: &str| {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools.call",
            "params": { "name": name, "arguments": { "patient_id": "P-1001" } }
        })
    };

    let (status, body) = post(addr, None, call("get_patient_overview")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["error"]["message"], "unauthenticated: missing authorization");

    let forged = format!("{}x", token("nurse-1", Role::Nurse));
    let (status, body) = post(addr, Some(&forged), call("get_patient_overview")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let message = body["error"]["message"].as_str().unwrap();
    assert_eq!(message.matches("unauthenticated").count(), 1);

    let reception = token("front-desk", Role::Reception);
    let (status, body) = post(addr, Some(&reception), call("get_patient_phi")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], -32003);

    let (status, body) =
        post(addr, Some(&reception), json!({ "id": 2, "method": "resources/list" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32601);

    let (status, body) = post(addr, None, json!({ "id": 3, "method": "tools.list" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["tools"][0]["name"], "get_patient_overview");
}

#[tokio::test]
async fn oversized_body_is_rejected_before_parsing() {
    let store = InMemoryAuditStore::new();
    let addr = spawn(&store).await;
    let bearer = token("admin-1", Role::Admin);
    let (status, body) = post(
        addr,
        Some(&bearer),
        json!({
            "id": 1,
            "method": "tools.call",
            "params": { "name": "get_staff_roster", "arguments": { "department": "x".repeat(8192) } }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], -32070);
    assert!(store.records().is_empty());
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

#[test]
fn from_config_builds_memory_backends() {
    assert!(McpServer::from_config(config()).is_ok());
}

#[test]
fn from_config_opens_sqlite_audit_and_requires_existing_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.audit.store = AuditStoreKind::Sqlite;
    config.audit.path = dir.path().join("audit.db");
    assert!(McpServer::from_config(config.clone()).is_ok());
    assert!(dir.path().join("audit.db").exists());

    config.records.source = RecordSourceKind::Sqlite;
    config.records.path = dir.path().join("missing-ehr.db");
    assert!(matches!(McpServer::from_config(config), Err(McpServerError::Init(_))));
}

#[test]
fn from_config_rejects_invalid_settings() {
    let mut config = config();
    config.auth.secret = Some("short".to_string());
    assert!(matches!(McpServer::from_config(config), Err(McpServerError::Config(_))));
}
