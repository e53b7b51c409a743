// crates/phi-gate-mcp/src/lib.rs
// ============================================================================
// Module: PHI Gate MCP
// Description: JSON-RPC mediation server for clinical record tools.
// Purpose: Authenticate callers, dispatch tools, and audit every outcome.
// Dependencies: phi-gate-core, phi-gate-config, axum, jsonwebtoken, tokio
// ============================================================================

//! ## Overview
//! PHI Gate MCP wires the policy core to the outside world. Bearer tokens are
//! verified by [`TokenValidator`], tool calls are routed through
//! [`ToolRouter`], and every decision is handed to [`AuditWriter`], which
//! enriches and risk-scores it before appending it to the audit store.
//! Inputs arriving over either transport are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod config;
pub mod geo;
pub mod server;
pub mod token;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditClock;
pub use audit::AuditWriter;
pub use audit::JsonlAuditStore;
pub use auth::AuthError;
pub use auth::Authenticator;
pub use auth::RequestContext;
pub use config::PhiGateConfig;
pub use geo::CachedGeoLocator;
pub use geo::GeoError;
pub use geo::GeoLocator;
pub use geo::IpApiLocator;
pub use geo::NoopGeoLocator;
pub use server::McpServer;
pub use server::McpServerError;
pub use token::TokenError;
pub use token::TokenValidator;
pub use token::mint_token;
pub use tools::ToolError;
pub use tools::ToolRouter;
