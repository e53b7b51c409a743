// crates/phi-gate-mcp/src/auth.rs
// ============================================================================
// Module: MCP Authentication
// Description: Request context and bearer credential extraction.
// Purpose: Turn transport metadata into a verified caller identity.
// Dependencies: phi-gate-core, sha2, thiserror
// ============================================================================

//! ## Overview
//! Every tool call carries a [`RequestContext`] built by the transport. An
//! [`Authenticator`] turns that context into an [`Identity`] or fails closed.
//! Raw bearer tokens never leave this module except for verification; logs
//! only ever see a SHA-256 fingerprint.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::net::IpAddr;

use phi_gate_core::Identity;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::config::ServerTransport;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted `Authorization` header size.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;
/// Hex characters of the digest kept in fingerprints.
const FINGERPRINT_HEX_CHARS: usize = 16;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request metadata supplied by the transport.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Transport used by the caller.
    pub transport: ServerTransport,
    /// Caller IP address when available.
    pub peer_ip: Option<IpAddr>,
    /// `Authorization` header value.
    pub auth_header: Option<String>,
    /// Caller user agent.
    pub user_agent: Option<String>,
    /// Request identifier for diagnostics.
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Builds a stdio request context carrying the session token.
    #[must_use]
    pub fn stdio(token: Option<&str>) -> Self {
        Self {
            transport: ServerTransport::Stdio,
            peer_ip: None,
            auth_header: token.map(|token| format!("Bearer {token}")),
            user_agent: None,
            request_id: None,
        }
    }

    /// Builds an HTTP request context.
    #[must_use]
    pub const fn http(
        peer_ip: Option<IpAddr>,
        auth_header: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            transport: ServerTransport::Http,
            peer_ip,
            auth_header,
            user_agent,
            request_id: None,
        }
    }

    /// Returns a copy with the request identifier set.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or invalid credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Verifies the caller behind a request.
pub trait Authenticator: Send + Sync {
    /// Returns the verified identity for the request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the credential is missing or invalid.
    fn authenticate(&self, ctx: &RequestContext) -> Result<Identity, AuthError>;
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the token from a `Bearer` authorization header.
///
/// # Errors
///
/// Returns [`AuthError`] when the header is missing, oversized, or not a
/// bearer credential.
pub fn parse_bearer_token(auth_header: Option<&str>) -> Result<&str, AuthError> {
    let header = auth_header
        .ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    Ok(token)
}

/// Returns a short SHA-256 fingerprint of a token for diagnostics.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut hex = String::with_capacity(FINGERPRINT_HEX_CHARS);
    for byte in digest.iter().take(FINGERPRINT_HEX_CHARS / 2) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

// ============================================================================
// SECTION: Tests
// ============================================================================
