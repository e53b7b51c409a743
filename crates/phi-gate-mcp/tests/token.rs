// crates/phi-gate-mcp/tests/token.rs
// ============================================================================
// Module: Token Validator Tests
// Description: Signature, expiry, and claim extraction checks.
// Purpose: Ensure bearer tokens fail closed and map onto identities.
// Dependencies: phi-gate-core, phi-gate-mcp, jsonwebtoken, time
// ============================================================================

//! ## Overview
//! Tokens are signed directly with `jsonwebtoken` so each test controls the
//! exact claim set presented to the validator.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only token assertions."
)]

mod common;

use common::SECRET;
use common::auth_config;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use phi_gate_core::Role;
use phi_gate_core::ToolName;
use phi_gate_mcp::Authenticator;
use phi_gate_mcp::RequestContext;
use phi_gate_mcp::TokenError;
use phi_gate_mcp::TokenValidator;
use phi_gate_mcp::config::AuthConfig;
use phi_gate_mcp::config::TokenAlgorithm;
use phi_gate_mcp::mint_token;
use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn sign(claims: &Value, secret: &str) -> String {
    jsonwebtoken::encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .unwrap()
}

fn validator() -> TokenValidator {
    TokenValidator::from_config(&auth_config()).unwrap()
}

// ============================================================================
// SECTION: Verification
// ============================================================================

#[test]
fn valid_token_yields_identity() {
    let token = sign(
        &json!({ "sub": "u-1", "role": "Nurse", "username": "jdoe", "exp": now() + 600 }),
        SECRET,
    );
    let identity = validator().validate(&token).unwrap();
    assert_eq!(identity.subject_id().as_str(), "u-1");
    assert_eq!(identity.role(), Role::Nurse);
    assert_eq!(identity.raw_claims()["username"], "jdoe");
    assert_eq!(identity.raw_claims()["role"], "Nurse");
}

#[test]
fn expired_token_is_rejected_even_when_signed() {
    let token = sign(&json!({ "sub": "u-1", "role": "Admin", "exp": now() - 3600 }), SECRET);
    assert!(matches!(validator().validate(&token), Err(TokenError::Expired)));
}

#[test]
fn recently_expired_token_is_rejected_by_default() {
    let token = sign(&json!({ "sub": "u-1", "role": "Admin", "exp": now() - 10 }), SECRET);
    assert!(matches!(validator().validate(&token), Err(TokenError::Expired)));
}

#[test]
fn configured_leeway_tolerates_clock_skew() {
    let config = AuthConfig { leeway_secs: 60, ..auth_config() };
    let validator = TokenValidator::from_config(&config).unwrap();
    let token = sign(&json!({ "sub": "u-1", "role": "Admin", "exp": now() - 10 }), SECRET);
    assert!(validator.validate(&token).is_ok());
}

#[test]
fn wrong_secret_is_rejected() {
    let token = sign(
        &json!({ "sub": "u-1", "role": "Admin", "exp": now() + 600 }),
        "another-secret-that-is-long-enough-000",
    );
    assert!(matches!(validator().validate(&token), Err(TokenError::InvalidSignature)));
}

#[test]
fn malformed_and_empty_tokens_are_rejected() {
    assert!(matches!(validator().validate("not-a-jwt"), Err(TokenError::Malformed)));
    assert!(matches!(validator().validate("   "), Err(TokenError::Missing)));
}

#[test]
fn missing_expiry_is_rejected() {
    let token = sign(&json!({ "sub": "u-1", "role": "Admin" }), SECRET);
    assert!(matches!(validator().validate(&token), Err(TokenError::MissingClaim(claim)) if claim == "exp"));
}

// ============================================================================
// SECTION: Claims
// ============================================================================

#[test]
fn missing_or_unknown_role_falls_back() {
    let validator = validator();
    let token = sign(&json!({ "sub": "u-1", "exp": now() + 600 }), SECRET);
    assert_eq!(validator.validate(&token).unwrap().role(), Role::Reception);

    let token = sign(&json!({ "sub": "u-1", "role": "Janitor", "exp": now() + 600 }), SECRET);
    assert_eq!(validator.validate(&token).unwrap().role(), Role::Reception);

    let token = sign(&json!({ "sub": "u-1", "role": " doctor ", "exp": now() + 600 }), SECRET);
    assert_eq!(validator.validate(&token).unwrap().role(), Role::Doctor);
}

#[test]
fn roleless_token_cannot_read_phi() {
    let token = sign(&json!({ "sub": "nobody", "exp": now() + 600 }), SECRET);
    let role = validator().validate(&token).unwrap().role();
    assert!(!role.has_phi_access());
    assert!(!ToolName::GetPatientPhi.definition().allowed_roles.contains(&role));
}

#[test]
fn subject_claims_are_consulted_in_order() {
    let validator = validator();
    let token =
        sign(&json!({ "user_id": 42, "sub": "ignored", "role": "Admin", "exp": now() + 600 }), SECRET);
    assert_eq!(validator.validate(&token).unwrap().subject_id().as_str(), "42");

    let token = sign(&json!({ "user_id": "", "sub": "u-9", "exp": now() + 600 }), SECRET);
    assert_eq!(validator.validate(&token).unwrap().subject_id().as_str(), "u-9");

    let token = sign(&json!({ "role": "Admin", "exp": now() + 600 }), SECRET);
    assert!(matches!(validator.validate(&token), Err(TokenError::MissingClaim(_))));
}

#[test]
fn issuer_and_audience_are_enforced_when_configured() {
    let config = AuthConfig {
        issuer: Some("https://idp.hospital.test".to_string()),
        audience: Some("phi-gate".to_string()),
        ..auth_config()
    };
    let validator = TokenValidator::from_config(&config).unwrap();

    let good = sign(
        &json!({
            "sub": "u-1",
            "exp": now() + 600,
            "iss": "https://idp.hospital.test",
            "aud": "phi-gate",
        }),
        SECRET,
    );
    assert!(validator.validate(&good).is_ok());

    let wrong_issuer = sign(
        &json!({ "sub": "u-1", "exp": now() + 600, "iss": "https://evil.test", "aud": "phi-gate" }),
        SECRET,
    );
    assert!(matches!(validator.validate(&wrong_issuer), Err(TokenError::Rejected(_))));

    let wrong_audience = sign(
        &json!({
            "sub": "u-1",
            "exp": now() + 600,
            "iss": "https://idp.hospital.test",
            "aud": "billing-portal",
        }),
        SECRET,
    );
    assert!(matches!(validator.validate(&wrong_audience), Err(TokenError::Rejected(_))));
}

// ============================================================================
// SECTION: Keys and Minting
// ============================================================================

#[test]
fn unset_secret_env_fails_construction() {
    let config = AuthConfig {
        secret: None,
        secret_env: "PHI_GATE_TEST_SECRET_THAT_IS_NEVER_SET".to_string(),
        ..AuthConfig::default()
    };
    assert!(matches!(TokenValidator::from_config(&config), Err(TokenError::Key(_))));
}

#[test]
fn minted_tokens_round_trip_through_the_validator() {
    let config = AuthConfig {
        issuer: Some("phi-gate-dev".to_string()),
        audience: Some("phi-gate".to_string()),
        ..auth_config()
    };
    let token = mint_token(&config, "auditor-7", Role::Auditor, 300).unwrap();
    let identity = TokenValidator::from_config(&config).unwrap().validate(&token).unwrap();
    assert_eq!(identity.subject_id().as_str(), "auditor-7");
    assert_eq!(identity.role(), Role::Auditor);

    let expired = mint_token(&config, "auditor-7", Role::Auditor, -3600).unwrap();
    assert!(matches!(
        TokenValidator::from_config(&config).unwrap().validate(&expired),
        Err(TokenError::Expired)
    ));
}

#[test]
fn minting_requires_a_shared_secret() {
    let config = AuthConfig { algorithm: TokenAlgorithm::RS256, secret: None, ..auth_config() };
    assert!(matches!(mint_token(&config, "u-1", Role::Admin, 60), Err(TokenError::Key(_))));
}

#[test]
fn authenticator_reads_the_bearer_header() {
    let validator = validator();
    let token = mint_token(&auth_config(), "u-1", Role::Doctor, 60).unwrap();

    let ctx = RequestContext::stdio(Some(&token));
    assert_eq!(validator.authenticate(&ctx).unwrap().role(), Role::Doctor);

    let ctx = RequestContext::http(None, Some(format!("Basic {token}")), None);
    assert!(validator.authenticate(&ctx).is_err());

    let ctx = RequestContext::http(None, None, None);
    assert!(validator.authenticate(&ctx).is_err());
}
