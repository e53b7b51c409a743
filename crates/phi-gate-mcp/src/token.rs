// crates/phi-gate-mcp/src/token.rs
// ============================================================================
// Module: Token Validator
// Description: Signed bearer token verification and identity extraction.
// Purpose: Produce a typed identity from a verified JWT or fail closed.
// Dependencies: phi-gate-core, phi-gate-config, jsonwebtoken, time
// ============================================================================

//! ## Overview
//! [`TokenValidator`] holds one algorithm and one verification key, both
//! fixed at construction. Validation checks signature, expiry (with the
//! configured leeway), optional issuer and audience, and the subject claim.
//! A missing or unrecognized role claim resolves to the configured fallback
//! role, which configuration validation keeps non-elevated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;

use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use jsonwebtoken::errors::ErrorKind;
use phi_gate_core::Identity;
use phi_gate_core::Role;
use phi_gate_core::SubjectId;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::auth::AuthError;
use crate::auth::Authenticator;
use crate::auth::RequestContext;
use crate::auth::parse_bearer_token;
use crate::auth::token_fingerprint;
use crate::config::AuthConfig;
use crate::config::MIN_SECRET_BYTES;
use crate::config::TokenAlgorithm;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token verification failures.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No token was presented.
    #[error("missing token")]
    Missing,
    /// Token is not a well-formed signed structure.
    #[error("malformed token")]
    Malformed,
    /// Signature verification failed.
    #[error("invalid token signature")]
    InvalidSignature,
    /// Token expiry has passed.
    #[error("token expired")]
    Expired,
    /// A required claim is absent.
    #[error("token missing required claim: {0}")]
    MissingClaim(String),
    /// Token failed issuer, audience, or algorithm checks.
    #[error("token rejected: {0}")]
    Rejected(String),
    /// Verification or signing key is unusable.
    #[error("token key error: {0}")]
    Key(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::MissingRequiredClaim(claim) => Self::MissingClaim(claim.clone()),
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::Malformed,
            ErrorKind::InvalidIssuer => Self::Rejected("issuer mismatch".to_string()),
            ErrorKind::InvalidAudience => Self::Rejected("audience mismatch".to_string()),
            ErrorKind::ImmatureSignature => Self::Rejected("token not yet valid".to_string()),
            ErrorKind::InvalidAlgorithm => Self::Rejected("algorithm mismatch".to_string()),
            ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey => Self::Key(error.to_string()),
            _ => Self::Rejected(error.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Verifies bearer tokens against a fixed key.
pub struct TokenValidator {
    /// Verification key.
    key: DecodingKey,
    /// Algorithm, expiry, issuer, and audience rules.
    validation: Validation,
    /// Claims consulted, in order, for the subject.
    subject_claims: Vec<String>,
    /// Claim carrying the role label.
    role_claim: String,
    /// Role used when the role claim is missing or unrecognized.
    fallback_role: Role,
}

impl TokenValidator {
    /// Builds a validator from auth configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Key`] when the key cannot be resolved or parsed.
    pub fn from_config(config: &AuthConfig) -> Result<Self, TokenError> {
        let key = if config.algorithm.is_symmetric() {
            DecodingKey::from_secret(&resolve_secret(config)?)
        } else {
            let path = config
                .public_key_path
                .as_ref()
                .ok_or_else(|| TokenError::Key("public key path not configured".to_string()))?;
            let pem = fs::read(path).map_err(|err| TokenError::Key(err.to_string()))?;
            DecodingKey::from_rsa_pem(&pem)?
        };
        let mut validation = Validation::new(algorithm(config.algorithm));
        validation.leeway = config.leeway_secs;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        Ok(Self {
            key,
            validation,
            subject_claims: config.subject_claims.clone(),
            role_claim: config.role_claim.clone(),
            fallback_role: config.fallback_role,
        })
    }

    /// Verifies a raw token and returns the caller identity.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when the token is missing, malformed, forged,
    /// expired, or lacks a subject.
    pub fn validate(&self, token: &str) -> Result<Identity, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }
        let data = jsonwebtoken::decode::<Map<String, Value>>(token, &self.key, &self.validation)?;
        let claims = data.claims;
        let subject = self
            .subject_claims
            .iter()
            .find_map(|name| claim_text(&claims, name))
            .ok_or_else(|| TokenError::MissingClaim(self.subject_claims.join("|")))?;
        let role = claim_text(&claims, &self.role_claim)
            .and_then(|label| Role::parse(&label))
            .unwrap_or(self.fallback_role);
        Ok(Identity::new(SubjectId::new(subject), role, claims))
    }
}

impl Authenticator for TokenValidator {
    fn authenticate(&self, ctx: &RequestContext) -> Result<Identity, AuthError> {
        let token = parse_bearer_token(ctx.auth_header.as_deref())?;
        self.validate(token).map_err(|err| {
            tracing::debug!(
                target: "phi_gate::auth",
                fingerprint = %token_fingerprint(token),
                error = %err,
                "bearer token rejected"
            );
            AuthError::Unauthenticated(err.to_string())
        })
    }
}

// ============================================================================
// SECTION: Minting
// ============================================================================

/// Signs a development token for `subject` with the configured shared secret.
///
/// # Errors
///
/// Returns [`TokenError::Key`] for asymmetric algorithms or an unusable
/// secret.
pub fn mint_token(
    config: &AuthConfig,
    subject: &str,
    role: Role,
    ttl_secs: i64,
) -> Result<String, TokenError> {
    if !config.algorithm.is_symmetric() {
        return Err(TokenError::Key("minting requires a symmetric algorithm".to_string()));
    }
    let secret = resolve_secret(config)?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let mut claims = Map::new();
    let subject_claim = config.subject_claims.first().map_or("sub", String::as_str);
    claims.insert(subject_claim.to_string(), Value::String(subject.to_string()));
    claims.insert(config.role_claim.clone(), Value::String(role.as_str().to_string()));
    claims.insert("iat".to_string(), Value::from(now));
    claims.insert("exp".to_string(), Value::from(now.saturating_add(ttl_secs)));
    if let Some(issuer) = &config.issuer {
        claims.insert("iss".to_string(), Value::String(issuer.clone()));
    }
    if let Some(audience) = &config.audience {
        claims.insert("aud".to_string(), Value::String(audience.clone()));
    }
    let header = Header::new(algorithm(config.algorithm));
    Ok(jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(&secret))?)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps the configured algorithm onto the JWT library's enum.
const fn algorithm(algorithm: TokenAlgorithm) -> Algorithm {
    match algorithm {
        TokenAlgorithm::HS256 => Algorithm::HS256,
        TokenAlgorithm::HS384 => Algorithm::HS384,
        TokenAlgorithm::HS512 => Algorithm::HS512,
        TokenAlgorithm::RS256 => Algorithm::RS256,
        TokenAlgorithm::RS384 => Algorithm::RS384,
        TokenAlgorithm::RS512 => Algorithm::RS512,
    }
}

/// Resolves the shared secret from config or its environment variable.
fn resolve_secret(config: &AuthConfig) -> Result<Vec<u8>, TokenError> {
    let secret = match &config.secret {
        Some(secret) => secret.clone(),
        None => env::var(&config.secret_env).map_err(|_| {
            TokenError::Key(format!("signing secret not set in {}", config.secret_env))
        })?,
    };
    if secret.len() < MIN_SECRET_BYTES {
        return Err(TokenError::Key(format!(
            "signing secret must be at least {MIN_SECRET_BYTES} bytes"
        )));
    }
    Ok(secret.into_bytes())
}

/// Reads a claim as non-empty text; numeric claims are rendered as text.
fn claim_text(claims: &Map<String, Value>, name: &str) -> Option<String> {
    match claims.get(name)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
