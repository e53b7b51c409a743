// crates/phi-gate-config/src/lib.rs
// ============================================================================
// Module: PHI Gate Config
// Description: Configuration model, loading, and validation.
// Purpose: Provide a single source of truth for PHI Gate settings.
// Dependencies: phi-gate-core, phi-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is read from TOML once at startup and validated fail-closed.
//! Every section has defaults, so an absent default config file yields a
//! loopback-only HTTP server with an HS256 verifier keyed from the
//! environment.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuditConfig;
pub use config::AuditStoreKind;
pub use config::AuthConfig;
pub use config::ConfigError;
pub use config::GeolocationConfig;
pub use config::PhiGateConfig;
pub use config::RecordSourceKind;
pub use config::RecordsConfig;
pub use config::RiskConfig;
pub use config::ServerConfig;
pub use config::ServerTransport;
pub use config::TokenAlgorithm;
pub use config::CONFIG_ENV_VAR;
pub use config::DEFAULT_SECRET_ENV;
pub use config::DEFAULT_STDIO_TOKEN_ENV;
pub use config::MAX_FETCH_TIMEOUT_MS;
pub use config::MAX_GEO_TIMEOUT_MS;
pub use config::MIN_SECRET_BYTES;
