// crates/phi-gate-config/src/config.rs
// ============================================================================
// Module: PHI Gate Configuration
// Description: TOML configuration model with defaults and validation.
// Purpose: Load server, token, audit, risk, geolocation, and record settings.
// Dependencies: phi-gate-core, phi-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! [`PhiGateConfig::load`] resolves the config path, parses TOML, and runs
//! [`PhiGateConfig::validate`]. Validation rejects ambiguous key material,
//! fallback roles with PHI access, and timeouts above the mediation bounds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use phi_gate_core::RiskPolicy;
use phi_gate_core::Role;
use phi_gate_core::ToolName;
use phi_gate_store_sqlite::SqliteStoreConfig;
use phi_gate_store_sqlite::SqliteStoreMode;
use phi_gate_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "phi-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "PHI_GATE_CONFIG";
/// Environment variable holding the symmetric signing secret by default.
pub const DEFAULT_SECRET_ENV: &str = "PHI_GATE_JWT_SECRET";
/// Environment variable holding the stdio bearer token by default.
pub const DEFAULT_STDIO_TOKEN_ENV: &str = "PHI_GATE_TOKEN";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Minimum length of an inline symmetric secret.
pub const MIN_SECRET_BYTES: usize = 32;
/// Upper bound for record fetch timeouts.
pub const MAX_FETCH_TIMEOUT_MS: u64 = 30_000;
/// Upper bound for geolocation lookup timeouts.
pub const MAX_GEO_TIMEOUT_MS: u64 = 2_000;
/// Upper bound for token leeway.
const MAX_LEEWAY_SECS: u64 = 300;
/// Default request body limit.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default busy timeout for `SQLite` connections.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhiGateConfig {
    /// Server transport settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Bearer token verification settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Audit store settings.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Risk heuristic settings.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Geolocation enrichment settings.
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    /// Record source settings.
    #[serde(default)]
    pub records: RecordsConfig,
}

impl PhiGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// When neither an explicit path nor `PHI_GATE_CONFIG` is given and the
    /// default file does not exist, validated defaults are returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path)?;
        validate_path(&resolved)?;
        if !explicit && !resolved.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.auth.validate()?;
        self.audit.validate()?;
        self.risk.validate()?;
        self.geolocation.validate()?;
        self.records.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Supported transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerTransport {
    /// HTTP JSON-RPC transport.
    #[default]
    Http,
    /// Content-Length framed stdin/stdout transport.
    Stdio,
}

impl ServerTransport {
    /// Returns the transport label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Stdio => "stdio",
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Transport type.
    #[serde(default)]
    pub transport: ServerTransport,
    /// Bind address for HTTP.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Permit binding to a non-loopback address.
    #[serde(default)]
    pub allow_non_loopback: bool,
    /// Record the forwarded client address instead of the socket peer.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
    /// Environment variable carrying the stdio session bearer token.
    #[serde(default = "default_stdio_token_env")]
    pub stdio_token_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: ServerTransport::Http,
            bind: default_bind(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            allow_non_loopback: false,
            trust_forwarded_headers: false,
            stdio_token_env: default_stdio_token_env(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("server.bind is not a socket address".to_string()))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        match self.transport {
            ServerTransport::Http => {
                let addr = self.bind_addr()?;
                if !addr.ip().is_loopback() && !self.allow_non_loopback {
                    return Err(ConfigError::Invalid(
                        "non-loopback bind requires server.allow_non_loopback".to_string(),
                    ));
                }
            }
            ServerTransport::Stdio => {
                if self.stdio_token_env.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "server.stdio_token_env must be non-empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Returns the default bind address.
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Returns the default body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Returns the default stdio token variable.
fn default_stdio_token_env() -> String {
    DEFAULT_STDIO_TOKEN_ENV.to_string()
}

// ============================================================================
// SECTION: Auth
// ============================================================================

/// Supported token signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TokenAlgorithm {
    /// HMAC with SHA-256.
    #[default]
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
    /// RSA PKCS#1 v1.5 with SHA-256.
    RS256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    RS384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    RS512,
}

impl TokenAlgorithm {
    /// Returns true for shared-secret algorithms.
    #[must_use]
    pub const fn is_symmetric(self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }
}

/// Bearer token verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Signature algorithm.
    #[serde(default)]
    pub algorithm: TokenAlgorithm,
    /// Inline shared secret (symmetric algorithms only).
    #[serde(default)]
    pub secret: Option<String>,
    /// Environment variable holding the shared secret when `secret` is unset.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    /// PEM public key path (asymmetric algorithms only).
    #[serde(default)]
    pub public_key_path: Option<PathBuf>,
    /// Clock skew tolerated on expiry, in seconds.
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
    /// Required issuer claim.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Required audience claim.
    #[serde(default)]
    pub audience: Option<String>,
    /// Claims consulted, in order, for the subject identifier.
    #[serde(default = "default_subject_claims")]
    pub subject_claims: Vec<String>,
    /// Claim carrying the role label.
    #[serde(default = "default_role_claim")]
    pub role_claim: String,
    /// Role used when the role claim is missing or unrecognized.
    #[serde(default = "default_fallback_role")]
    pub fallback_role: Role,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            algorithm: TokenAlgorithm::default(),
            secret: None,
            secret_env: default_secret_env(),
            public_key_path: None,
            leeway_secs: default_leeway_secs(),
            issuer: None,
            audience: None,
            subject_claims: default_subject_claims(),
            role_claim: default_role_claim(),
            fallback_role: default_fallback_role(),
        }
    }
}

impl AuthConfig {
    /// Validates token verification settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.algorithm.is_symmetric() {
            if self.public_key_path.is_some() {
                return Err(ConfigError::Invalid(
                    "auth.public_key_path cannot be combined with a symmetric algorithm"
                        .to_string(),
                ));
            }
            if let Some(secret) = &self.secret
                && secret.len() < MIN_SECRET_BYTES
            {
                return Err(ConfigError::Invalid(format!(
                    "auth.secret must be at least {MIN_SECRET_BYTES} bytes"
                )));
            }
            if self.secret.is_none() && self.secret_env.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "auth.secret or auth.secret_env is required".to_string(),
                ));
            }
        } else {
            if self.secret.is_some() {
                return Err(ConfigError::Invalid(
                    "auth.secret cannot be combined with an asymmetric algorithm".to_string(),
                ));
            }
            let Some(path) = &self.public_key_path else {
                return Err(ConfigError::Invalid(
                    "auth.public_key_path is required for asymmetric algorithms".to_string(),
                ));
            };
            validate_path_string("auth.public_key_path", &path.to_string_lossy())?;
        }
        if self.leeway_secs > MAX_LEEWAY_SECS {
            return Err(ConfigError::Invalid(format!(
                "auth.leeway_secs must be at most {MAX_LEEWAY_SECS}"
            )));
        }
        if self.subject_claims.is_empty()
            || self.subject_claims.iter().any(|claim| claim.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "auth.subject_claims must list non-empty claim names".to_string(),
            ));
        }
        if self.role_claim.trim().is_empty() {
            return Err(ConfigError::Invalid("auth.role_claim must be non-empty".to_string()));
        }
        if self.fallback_role.has_phi_access() {
            return Err(ConfigError::Invalid(format!(
                "auth.fallback_role cannot be '{}', which has PHI access",
                self.fallback_role
            )));
        }
        Ok(())
    }
}

/// Returns the default secret variable.
fn default_secret_env() -> String {
    DEFAULT_SECRET_ENV.to_string()
}

/// Returns the default leeway.
const fn default_leeway_secs() -> u64 {
    0
}

/// Returns the default subject claims.
fn default_subject_claims() -> Vec<String> {
    vec!["user_id".to_string(), "sub".to_string()]
}

/// Returns the default role claim.
fn default_role_claim() -> String {
    "role".to_string()
}

/// Returns the least-privileged fallback role.
const fn default_fallback_role() -> Role {
    Role::Reception
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditStoreKind {
    /// Process-local memory (not durable).
    Memory,
    /// `SQLite` database.
    #[default]
    Sqlite,
    /// JSON-lines file.
    Jsonl,
}

impl AuditStoreKind {
    /// Returns the backend label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Jsonl => "jsonl",
        }
    }
}

/// Audit store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Backend selection.
    #[serde(default)]
    pub store: AuditStoreKind,
    /// Database or log file path.
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            store: AuditStoreKind::default(),
            path: default_audit_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl AuditConfig {
    /// Returns the `SQLite` settings for this store.
    #[must_use]
    pub fn sqlite(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        }
    }

    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.store != AuditStoreKind::Memory {
            validate_path_string("audit.path", &self.path.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Returns the default audit path.
fn default_audit_path() -> PathBuf {
    PathBuf::from("phi-gate-audit.db")
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Risk
// ============================================================================

/// Risk heuristic settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskConfig {
    /// First business hour (UTC, inclusive).
    #[serde(default = "default_business_hours_start")]
    pub business_hours_start: u8,
    /// Last business hour (UTC, inclusive).
    #[serde(default = "default_business_hours_end")]
    pub business_hours_end: u8,
    /// Lookback window for denied attempts, in seconds.
    #[serde(default = "default_denial_window_secs")]
    pub denial_window_secs: u64,
    /// Denials tolerated inside the window.
    #[serde(default = "default_denial_threshold")]
    pub denial_threshold: u32,
    /// Scores above this are suspicious.
    #[serde(default = "default_suspicious_threshold")]
    pub suspicious_threshold: u8,
    /// Tools that add the sensitive weight.
    #[serde(default = "default_sensitive_tools")]
    pub sensitive_tools: Vec<ToolName>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            business_hours_start: default_business_hours_start(),
            business_hours_end: default_business_hours_end(),
            denial_window_secs: default_denial_window_secs(),
            denial_threshold: default_denial_threshold(),
            suspicious_threshold: default_suspicious_threshold(),
            sensitive_tools: default_sensitive_tools(),
        }
    }
}

impl RiskConfig {
    /// Builds the runtime risk policy.
    #[must_use]
    pub fn policy(&self) -> RiskPolicy {
        RiskPolicy {
            business_hours_start: self.business_hours_start,
            business_hours_end: self.business_hours_end,
            denial_window: Duration::from_secs(self.denial_window_secs),
            denial_threshold: self.denial_threshold,
            suspicious_threshold: self.suspicious_threshold,
            sensitive_tools: self.sensitive_tools.iter().copied().collect(),
        }
    }

    /// Validates risk settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.business_hours_start > 23 || self.business_hours_end > 23 {
            return Err(ConfigError::Invalid("risk business hours must be 0-23".to_string()));
        }
        if self.business_hours_start > self.business_hours_end {
            return Err(ConfigError::Invalid(
                "risk.business_hours_start must not exceed business_hours_end".to_string(),
            ));
        }
        if self.denial_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "risk.denial_window_secs must be greater than zero".to_string(),
            ));
        }
        if self.suspicious_threshold > 100 {
            return Err(ConfigError::Invalid(
                "risk.suspicious_threshold must be at most 100".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default first business hour.
const fn default_business_hours_start() -> u8 {
    6
}

/// Returns the default last business hour.
const fn default_business_hours_end() -> u8 {
    22
}

/// Returns the default denial window.
const fn default_denial_window_secs() -> u64 {
    3600
}

/// Returns the default denial threshold.
const fn default_denial_threshold() -> u32 {
    3
}

/// Returns the default suspicious threshold.
const fn default_suspicious_threshold() -> u8 {
    50
}

/// Returns the default sensitive tool list.
fn default_sensitive_tools() -> Vec<ToolName> {
    vec![ToolName::GetPatientPhi, ToolName::GetMedicalRecords]
}

// ============================================================================
// SECTION: Geolocation
// ============================================================================

/// Geolocation enrichment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeolocationConfig {
    /// Enable external lookups.
    #[serde(default)]
    pub enabled: bool,
    /// Lookup endpoint; the IP address is appended.
    #[serde(default = "default_geo_endpoint")]
    pub endpoint: String,
    /// Lookup timeout in milliseconds.
    #[serde(default = "default_geo_timeout_ms")]
    pub timeout_ms: u64,
    /// Cache entry lifetime in seconds.
    #[serde(default = "default_geo_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Maximum cached addresses.
    #[serde(default = "default_geo_capacity")]
    pub cache_capacity: usize,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_geo_endpoint(),
            timeout_ms: default_geo_timeout_ms(),
            cache_ttl_secs: default_geo_ttl_secs(),
            cache_capacity: default_geo_capacity(),
        }
    }
}

impl GeolocationConfig {
    /// Validates geolocation settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid(
                "geolocation.endpoint must include http:// or https://".to_string(),
            ));
        }
        if self.timeout_ms == 0 || self.timeout_ms > MAX_GEO_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "geolocation.timeout_ms must be between 1 and {MAX_GEO_TIMEOUT_MS}"
            )));
        }
        if self.cache_ttl_secs == 0 || self.cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "geolocation cache ttl and capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default lookup endpoint.
fn default_geo_endpoint() -> String {
    "http://ip-api.com/json/".to_string()
}

/// Returns the default lookup timeout.
const fn default_geo_timeout_ms() -> u64 {
    MAX_GEO_TIMEOUT_MS
}

/// Returns the default cache lifetime (24 hours).
const fn default_geo_ttl_secs() -> u64 {
    86_400
}

/// Returns the default cache capacity.
const fn default_geo_capacity() -> usize {
    1024
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Record source backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordSourceKind {
    /// Empty in-memory source.
    Memory,
    /// Read-only `SQLite` clinical database.
    #[default]
    Sqlite,
}

impl RecordSourceKind {
    /// Returns the backend label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Record source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordsConfig {
    /// Backend selection.
    #[serde(default)]
    pub source: RecordSourceKind,
    /// Clinical database path.
    #[serde(default = "default_records_path")]
    pub path: PathBuf,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Fetch timeout in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            source: RecordSourceKind::default(),
            path: default_records_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl RecordsConfig {
    /// Returns the `SQLite` settings for the record source.
    #[must_use]
    pub fn sqlite(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            busy_timeout_ms: self.busy_timeout_ms,
            ..SqliteStoreConfig::new(self.path.clone())
        }
    }

    /// Returns the fetch timeout.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Validates record source settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_ms == 0 || self.fetch_timeout_ms > MAX_FETCH_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "records.fetch_timeout_ms must be between 1 and {MAX_FETCH_TIMEOUT_MS}"
            )));
        }
        if self.source == RecordSourceKind::Sqlite {
            validate_path_string("records.path", &self.path.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Returns the default clinical database path.
fn default_records_path() -> PathBuf {
    PathBuf::from("phi-gate-ehr.db")
}

/// Returns the default fetch timeout.
const fn default_fetch_timeout_ms() -> u64 {
    MAX_FETCH_TIMEOUT_MS
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path; the flag is true when a path was requested.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
