// crates/phi-gate-core/src/core/audit.rs
// ============================================================================
// Module: Audit Records
// Description: Audit inputs, write-once audit records, and location data.
// Purpose: Describe every mediated decision in a durable, immutable form.
// Dependencies: serde, serde_json, time, uuid
// ============================================================================

//! ## Overview
//! The dispatcher describes each outcome as an [`AuditInput`]. The audit
//! writer enriches it with location and a risk assessment and seals it into
//! an [`AuditRecord`], which stores append and never modify.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::authz::ResourceKind;
use crate::core::identity::Role;
use crate::core::identity::SubjectId;
use crate::core::risk::RiskAssessment;
use crate::core::tooling::ToolName;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum characters kept from a result summary.
pub const MAX_RESULT_SUMMARY_CHARS: usize = 500;
/// Maximum characters kept from a user agent.
pub const MAX_USER_AGENT_CHARS: usize = 512;

// ============================================================================
// SECTION: Actions
// ============================================================================

/// Audit action label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Non-PHI tool completed.
    ToolSuccess,
    /// PHI tool completed.
    PhiRead,
    /// Non-PHI access denied.
    AccessDenied,
    /// PHI access denied.
    PhiDenied,
    /// Bearer token missing or rejected.
    AuthFailed,
    /// Malformed tool arguments.
    InvalidRequest,
    /// Authorized call failed while fetching data.
    ToolFailure,
}

impl AuditAction {
    /// Returns the canonical action label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToolSuccess => "TOOL_SUCCESS",
            Self::PhiRead => "PHI_READ",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::PhiDenied => "PHI_DENIED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::ToolFailure => "TOOL_FAILURE",
        }
    }

    /// Parses a canonical action label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        [
            Self::ToolSuccess,
            Self::PhiRead,
            Self::AccessDenied,
            Self::PhiDenied,
            Self::AuthFailed,
            Self::InvalidRequest,
            Self::ToolFailure,
        ]
        .into_iter()
        .find(|action| action.as_str() == label)
    }

    /// Returns true for actions counted as denied attempts.
    #[must_use]
    pub const fn is_denial(self) -> bool {
        matches!(self, Self::AccessDenied | Self::PhiDenied | Self::AuthFailed)
    }

    /// Returns the success label for a tool.
    #[must_use]
    pub const fn success(is_phi: bool) -> Self {
        if is_phi { Self::PhiRead } else { Self::ToolSuccess }
    }

    /// Returns the denial label for a tool.
    #[must_use]
    pub const fn denied(is_phi: bool) -> Self {
        if is_phi { Self::PhiDenied } else { Self::AccessDenied }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Location
// ============================================================================

/// Best-effort geographic location of a caller address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Country name.
    pub country: Option<String>,
    /// Region or state name.
    pub region: Option<String>,
    /// City name.
    pub city: Option<String>,
    /// Latitude in degrees.
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    pub longitude: Option<f64>,
    /// IANA timezone name.
    pub timezone: Option<String>,
}

impl GeoLocation {
    /// Location reported for loopback and private addresses.
    #[must_use]
    pub fn local() -> Self {
        Self {
            country: Some("Local".to_string()),
            region: Some("Development".to_string()),
            city: Some("Localhost".to_string()),
            latitude: None,
            longitude: None,
            timezone: None,
        }
    }

    /// Returns true when no field is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

// ============================================================================
// SECTION: Audit Input
// ============================================================================

/// Dispatcher-side description of one mediated outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditInput {
    /// Subject the decision applies to.
    pub subject_id: SubjectId,
    /// Caller role when authenticated.
    pub role: Option<Role>,
    /// Action label.
    pub action: AuditAction,
    /// Resource family touched or requested.
    pub resource: Option<ResourceKind>,
    /// Primary identifier of the requested row.
    pub record_id: Option<String>,
    /// Tool invoked.
    pub tool: Option<ToolName>,
    /// Tool arguments as supplied.
    pub tool_args: Option<Value>,
    /// Short description of the result.
    pub result_summary: Option<String>,
    /// Whether access was granted.
    pub access_granted: bool,
    /// Reason for a denial.
    pub denial_reason: Option<String>,
    /// Elapsed dispatch time in milliseconds.
    pub duration_ms: Option<u64>,
    /// Caller IP address.
    pub ip: Option<String>,
    /// Caller user agent.
    pub user_agent: Option<String>,
    /// Whether the tool is PHI-bearing.
    pub is_phi_access: bool,
}

impl AuditInput {
    /// Creates an input for `subject_id` with the remaining fields empty.
    #[must_use]
    pub const fn new(subject_id: SubjectId, action: AuditAction, access_granted: bool) -> Self {
        Self {
            subject_id,
            role: None,
            action,
            resource: None,
            record_id: None,
            tool: None,
            tool_args: None,
            result_summary: None,
            access_granted,
            denial_reason: None,
            duration_ms: None,
            ip: None,
            user_agent: None,
            is_phi_access: false,
        }
    }
}

// ============================================================================
// SECTION: Audit Record
// ============================================================================

/// Sealed audit record. Created once and never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record identifier.
    pub id: Uuid,
    /// Subject the decision applies to.
    pub subject_id: SubjectId,
    /// Caller role when authenticated.
    pub role: Option<Role>,
    /// Action label.
    pub action: AuditAction,
    /// Resource family touched or requested.
    pub resource_kind: Option<ResourceKind>,
    /// Primary identifier of the requested row.
    pub record_id: Option<String>,
    /// Tool invoked.
    pub tool_name: Option<ToolName>,
    /// Tool arguments as supplied.
    pub tool_args: Option<Value>,
    /// Truncated result summary.
    pub result_summary: Option<String>,
    /// Whether access was granted.
    pub access_granted: bool,
    /// Reason for a denial.
    pub denial_reason: Option<String>,
    /// UTC timestamp of the decision.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Elapsed dispatch time in milliseconds.
    pub duration_ms: Option<u64>,
    /// Caller IP address.
    pub ip: Option<String>,
    /// Truncated caller user agent.
    pub user_agent: Option<String>,
    /// Caller location.
    #[serde(default)]
    pub location: GeoLocation,
    /// Whether the tool is PHI-bearing.
    pub is_phi_access: bool,
    /// Heuristic risk score in `[0, 100]`.
    pub risk_score: u8,
    /// Whether the risk score exceeded the suspicious threshold.
    pub is_suspicious: bool,
}

impl AuditRecord {
    /// Seals an input into a record with a fresh identifier.
    #[must_use]
    pub fn seal(
        input: AuditInput,
        timestamp: OffsetDateTime,
        location: GeoLocation,
        risk: RiskAssessment,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: input.subject_id,
            role: input.role,
            action: input.action,
            resource_kind: input.resource,
            record_id: input.record_id,
            tool_name: input.tool,
            tool_args: input.tool_args,
            result_summary: input.result_summary.map(|s| truncate_chars(&s, MAX_RESULT_SUMMARY_CHARS)),
            access_granted: input.access_granted,
            denial_reason: input.denial_reason,
            timestamp: timestamp.to_offset(time::UtcOffset::UTC),
            duration_ms: input.duration_ms,
            ip: input.ip,
            user_agent: input.user_agent.map(|ua| truncate_chars(&ua, MAX_USER_AGENT_CHARS)),
            location,
            is_phi_access: input.is_phi_access,
            risk_score: risk.score,
            is_suspicious: risk.suspicious,
        }
    }
}

/// Truncates to at most `max` characters on a char boundary.
#[must_use]
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
