// crates/phi-gate-core/src/core/identity.rs
// ============================================================================
// Module: Caller Identity
// Description: Staff roles, subject identifiers, and verified caller identity.
// Purpose: Carry the authenticated caller explicitly through every layer.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`Identity`] is produced once per request by the token validator and is
//! passed by reference to the authorization, redaction, and audit layers. It
//! is never stored in ambient state and cannot be mutated after creation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::authz::ResourceKind;
use crate::core::authz::permitted_actions;
use crate::core::redaction::DataScope;

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Closed set of staff roles recognized by the mediation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// System administrator.
    Admin,
    /// Treating physician.
    Doctor,
    /// Nursing staff.
    Nurse,
    /// Compliance reviewer.
    Auditor,
    /// Billing and insurance staff.
    Billing,
    /// Front-desk staff.
    Reception,
}

impl Role {
    /// Returns the canonical role label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Doctor => "Doctor",
            Self::Nurse => "Nurse",
            Self::Auditor => "Auditor",
            Self::Billing => "Billing",
            Self::Reception => "Reception",
        }
    }

    /// Returns every role in declaration order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Admin, Self::Doctor, Self::Nurse, Self::Auditor, Self::Billing, Self::Reception]
    }

    /// Parses a role label, ignoring ASCII case and surrounding whitespace.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::all().iter().copied().find(|role| role.as_str().eq_ignore_ascii_case(label))
    }

    /// Returns true when the permission matrix grants the role any action on
    /// patient PHI.
    #[must_use]
    pub const fn has_phi_access(self) -> bool {
        !permitted_actions(ResourceKind::PatientPhi, self).is_empty()
    }

    /// Returns the widest data scope this role may ever be served.
    #[must_use]
    pub const fn scope_ceiling(self) -> DataScope {
        match self {
            Self::Admin | Self::Auditor => DataScope::Full,
            Self::Doctor | Self::Nurse => DataScope::Clinical,
            Self::Billing => DataScope::Insurance,
            Self::Reception => DataScope::Minimal,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Subject Identifier
// ============================================================================

/// Opaque identifier of the authenticated subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Subject label recorded for callers that failed authentication.
    pub const ANONYMOUS: &'static str = "anonymous";

    /// Creates a new subject identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier used for unauthenticated callers.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(Self::ANONYMOUS)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Verified caller identity derived from a bearer token.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Subject the token was issued to.
    subject_id: SubjectId,
    /// Effective role after fallback resolution.
    role: Role,
    /// Every claim carried by the token.
    raw_claims: Map<String, Value>,
}

impl Identity {
    /// Creates an identity from verified token contents.
    #[must_use]
    pub fn new(subject_id: SubjectId, role: Role, raw_claims: Map<String, Value>) -> Self {
        Self { subject_id, role, raw_claims }
    }

    /// Returns the subject identifier.
    #[must_use]
    pub const fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    /// Returns the effective role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns the raw claim set.
    #[must_use]
    pub const fn raw_claims(&self) -> &Map<String, Value> {
        &self.raw_claims
    }
}
