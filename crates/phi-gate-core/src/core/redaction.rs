// crates/phi-gate-core/src/core/redaction.rs
// ============================================================================
// Module: Redaction Engine
// Description: Field-level redaction of records by role and data scope.
// Purpose: Guarantee protected fields never leave the gate past their policy.
// Dependencies: serde, serde_json, crate::core::identity
// ============================================================================

//! ## Overview
//! Redaction maps a `(role, scope)` pair to a [`RedactionRule`] and applies
//! it to a JSON record, or element-wise to a list of records. The requested
//! scope is first clamped to the role's ceiling so callers cannot widen
//! their view by asking for it. Lists keep their order and length; only
//! fields within elements are removed.
//!
//! Redaction is pure and idempotent: applying the same rule twice yields the
//! same value as applying it once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::identity::Role;

// ============================================================================
// SECTION: Field Tables
// ============================================================================

/// Contact and identity fields treated as PHI.
pub const PHI_FIELDS: &[&str] = &[
    "address",
    "phone",
    "email",
    "social_security_number",
    "ssn",
    "national_id",
    "emergency_contact",
];

/// Insurance and financial fields.
pub const INSURANCE_FIELDS: &[&str] = &["insurance_provider", "insurance_number"];

/// Primary key retained by the insurance view.
pub const PRIMARY_KEY_FIELD: &str = "patient_id";

/// Row identifiers that do not count as meaningful data on their own.
pub const IDENTIFIER_FIELDS: &[&str] =
    &["patient_id", "record_id", "admission_id", "appointment_id", "staff_id", "shift_id"];

/// Key carried by the access-denied marker object.
pub const ACCESS_DENIED_KEY: &str = "access_denied";

// ============================================================================
// SECTION: Scopes and Rules
// ============================================================================

/// Breadth of record view requested by, or permitted to, a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataScope {
    /// Unredacted record.
    #[default]
    Full,
    /// Clinical content without contact or financial fields.
    Clinical,
    /// Insurance fields and the primary key only.
    Insurance,
    /// No PHI and no insurance fields.
    Minimal,
}

impl DataScope {
    /// Returns the canonical scope label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Clinical => "clinical",
            Self::Insurance => "insurance",
            Self::Minimal => "minimal",
        }
    }

    /// Parses a caller-supplied scope label.
    ///
    /// `minimal` is a ceiling only and is not accepted from callers.
    #[must_use]
    pub fn parse_requested(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "full" => Some(Self::Full),
            "clinical" => Some(Self::Clinical),
            "insurance" => Some(Self::Insurance),
            _ => None,
        }
    }

    /// Returns true when a ceiling of `self` permits serving `requested`.
    #[must_use]
    pub const fn covers(self, requested: Self) -> bool {
        match self {
            Self::Full => true,
            Self::Clinical => matches!(requested, Self::Clinical | Self::Minimal),
            Self::Insurance => matches!(requested, Self::Insurance | Self::Minimal),
            Self::Minimal => matches!(requested, Self::Minimal),
        }
    }

    /// Clamps a requested scope to the role's ceiling.
    #[must_use]
    pub const fn effective_for(self, role: Role) -> Self {
        let ceiling = role.scope_ceiling();
        if ceiling.covers(self) { self } else { ceiling }
    }
}

impl fmt::Display for DataScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field retention rule selected by the redaction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionRule {
    /// Record returned unchanged.
    Full,
    /// PHI and insurance fields removed.
    ClinicalOnly,
    /// Only insurance fields and the primary key kept.
    InsuranceOnly,
    /// PHI and insurance fields removed; a record left with identifiers only
    /// is replaced by an access-denied marker.
    Denied,
}

/// Selects the rule for a role and requested scope.
#[must_use]
pub const fn redaction_rule(role: Role, requested: DataScope) -> RedactionRule {
    match (role, requested.effective_for(role)) {
        (Role::Admin | Role::Auditor, _) => RedactionRule::Full,
        (_, DataScope::Insurance) => RedactionRule::InsuranceOnly,
        (_, DataScope::Clinical) => RedactionRule::ClinicalOnly,
        (_, DataScope::Full | DataScope::Minimal) => RedactionRule::Denied,
    }
}

// ============================================================================
// SECTION: Redaction
// ============================================================================

/// Redacts a record or list of records for `role` at the requested scope.
#[must_use]
pub fn redact(value: &Value, role: Role, requested: DataScope) -> Value {
    apply_rule(value, redaction_rule(role, requested), role)
}

/// Applies an explicit rule to a record or list of records.
#[must_use]
pub fn apply_rule(value: &Value, rule: RedactionRule, role: Role) -> Value {
    match value {
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| apply_rule(item, rule, role)).collect())
        }
        Value::Object(record) => redact_record(record, rule, role),
        other => other.clone(),
    }
}

/// Returns true when `value` is an access-denied marker.
#[must_use]
pub fn is_access_denied_marker(value: &Value) -> bool {
    value.get(ACCESS_DENIED_KEY).and_then(Value::as_bool).unwrap_or(false)
}

/// Builds the access-denied marker object.
#[must_use]
pub fn access_denied_marker(reason: &str) -> Value {
    let mut marker = Map::new();
    marker.insert(ACCESS_DENIED_KEY.to_string(), Value::Bool(true));
    marker.insert("reason".to_string(), Value::String(reason.to_string()));
    Value::Object(marker)
}

/// Applies `rule` to one record object.
fn redact_record(record: &Map<String, Value>, rule: RedactionRule, role: Role) -> Value {
    match rule {
        RedactionRule::Full => Value::Object(record.clone()),
        RedactionRule::ClinicalOnly => Value::Object(strip_protected(record)),
        RedactionRule::InsuranceOnly => Value::Object(
            record
                .iter()
                .filter(|(key, _)| {
                    key.as_str() == PRIMARY_KEY_FIELD || INSURANCE_FIELDS.contains(&key.as_str())
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        RedactionRule::Denied => {
            let stripped = strip_protected(record);
            let has_data = stripped.keys().any(|key| !IDENTIFIER_FIELDS.contains(&key.as_str()));
            if has_data {
                Value::Object(stripped)
            } else {
                access_denied_marker(&format!("no fields of this record are visible to role '{role}'"))
            }
        }
    }
}

/// Removes PHI and insurance fields.
fn strip_protected(record: &Map<String, Value>) -> Map<String, Value> {
    record
        .iter()
        .filter(|(key, _)| {
            !PHI_FIELDS.contains(&key.as_str()) && !INSURANCE_FIELDS.contains(&key.as_str())
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
