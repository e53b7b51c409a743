// crates/phi-gate-core/src/core/authz.rs
// ============================================================================
// Module: Authorization Engine
// Description: Static role/resource permission matrix with row-level rules.
// Purpose: Decide allow/deny for every resource access without I/O.
// Dependencies: serde, crate::core::{identity, tooling}
// ============================================================================

//! ## Overview
//! The permission matrix is plain data: one match arm per
//! `(resource, role)` pair returning the permitted [`Action`] set. A request
//! is allowed when its action is present verbatim, or when a row-level grant
//! applies:
//!
//! - `read_self` satisfies `read` when the row owner is the caller.
//! - `write_assigned` satisfies `write` when the row assignee is the caller.
//!
//! No other escalation exists. Tool-level role checks are separate and run
//! first; see [`authorize_tool`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identity::Role;
use crate::core::identity::SubjectId;
use crate::core::tooling::ToolDefinition;

// ============================================================================
// SECTION: Resources and Actions
// ============================================================================

/// Protected resource families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Non-sensitive patient demographics.
    PatientBasic,
    /// Protected health information for a patient.
    PatientPhi,
    /// Admission history.
    Admission,
    /// Appointment schedule.
    Appointment,
    /// Clinical visit notes.
    MedicalRecord,
    /// Individual staff shifts.
    Shift,
    /// Organization-wide staff roster.
    StaffRoster,
}

impl ResourceKind {
    /// Returns the canonical resource label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PatientBasic => "patient-basic",
            Self::PatientPhi => "patient-phi",
            Self::Admission => "admission",
            Self::Appointment => "appointment",
            Self::MedicalRecord => "medical-record",
            Self::Shift => "shift",
            Self::StaffRoster => "staff-roster",
        }
    }

    /// Returns every resource kind.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::PatientBasic,
            Self::PatientPhi,
            Self::Admission,
            Self::Appointment,
            Self::MedicalRecord,
            Self::Shift,
            Self::StaffRoster,
        ]
    }

    /// Parses a canonical resource label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        Self::all().iter().copied().find(|kind| kind.as_str() == label)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations a role may perform on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Unrestricted read.
    Read,
    /// Unrestricted write.
    Write,
    /// Read limited to rows the caller owns.
    ReadSelf,
    /// Write limited to rows assigned to the caller.
    WriteAssigned,
    /// Read of the clinical PHI view.
    ReadClinical,
    /// Read of the insurance PHI view.
    ReadInsurance,
}

impl Action {
    /// Returns the canonical action label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadSelf => "read_self",
            Self::WriteAssigned => "write_assigned",
            Self::ReadClinical => "read_clinical",
            Self::ReadInsurance => "read_insurance",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Decision Types
// ============================================================================

/// Row attributes consulted by the row-level rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowContext {
    /// Subject that owns the row.
    pub owner_id: Option<String>,
    /// Subject the row is assigned to.
    pub assigned_id: Option<String>,
}

impl RowContext {
    /// Returns a context with no row attributes.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns a context naming the row owner.
    #[must_use]
    pub fn owned_by(owner: impl Into<String>) -> Self {
        Self { owner_id: Some(owner.into()), assigned_id: None }
    }

    /// Returns a context naming the row assignee.
    #[must_use]
    pub fn assigned_to(assignee: impl Into<String>) -> Self {
        Self { owner_id: None, assigned_id: Some(assignee.into()) }
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    /// Whether access is permitted.
    pub allowed: bool,
    /// Human-readable reason for a denial.
    pub reason: Option<String>,
}

impl AccessDecision {
    /// Returns an allow decision.
    #[must_use]
    pub const fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    /// Returns a deny decision with a reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

// ============================================================================
// SECTION: Permission Matrix
// ============================================================================

/// Returns the actions `role` may perform on `resource`.
#[must_use]
pub const fn permitted_actions(resource: ResourceKind, role: Role) -> &'static [Action] {
    use Action::{Read, ReadClinical, ReadInsurance, ReadSelf, Write, WriteAssigned};
    use ResourceKind::{
        Admission, Appointment, MedicalRecord, PatientBasic, PatientPhi, Shift, StaffRoster,
    };
    use Role::{Admin, Auditor, Billing, Doctor, Nurse, Reception};

    match (resource, role) {
        (_, Admin) => &[Read, Write],
        (_, Auditor) => &[Read],

        (PatientBasic, Doctor | Nurse | Reception) => &[Read, Write],
        (PatientBasic, Billing) => &[Read],

        (PatientPhi, Doctor | Nurse) => &[ReadClinical],
        (PatientPhi, Billing) => &[ReadInsurance],
        (PatientPhi, Reception) => &[],

        (Admission, Doctor) => &[Read, WriteAssigned],
        (Admission, Nurse | Billing) => &[Read],
        (Admission, Reception) => &[Read, Write],

        (Appointment, Doctor | Nurse | Reception) => &[Read, Write],
        (Appointment, Billing) => &[Read],

        (MedicalRecord, Doctor) => &[Read, Write],
        (MedicalRecord, Nurse) => &[Read],
        (MedicalRecord, Billing | Reception) => &[],

        (Shift, Doctor | Nurse) => &[ReadSelf],
        (Shift, Billing) => &[],
        (Shift, Reception) => &[Read],

        (StaffRoster, Doctor | Nurse) => &[ReadSelf],
        (StaffRoster, Billing | Reception) => &[Read],
    }
}

// ============================================================================
// SECTION: Authorization
// ============================================================================

/// Decides whether `role` acting as `caller` may perform `action` on a row.
#[must_use]
pub fn authorize(
    resource: ResourceKind,
    action: Action,
    role: Role,
    caller: &SubjectId,
    row: &RowContext,
) -> AccessDecision {
    let permitted = permitted_actions(resource, role);
    if permitted.contains(&action) {
        return AccessDecision::allow();
    }

    let is_caller = |candidate: &Option<String>| candidate.as_deref() == Some(caller.as_str());
    match action {
        Action::Read if permitted.contains(&Action::ReadSelf) => {
            if is_caller(&row.owner_id) {
                return AccessDecision::allow();
            }
            AccessDecision::deny(format!(
                "role '{role}' may only read its own {resource} rows"
            ))
        }
        Action::Write if permitted.contains(&Action::WriteAssigned) => {
            if is_caller(&row.assigned_id) {
                return AccessDecision::allow();
            }
            AccessDecision::deny(format!(
                "role '{role}' may only write {resource} rows assigned to it"
            ))
        }
        _ => AccessDecision::deny(format!(
            "role '{role}' lacks '{action}' permission on {resource}"
        )),
    }
}

/// Checks a role against a tool's declared allowed-role set.
#[must_use]
pub fn authorize_tool(tool: &ToolDefinition, role: Role) -> AccessDecision {
    if tool.allows_role(role) {
        AccessDecision::allow()
    } else {
        AccessDecision::deny(format!("role '{role}' is not permitted to call '{}'", tool.name))
    }
}
