// crates/phi-gate-core/src/core/tooling.rs
// ============================================================================
// Module: Tool Catalog
// Description: Canonical tool names and their static definitions.
// Purpose: Single source of truth for tool arguments, PHI flags, and roles.
// Dependencies: serde, serde_json, crate::core::{authz, identity}
// ============================================================================

//! ## Overview
//! Every dispatchable tool resolves to exactly one [`ToolDefinition`] in a
//! static table. The table is read-only for the process lifetime and is also
//! published to clients as metadata through the tool listing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::core::authz::ResourceKind;
use crate::core::identity::Role;

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Canonical tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Non-sensitive patient summary.
    GetPatientOverview,
    /// Patient PHI demographics, redacted by role and scope.
    GetPatientPhi,
    /// Admission history for a patient.
    GetAdmissions,
    /// Appointments for a patient.
    GetAppointments,
    /// Clinical visit records for a patient.
    GetMedicalRecords,
    /// Shifts for a named staff member.
    GetShifts,
    /// Shifts for the calling staff member.
    GetMyShifts,
    /// Shift roster across staff, optionally by department.
    GetStaffRoster,
}

impl ToolName {
    /// Returns the canonical string name for the tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetPatientOverview => "get_patient_overview",
            Self::GetPatientPhi => "get_patient_phi",
            Self::GetAdmissions => "get_admissions",
            Self::GetAppointments => "get_appointments",
            Self::GetMedicalRecords => "get_medical_records",
            Self::GetShifts => "get_shifts",
            Self::GetMyShifts => "get_my_shifts",
            Self::GetStaffRoster => "get_staff_roster",
        }
    }

    /// Returns all tool names in catalog order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::GetPatientOverview,
            Self::GetPatientPhi,
            Self::GetAdmissions,
            Self::GetAppointments,
            Self::GetMedicalRecords,
            Self::GetShifts,
            Self::GetMyShifts,
            Self::GetStaffRoster,
        ]
    }

    /// Parses a tool name from its string representation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|tool| tool.as_str() == name)
    }

    /// Returns the static definition for this tool.
    #[must_use]
    pub fn definition(self) -> &'static ToolDefinition {
        // Catalog entries are declared in enum order.
        &TOOL_CATALOG[self as usize]
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tool Definitions
// ============================================================================

/// Static description of one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: ToolName,
    /// Human-readable description for clients.
    pub description: &'static str,
    /// Arguments that must be present and non-empty.
    pub required_args: &'static [&'static str],
    /// Arguments that may be supplied.
    pub optional_args: &'static [&'static str],
    /// Whether the tool returns protected health information.
    pub is_phi: bool,
    /// Roles permitted to call the tool at all.
    pub allowed_roles: &'static [Role],
    /// Resource family the tool reads.
    pub resource: ResourceKind,
}

/// All roles, for tools open to every staff member.
const ALL_ROLES: &[Role] = Role::all();

/// Static tool catalog.
pub static TOOL_CATALOG: [ToolDefinition; 8] = [
    ToolDefinition {
        name: ToolName::GetPatientOverview,
        description: "Basic patient summary without protected health information.",
        required_args: &["patient_id"],
        optional_args: &[],
        is_phi: false,
        allowed_roles: ALL_ROLES,
        resource: ResourceKind::PatientBasic,
    },
    ToolDefinition {
        name: ToolName::GetPatientPhi,
        description: "Patient demographics including PHI, redacted to the caller's role and \
                      requested scope (full, clinical, insurance).",
        required_args: &["patient_id"],
        optional_args: &["scope"],
        is_phi: true,
        allowed_roles: &[Role::Admin, Role::Auditor, Role::Doctor, Role::Nurse, Role::Billing],
        resource: ResourceKind::PatientPhi,
    },
    ToolDefinition {
        name: ToolName::GetAdmissions,
        description: "Admission history for a patient.",
        required_args: &["patient_id"],
        optional_args: &[],
        is_phi: false,
        allowed_roles: ALL_ROLES,
        resource: ResourceKind::Admission,
    },
    ToolDefinition {
        name: ToolName::GetAppointments,
        description: "Appointments scheduled for a patient.",
        required_args: &["patient_id"],
        optional_args: &[],
        is_phi: false,
        allowed_roles: ALL_ROLES,
        resource: ResourceKind::Appointment,
    },
    ToolDefinition {
        name: ToolName::GetMedicalRecords,
        description: "Clinical visit records (diagnosis, treatment) for a patient.",
        required_args: &["patient_id"],
        optional_args: &[],
        is_phi: true,
        allowed_roles: &[Role::Admin, Role::Auditor, Role::Doctor, Role::Nurse],
        resource: ResourceKind::MedicalRecord,
    },
    ToolDefinition {
        name: ToolName::GetShifts,
        description: "Shifts for a staff member; clinical staff may only read their own.",
        required_args: &["staff_id"],
        optional_args: &[],
        is_phi: false,
        allowed_roles: &[Role::Admin, Role::Auditor, Role::Doctor, Role::Nurse, Role::Reception],
        resource: ResourceKind::Shift,
    },
    ToolDefinition {
        name: ToolName::GetMyShifts,
        description: "Shifts for the calling staff member.",
        required_args: &[],
        optional_args: &[],
        is_phi: false,
        allowed_roles: ALL_ROLES,
        resource: ResourceKind::Shift,
    },
    ToolDefinition {
        name: ToolName::GetStaffRoster,
        description: "Shift roster across all staff, optionally filtered by department.",
        required_args: &[],
        optional_args: &["department"],
        is_phi: false,
        allowed_roles: &[Role::Admin],
        resource: ResourceKind::StaffRoster,
    },
];

/// Returns the full tool catalog.
#[must_use]
pub fn tool_catalog() -> &'static [ToolDefinition] {
    &TOOL_CATALOG
}

impl ToolDefinition {
    /// Returns true when `role` appears in the allowed-role set.
    #[must_use]
    pub fn allows_role(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }

    /// Returns the first required argument that is missing or empty.
    #[must_use]
    pub fn missing_argument(&self, args: &Map<String, Value>) -> Option<&'static str> {
        self.required_args.iter().copied().find(|name| string_argument(args, name).is_none())
    }

    /// Returns a JSON schema describing the tool input.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for name in self.required_args.iter().chain(self.optional_args) {
            let schema = if *name == "scope" {
                json!({"type": "string", "enum": ["full", "clinical", "insurance"]})
            } else {
                json!({"type": "string"})
            };
            properties.insert((*name).to_string(), schema);
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_args,
            "additionalProperties": false,
        })
    }

    /// Returns the catalog entry published to clients.
    #[must_use]
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
            "is_phi": self.is_phi,
            "allowed_roles": self.allowed_roles,
            "resource": self.resource,
        })
    }
}

// ============================================================================
// SECTION: Argument Helpers
// ============================================================================

/// Reads a string-like argument; numbers are accepted and rendered as text.
#[must_use]
pub fn string_argument(args: &Map<String, Value>, name: &str) -> Option<String> {
    match args.get(name)? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
