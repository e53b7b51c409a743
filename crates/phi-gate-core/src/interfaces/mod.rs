// crates/phi-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: PHI Gate Interfaces
// Description: Backend-agnostic interfaces for record fetch and audit storage.
// Purpose: Define the collaborator contracts consumed by the mediation core.
// Dependencies: crate::core, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! The mediation core never talks to a database directly. It issues a
//! [`RecordQuery`] against a [`RecordSource`] only after authorization
//! succeeds, and hands sealed records to an [`AuditStore`]. Both
//! collaborators must be safe for concurrent use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::audit::AuditRecord;
use crate::core::identity::SubjectId;

// ============================================================================
// SECTION: Record Source
// ============================================================================

/// Plain structured row returned by a record source.
pub type Record = Map<String, Value>;

/// Record source errors.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Backing store could not be reached.
    #[error("record source unavailable: {0}")]
    Unavailable(String),
    /// Query failed.
    #[error("record query failed: {0}")]
    Query(String),
}

/// Parameterized lookups backing the tool catalog.
pub trait RecordSource: Send + Sync {
    /// Returns the non-PHI patient summary.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the lookup fails.
    fn patient_overview(&self, patient_id: &str) -> Result<Option<Record>, SourceError>;

    /// Returns the patient's PHI demographics row.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the lookup fails.
    fn patient_phi(&self, patient_id: &str) -> Result<Option<Record>, SourceError>;

    /// Returns admissions for a patient, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the lookup fails.
    fn admissions(&self, patient_id: &str) -> Result<Vec<Record>, SourceError>;

    /// Returns appointments for a patient, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the lookup fails.
    fn appointments(&self, patient_id: &str) -> Result<Vec<Record>, SourceError>;

    /// Returns clinical visit records for a patient, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the lookup fails.
    fn medical_records(&self, patient_id: &str) -> Result<Vec<Record>, SourceError>;

    /// Returns shifts for one staff member, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the lookup fails.
    fn shifts_for_staff(&self, staff_id: &str) -> Result<Vec<Record>, SourceError>;

    /// Returns shifts across all staff, optionally limited to a department.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the lookup fails.
    fn staff_roster(&self, department: Option<&str>) -> Result<Vec<Record>, SourceError>;

    /// Resolves the staff identifier linked to an authenticated subject.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the lookup fails.
    fn staff_id_for_subject(&self, subject: &SubjectId) -> Result<Option<String>, SourceError>;
}

/// A single authorized lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordQuery {
    /// Patient summary by identifier.
    PatientOverview {
        /// Patient identifier.
        patient_id: String,
    },
    /// Patient PHI row by identifier.
    PatientPhi {
        /// Patient identifier.
        patient_id: String,
    },
    /// Admissions by patient.
    Admissions {
        /// Patient identifier.
        patient_id: String,
    },
    /// Appointments by patient.
    Appointments {
        /// Patient identifier.
        patient_id: String,
    },
    /// Visit records by patient.
    MedicalRecords {
        /// Patient identifier.
        patient_id: String,
    },
    /// Shifts by staff identifier.
    ShiftsForStaff {
        /// Staff identifier.
        staff_id: String,
    },
    /// Shifts for the staff member linked to a subject.
    ShiftsForSubject {
        /// Authenticated subject.
        subject: SubjectId,
    },
    /// Roster across staff.
    StaffRoster {
        /// Optional department filter.
        department: Option<String>,
    },
}

/// Rows produced by a [`RecordQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Lookup by primary key.
    Single(Option<Record>),
    /// Lookup returning zero or more rows.
    Many(Vec<Record>),
}

impl FetchResult {
    /// Returns true when no row was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(row) => row.is_none(),
            Self::Many(rows) => rows.is_empty(),
        }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(row) => usize::from(row.is_some()),
            Self::Many(rows) => rows.len(),
        }
    }

    /// Converts the rows into a JSON value (`null`, object, or array).
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Single(Some(row)) => Value::Object(row),
            Self::Single(None) => Value::Null,
            Self::Many(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
        }
    }
}

impl RecordQuery {
    /// Runs the query against a source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the source fails.
    pub fn run(&self, source: &dyn RecordSource) -> Result<FetchResult, SourceError> {
        match self {
            Self::PatientOverview { patient_id } => {
                source.patient_overview(patient_id).map(FetchResult::Single)
            }
            Self::PatientPhi { patient_id } => source.patient_phi(patient_id).map(FetchResult::Single),
            Self::Admissions { patient_id } => source.admissions(patient_id).map(FetchResult::Many),
            Self::Appointments { patient_id } => {
                source.appointments(patient_id).map(FetchResult::Many)
            }
            Self::MedicalRecords { patient_id } => {
                source.medical_records(patient_id).map(FetchResult::Many)
            }
            Self::ShiftsForStaff { staff_id } => {
                source.shifts_for_staff(staff_id).map(FetchResult::Many)
            }
            Self::ShiftsForSubject { subject } => match source.staff_id_for_subject(subject)? {
                Some(staff_id) => source.shifts_for_staff(&staff_id).map(FetchResult::Many),
                None => Ok(FetchResult::Many(Vec::new())),
            },
            Self::StaffRoster { department } => {
                source.staff_roster(department.as_deref()).map(FetchResult::Many)
            }
        }
    }
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Audit store errors.
#[derive(Debug, Error)]
pub enum AuditStoreError {
    /// Storage could not be reached or opened.
    #[error("audit store unavailable: {0}")]
    Unavailable(String),
    /// Storage rejected the record.
    #[error("audit store rejected record: {0}")]
    Rejected(String),
    /// Storage I/O failed.
    #[error("audit store io error: {0}")]
    Io(String),
}

/// Append-only audit storage.
///
/// No operation updates or deletes a stored record.
pub trait AuditStore: Send + Sync {
    /// Appends one sealed record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditStoreError`] when the record cannot be persisted.
    fn append(&self, record: &AuditRecord) -> Result<(), AuditStoreError>;

    /// Returns countries previously recorded for a subject.
    ///
    /// # Errors
    ///
    /// Returns [`AuditStoreError`] when history cannot be read.
    fn known_countries(&self, subject: &SubjectId) -> Result<BTreeSet<String>, AuditStoreError>;

    /// Counts denied attempts by a subject at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditStoreError`] when history cannot be read.
    fn denials_since(
        &self,
        subject: &SubjectId,
        since: OffsetDateTime,
    ) -> Result<u32, AuditStoreError>;
}
