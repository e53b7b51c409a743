// crates/phi-gate-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Collaborators
// Description: Mutex-backed record source and audit store.
// Purpose: Provide simple collaborators for tests and local runs.
// Dependencies: crate::interfaces, serde_json, time
// ============================================================================

//! ## Overview
//! [`InMemoryRecordSource`] serves fixture rows keyed by patient and staff
//! identifiers. [`InMemoryAuditStore`] keeps appended records in insertion
//! order and exposes a snapshot for inspection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use time::OffsetDateTime;

use crate::core::audit::AuditRecord;
use crate::core::identity::SubjectId;
use crate::interfaces::AuditStore;
use crate::interfaces::AuditStoreError;
use crate::interfaces::Record;
use crate::interfaces::RecordSource;
use crate::interfaces::SourceError;

// ============================================================================
// SECTION: Record Source
// ============================================================================

/// Fixture tables held by [`InMemoryRecordSource`].
#[derive(Debug, Default)]
struct Tables {
    /// Patient summaries keyed by patient id.
    overviews: BTreeMap<String, Record>,
    /// PHI rows keyed by patient id.
    phi: BTreeMap<String, Record>,
    /// Admission rows.
    admissions: Vec<Record>,
    /// Appointment rows.
    appointments: Vec<Record>,
    /// Visit record rows.
    medical_records: Vec<Record>,
    /// Shift rows.
    shifts: Vec<Record>,
    /// Staff ids keyed by subject id.
    staff_links: BTreeMap<String, String>,
}

/// In-memory record source.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    /// Fixture tables protected by a mutex.
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryRecordSource {
    /// Creates an empty record source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the locked tables.
    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T, SourceError> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| SourceError::Unavailable("record source mutex poisoned".to_string()))?;
        Ok(f(&mut guard))
    }

    /// Inserts a patient summary keyed by its `patient_id` field.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the row has no `patient_id`.
    pub fn insert_overview(&self, row: Record) -> Result<(), SourceError> {
        let key = key_of(&row, "patient_id")?;
        self.with_tables(|tables| tables.overviews.insert(key, row)).map(|_| ())
    }

    /// Inserts a PHI row keyed by its `patient_id` field.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the row has no `patient_id`.
    pub fn insert_phi(&self, row: Record) -> Result<(), SourceError> {
        let key = key_of(&row, "patient_id")?;
        self.with_tables(|tables| tables.phi.insert(key, row)).map(|_| ())
    }

    /// Appends an admission row.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the tables are unavailable.
    pub fn push_admission(&self, row: Record) -> Result<(), SourceError> {
        self.with_tables(|tables| tables.admissions.push(row))
    }

    /// Appends an appointment row.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the tables are unavailable.
    pub fn push_appointment(&self, row: Record) -> Result<(), SourceError> {
        self.with_tables(|tables| tables.appointments.push(row))
    }

    /// Appends a visit record row.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the tables are unavailable.
    pub fn push_medical_record(&self, row: Record) -> Result<(), SourceError> {
        self.with_tables(|tables| tables.medical_records.push(row))
    }

    /// Appends a shift row.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the tables are unavailable.
    pub fn push_shift(&self, row: Record) -> Result<(), SourceError> {
        self.with_tables(|tables| tables.shifts.push(row))
    }

    /// Links an authenticated subject to a staff identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the tables are unavailable.
    pub fn link_staff(
        &self,
        subject: &SubjectId,
        staff_id: impl Into<String>,
    ) -> Result<(), SourceError> {
        let staff_id = staff_id.into();
        self.with_tables(|tables| {
            tables.staff_links.insert(subject.as_str().to_string(), staff_id);
        })
    }
}

/// Reads a row key as text.
fn key_of(row: &Record, field: &str) -> Result<String, SourceError> {
    match row.get(field) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        _ => Err(SourceError::Query(format!("row is missing {field}"))),
    }
}

/// Returns rows whose `field` matches `value`.
fn rows_matching(rows: &[Record], field: &str, value: &str) -> Vec<Record> {
    rows.iter()
        .filter(|row| key_of(row, field).is_ok_and(|key| key == value))
        .cloned()
        .collect()
}

impl RecordSource for InMemoryRecordSource {
    fn patient_overview(&self, patient_id: &str) -> Result<Option<Record>, SourceError> {
        self.with_tables(|tables| tables.overviews.get(patient_id).cloned())
    }

    fn patient_phi(&self, patient_id: &str) -> Result<Option<Record>, SourceError> {
        self.with_tables(|tables| tables.phi.get(patient_id).cloned())
    }

    fn admissions(&self, patient_id: &str) -> Result<Vec<Record>, SourceError> {
        self.with_tables(|tables| rows_matching(&tables.admissions, "patient_id", patient_id))
    }

    fn appointments(&self, patient_id: &str) -> Result<Vec<Record>, SourceError> {
        self.with_tables(|tables| rows_matching(&tables.appointments, "patient_id", patient_id))
    }

    fn medical_records(&self, patient_id: &str) -> Result<Vec<Record>, SourceError> {
        self.with_tables(|tables| rows_matching(&tables.medical_records, "patient_id", patient_id))
    }

    fn shifts_for_staff(&self, staff_id: &str) -> Result<Vec<Record>, SourceError> {
        self.with_tables(|tables| rows_matching(&tables.shifts, "staff_id", staff_id))
    }

    fn staff_roster(&self, department: Option<&str>) -> Result<Vec<Record>, SourceError> {
        self.with_tables(|tables| match department {
            Some(department) => rows_matching(&tables.shifts, "department", department),
            None => tables.shifts.clone(),
        })
    }

    fn staff_id_for_subject(&self, subject: &SubjectId) -> Result<Option<String>, SourceError> {
        self.with_tables(|tables| tables.staff_links.get(subject.as_str()).cloned())
    }
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// In-memory append-only audit store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditStore {
    /// Records in append order.
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditStore {
    /// Creates an empty audit store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every appended record.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Runs `f` against the locked record list.
    fn with_records<T>(&self, f: impl FnOnce(&mut Vec<AuditRecord>) -> T) -> Result<T, AuditStoreError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| AuditStoreError::Unavailable("audit store mutex poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditStoreError> {
        self.with_records(|records| records.push(record.clone()))
    }

    fn known_countries(&self, subject: &SubjectId) -> Result<BTreeSet<String>, AuditStoreError> {
        self.with_records(|records| {
            records
                .iter()
                .filter(|record| &record.subject_id == subject)
                .filter_map(|record| record.location.country.clone())
                .filter(|country| !country.is_empty())
                .collect()
        })
    }

    fn denials_since(
        &self,
        subject: &SubjectId,
        since: OffsetDateTime,
    ) -> Result<u32, AuditStoreError> {
        self.with_records(|records| {
            let count = records
                .iter()
                .filter(|record| {
                    &record.subject_id == subject
                        && record.action.is_denial()
                        && record.timestamp >= since
                })
                .count();
            u32::try_from(count).unwrap_or(u32::MAX)
        })
    }
}
