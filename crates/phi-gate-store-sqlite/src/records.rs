// crates/phi-gate-store-sqlite/src/records.rs
// ============================================================================
// Module: SQLite Record Source
// Description: Read-only parameterized lookups over the clinical database.
// Purpose: Serve tool data fetches without ever writing clinical tables.
// Dependencies: phi-gate-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! The record source opens the clinical database read-only. Each lookup is a
//! fixed statement with caller input bound as parameters; rows are returned
//! as plain JSON objects keyed by column name.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use phi_gate_core::Record;
use phi_gate_core::RecordSource;
use phi_gate_core::SourceError;
use phi_gate_core::SubjectId;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Params;
use rusqlite::Row;
use rusqlite::params;
use rusqlite::types::ValueRef;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

use crate::config::SqliteStoreConfig;
use crate::config::SqliteStoreError;
use crate::config::open_read_only;

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Patient summary by id.
const SQL_PATIENT_OVERVIEW: &str = "SELECT patient_id, first_name, last_name, \
     date_of_birth_year, gender, created_at FROM ehr_patient WHERE patient_id = ?1";
/// PHI demographics by patient id.
const SQL_PATIENT_PHI: &str = "SELECT patient_id, date_of_birth, address, phone, email, \
     social_security_number, emergency_contact, insurance_provider, insurance_number \
     FROM ehr_phidemographics WHERE patient_id = ?1";
/// Admissions by patient id.
const SQL_ADMISSIONS: &str = "SELECT admission_id, patient_id, room_number, admission_date, \
     discharge_date FROM ehr_admission WHERE patient_id = ?1 ORDER BY admission_date DESC";
/// Appointments by patient id.
const SQL_APPOINTMENTS: &str = "SELECT a.appointment_id, a.patient_id, a.staff_id, \
     s.full_name AS staff_name, a.appointment_date, a.status, a.notes \
     FROM ehr_appointment a LEFT JOIN ehr_staff s ON s.staff_id = a.staff_id \
     WHERE a.patient_id = ?1 ORDER BY a.appointment_date DESC";
/// Visit records by patient id.
const SQL_MEDICAL_RECORDS: &str = "SELECT m.record_id, m.patient_id, m.appointment_id, \
     m.staff_id, s.full_name AS staff_name, m.diagnosis, m.treatment, m.visit_date \
     FROM ehr_medicalrecord m LEFT JOIN ehr_staff s ON s.staff_id = m.staff_id \
     WHERE m.patient_id = ?1 ORDER BY m.visit_date DESC";
/// Shifts by staff id.
const SQL_SHIFTS_FOR_STAFF: &str = "SELECT shift_id, staff_id, start_time, end_time \
     FROM ehr_shift WHERE staff_id = ?1 ORDER BY start_time DESC";
/// Roster across staff with an optional department filter.
const SQL_STAFF_ROSTER: &str = "SELECT sh.shift_id, sh.staff_id, s.full_name AS staff_name, \
     s.department, sh.start_time, sh.end_time \
     FROM ehr_shift sh JOIN ehr_staff s ON s.staff_id = sh.staff_id \
     WHERE ?1 IS NULL OR s.department = ?1 ORDER BY sh.start_time DESC";
/// Staff id linked to an authenticated subject.
const SQL_STAFF_FOR_SUBJECT: &str = "SELECT staff_id FROM ehr_staff WHERE user_id = ?1";

// ============================================================================
// SECTION: Source
// ============================================================================

/// Read-only `SQLite` record source.
#[derive(Clone)]
pub struct SqliteRecordSource {
    /// Shared read-only connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRecordSource {
    /// Opens an existing clinical database read-only.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database is missing or cannot be
    /// opened.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let connection = open_read_only(config)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Runs a statement and collects every row.
    fn query_rows<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Record>, SourceError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| SourceError::Unavailable("record source mutex poisoned".to_string()))?;
        let mut stmt = guard.prepare_cached(sql).map_err(query_error)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt.query_map(params, |row| row_to_record(row, &columns)).map_err(query_error)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(query_error)?);
        }
        Ok(records)
    }

    /// Runs a statement expected to match at most one row.
    fn query_one<P: Params>(&self, sql: &str, params: P) -> Result<Option<Record>, SourceError> {
        Ok(self.query_rows(sql, params)?.into_iter().next())
    }
}

impl RecordSource for SqliteRecordSource {
    fn patient_overview(&self, patient_id: &str) -> Result<Option<Record>, SourceError> {
        self.query_one(SQL_PATIENT_OVERVIEW, params![patient_id])
    }

    fn patient_phi(&self, patient_id: &str) -> Result<Option<Record>, SourceError> {
        self.query_one(SQL_PATIENT_PHI, params![patient_id])
    }

    fn admissions(&self, patient_id: &str) -> Result<Vec<Record>, SourceError> {
        self.query_rows(SQL_ADMISSIONS, params![patient_id])
    }

    fn appointments(&self, patient_id: &str) -> Result<Vec<Record>, SourceError> {
        self.query_rows(SQL_APPOINTMENTS, params![patient_id])
    }

    fn medical_records(&self, patient_id: &str) -> Result<Vec<Record>, SourceError> {
        self.query_rows(SQL_MEDICAL_RECORDS, params![patient_id])
    }

    fn shifts_for_staff(&self, staff_id: &str) -> Result<Vec<Record>, SourceError> {
        self.query_rows(SQL_SHIFTS_FOR_STAFF, params![staff_id])
    }

    fn staff_roster(&self, department: Option<&str>) -> Result<Vec<Record>, SourceError> {
        self.query_rows(SQL_STAFF_ROSTER, params![department])
    }

    fn staff_id_for_subject(&self, subject: &SubjectId) -> Result<Option<String>, SourceError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| SourceError::Unavailable("record source mutex poisoned".to_string()))?;
        guard
            .query_row(SQL_STAFF_FOR_SUBJECT, params![subject.as_str()], |row| {
                let value = row.get_ref(0)?;
                Ok(match value {
                    ValueRef::Integer(number) => Some(number.to_string()),
                    ValueRef::Text(text) => Some(String::from_utf8_lossy(text).into_owned()),
                    _ => None,
                })
            })
            .optional()
            .map(Option::flatten)
            .map_err(query_error)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps an engine error into a source error.
fn query_error(error: rusqlite::Error) -> SourceError {
    SourceError::Query(error.to_string())
}

/// Converts a result row into a JSON object keyed by column name.
fn row_to_record(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<Record> {
    let mut record = Map::with_capacity(columns.len());
    for (index, name) in columns.iter().enumerate() {
        let value = match row.get_ref(index)? {
            ValueRef::Null | ValueRef::Blob(_) => Value::Null,
            ValueRef::Integer(number) => Value::from(number),
            ValueRef::Real(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
            ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        };
        record.insert(name.clone(), value);
    }
    Ok(record)
}
