// crates/phi-gate-store-sqlite/src/audit.rs
// ============================================================================
// Module: SQLite Audit Store
// Description: Append-only audit trail backed by SQLite.
// Purpose: Persist sealed audit records and answer risk history queries.
// Dependencies: phi-gate-core, rusqlite, serde_json, time
// ============================================================================

//! ## Overview
//! Each record is stored as its full JSON form plus the indexed columns the
//! risk heuristics query. Triggers abort any UPDATE or DELETE, so the table
//! only ever grows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use phi_gate_core::AuditRecord;
use phi_gate_core::AuditStore;
use phi_gate_core::AuditStoreError;
use phi_gate_core::SubjectId;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::SqliteStoreConfig;
use crate::config::SqliteStoreError;
use crate::config::open_writable;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Audit schema version.
const SCHEMA_VERSION: i64 = 1;
/// Maximum distinct countries returned for one subject.
const MAX_KNOWN_COUNTRIES: i64 = 256;

/// Audit schema, including append-only triggers.
const AUDIT_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS audit_records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    subject_id TEXT NOT NULL,
    action TEXT NOT NULL,
    is_denial INTEGER NOT NULL,
    access_granted INTEGER NOT NULL,
    is_phi_access INTEGER NOT NULL,
    tool_name TEXT,
    country TEXT,
    risk_score INTEGER NOT NULL,
    is_suspicious INTEGER NOT NULL,
    recorded_at INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    record_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_records_subject_time
    ON audit_records (subject_id, recorded_at);
CREATE TRIGGER IF NOT EXISTS audit_records_no_update
    BEFORE UPDATE ON audit_records
    BEGIN SELECT RAISE(ABORT, 'audit records are append-only'); END;
CREATE TRIGGER IF NOT EXISTS audit_records_no_delete
    BEFORE DELETE ON audit_records
    BEGIN SELECT RAISE(ABORT, 'audit records are append-only'); END;
";

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed append-only audit store.
#[derive(Clone)]
pub struct SqliteAuditStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteAuditStore {
    /// Opens or creates an audit store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let mut connection = open_writable(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Returns the most recent records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when records cannot be read or decoded.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, SqliteStoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let guard = self.lock()?;
        let mut stmt =
            guard.prepare("SELECT record_json FROM audit_records ORDER BY seq DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit], |row| row.get::<_, String>(0))?;
        let mut records = Vec::new();
        for json in rows {
            let record = serde_json::from_str(&json?)
                .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Returns the number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the count query fails.
    pub fn count(&self) -> Result<u64, SqliteStoreError> {
        let guard = self.lock()?;
        let count: i64 = guard.query_row("SELECT COUNT(*) FROM audit_records", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Inserts one record.
    fn insert(&self, record: &AuditRecord) -> Result<(), SqliteStoreError> {
        let record_json =
            serde_json::to_string(record).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let timestamp = record
            .timestamp
            .format(&Rfc3339)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let guard = self.lock()?;
        guard.execute(
            "INSERT INTO audit_records (
                id, subject_id, action, is_denial, access_granted, is_phi_access, tool_name,
                country, risk_score, is_suspicious, recorded_at, timestamp, record_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.id.to_string(),
                record.subject_id.as_str(),
                record.action.as_str(),
                record.action.is_denial(),
                record.access_granted,
                record.is_phi_access,
                record.tool_name.map(|tool| tool.as_str()),
                record.location.country.as_deref(),
                i64::from(record.risk_score),
                record.is_suspicious,
                record.timestamp.unix_timestamp(),
                timestamp,
                record_json,
            ],
        )?;
        Ok(())
    }
}

impl AuditStore for SqliteAuditStore {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditStoreError> {
        self.insert(record).map_err(|err| match err {
            SqliteStoreError::Invalid(message) => AuditStoreError::Rejected(message),
            SqliteStoreError::Io(message) => AuditStoreError::Io(message),
            other => AuditStoreError::Unavailable(other.to_string()),
        })
    }

    fn known_countries(&self, subject: &SubjectId) -> Result<BTreeSet<String>, AuditStoreError> {
        let query = || -> Result<BTreeSet<String>, SqliteStoreError> {
            let guard = self.lock()?;
            let mut stmt = guard.prepare(
                "SELECT DISTINCT country FROM audit_records
                 WHERE subject_id = ?1 AND country IS NOT NULL AND country <> ''
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![subject.as_str(), MAX_KNOWN_COUNTRIES], |row| {
                    row.get::<_, String>(0)
                })?;
            let mut countries = BTreeSet::new();
            for country in rows {
                countries.insert(country?);
            }
            Ok(countries)
        };
        query().map_err(|err| AuditStoreError::Unavailable(err.to_string()))
    }

    fn denials_since(
        &self,
        subject: &SubjectId,
        since: OffsetDateTime,
    ) -> Result<u32, AuditStoreError> {
        let query = || -> Result<i64, SqliteStoreError> {
            let guard = self.lock()?;
            let count = guard.query_row(
                "SELECT COUNT(*) FROM audit_records
                 WHERE subject_id = ?1 AND is_denial = 1 AND recorded_at >= ?2",
                params![subject.as_str(), since.unix_timestamp()],
                |row| row.get(0),
            )?;
            Ok(count)
        };
        query()
            .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
            .map_err(|err| AuditStoreError::Unavailable(err.to_string()))
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Initializes the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(AUDIT_SCHEMA)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}
