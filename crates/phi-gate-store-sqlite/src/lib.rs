// crates/phi-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Collaborators
// Description: SQLite-backed audit store and clinical record source.
// Purpose: Provide durable persistence for PHI Gate audit trails.
// Dependencies: phi-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides two `SQLite` collaborators:
//!
//! - [`SqliteAuditStore`] appends sealed audit records to a table whose
//!   UPDATE and DELETE paths are blocked by triggers.
//! - [`SqliteRecordSource`] opens the clinical database read-only and
//!   answers the parameterized lookups behind the tool catalog.
//!
//! Security posture: database contents are untrusted and every query binds
//! caller input as parameters.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod config;
pub mod records;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::SqliteAuditStore;
pub use config::SqliteStoreConfig;
pub use config::SqliteStoreError;
pub use config::SqliteStoreMode;
pub use config::SqliteSyncMode;
pub use records::SqliteRecordSource;
