// crates/phi-gate-core/src/lib.rs
// ============================================================================
// Module: PHI Gate Core Library
// Description: Public API surface for the PHI Gate mediation core.
// Purpose: Expose policy types, collaborator interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! PHI Gate core holds the policy half of clinical-data mediation: who a
//! caller is, what their role may touch, which fields they may see, and how
//! each decision is recorded. It performs no I/O; transports and storage plug
//! in through [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::AuditStore;
pub use interfaces::AuditStoreError;
pub use interfaces::FetchResult;
pub use interfaces::Record;
pub use interfaces::RecordQuery;
pub use interfaces::RecordSource;
pub use interfaces::SourceError;
pub use runtime::InMemoryAuditStore;
pub use runtime::InMemoryRecordSource;
