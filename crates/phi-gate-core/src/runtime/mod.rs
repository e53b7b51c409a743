// crates/phi-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: PHI Gate Runtime Helpers
// Description: Reference collaborator implementations.
// Purpose: Expose in-memory stores for tests and local runs.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! Runtime helpers implement the core interfaces without external services.

pub mod memory;

pub use memory::InMemoryAuditStore;
pub use memory::InMemoryRecordSource;
