// crates/phi-gate-core/src/core/mod.rs
// ============================================================================
// Module: PHI Gate Core Types
// Description: Domain types and pure policy functions.
// Purpose: Group identity, authorization, redaction, tooling, and audit types.
// Dependencies: serde, serde_json, time, uuid
// ============================================================================

//! ## Overview
//! Everything in this module is deterministic and free of I/O. Tables are
//! process-wide constants and are safe to read concurrently.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod authz;
pub mod identity;
pub mod redaction;
pub mod risk;
pub mod tooling;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditAction;
pub use audit::AuditInput;
pub use audit::AuditRecord;
pub use audit::GeoLocation;
pub use authz::AccessDecision;
pub use authz::Action;
pub use authz::ResourceKind;
pub use authz::RowContext;
pub use authz::authorize;
pub use authz::authorize_tool;
pub use authz::permitted_actions;
pub use identity::Identity;
pub use identity::Role;
pub use identity::SubjectId;
pub use redaction::DataScope;
pub use redaction::RedactionRule;
pub use redaction::is_access_denied_marker;
pub use redaction::redact;
pub use redaction::redaction_rule;
pub use risk::RiskAssessment;
pub use risk::RiskPolicy;
pub use risk::RiskSignals;
pub use tooling::ToolDefinition;
pub use tooling::ToolName;
pub use tooling::string_argument;
pub use tooling::tool_catalog;
