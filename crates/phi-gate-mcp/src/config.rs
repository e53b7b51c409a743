// crates/phi-gate-mcp/src/config.rs
// ============================================================================
// Module: PHI Gate MCP Config Re-exports
// Description: Re-exports configuration types from phi-gate-config.
// Purpose: Preserve the `phi_gate_mcp::config` path for server consumers.
// Dependencies: phi-gate-config
// ============================================================================

//! ## Overview
//! Configuration types live in `phi-gate-config`; this module re-exports them
//! so server code and tests can import them alongside the transport types.

pub use phi_gate_config::*;
