// crates/phi-gate-core/tests/risk.rs
// ============================================================================
// Module: Risk Scoring Tests
// Description: Heuristic weights, clamping, and suspicious threshold.
// Purpose: Validate audit risk scoring against fixed signal sets.
// Dependencies: phi-gate-core
// ============================================================================

//! Risk scoring tests.

use phi_gate_core::RiskPolicy;
use phi_gate_core::RiskSignals;
use phi_gate_core::ToolName;

#[test]
fn quiet_business_hours_access_scores_zero() {
    let policy = RiskPolicy::default();
    let signals = RiskSignals { is_phi_access: true, hour_utc: 10, ..RiskSignals::default() };
    let risk = policy.assess(&signals);
    assert_eq!(risk.score, 0);
    assert!(!risk.suspicious);
}

#[test]
fn off_hours_applies_only_to_phi() {
    let policy = RiskPolicy::default();
    let phi = RiskSignals { is_phi_access: true, hour_utc: 3, ..RiskSignals::default() };
    let non_phi = RiskSignals { is_phi_access: false, hour_utc: 3, ..RiskSignals::default() };
    assert_eq!(policy.assess(&phi).score, 15);
    assert_eq!(policy.assess(&non_phi).score, 0);
}

#[test]
fn business_hour_bounds_are_inclusive() {
    let policy = RiskPolicy::default();
    assert!(policy.is_off_hours(5));
    assert!(!policy.is_off_hours(6));
    assert!(!policy.is_off_hours(22));
    assert!(policy.is_off_hours(23));
}

#[test]
fn denials_must_exceed_threshold() {
    let policy = RiskPolicy::default();
    let at = RiskSignals { recent_denials: 3, hour_utc: 12, ..RiskSignals::default() };
    let over = RiskSignals { recent_denials: 4, hour_utc: 12, ..RiskSignals::default() };
    assert_eq!(policy.assess(&at).score, 0);
    assert_eq!(policy.assess(&over).score, 30);
}

#[test]
fn all_signals_sum_and_flag_suspicious() {
    let policy = RiskPolicy::default();
    let signals = RiskSignals {
        is_phi_access: true,
        hour_utc: 2,
        new_region: true,
        recent_denials: 10,
        sensitive_tool: true,
    };
    let risk = policy.assess(&signals);
    assert_eq!(risk.score, 80);
    assert!(risk.suspicious);
}

#[test]
fn threshold_is_strictly_greater_than() {
    let policy = RiskPolicy { suspicious_threshold: 40, ..RiskPolicy::default() };
    let signals = RiskSignals {
        hour_utc: 12,
        new_region: true,
        sensitive_tool: true,
        ..RiskSignals::default()
    };
    let risk = policy.assess(&signals);
    assert_eq!(risk.score, 35);
    assert!(!risk.suspicious);
    let with_denials = RiskSignals { recent_denials: 9, ..signals };
    assert!(policy.assess(&with_denials).suspicious);
}

#[test]
fn sensitive_tools_come_from_policy() {
    let policy = RiskPolicy::default();
    assert!(policy.is_sensitive(Some(ToolName::GetPatientPhi)));
    assert!(policy.is_sensitive(Some(ToolName::GetMedicalRecords)));
    assert!(!policy.is_sensitive(Some(ToolName::GetShifts)));
    assert!(!policy.is_sensitive(None));
}
