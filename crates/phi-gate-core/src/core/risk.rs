// crates/phi-gate-core/src/core/risk.rs
// ============================================================================
// Module: Risk Scoring
// Description: Heuristic risk score for audit records.
// Purpose: Flag unusual access patterns for compliance review.
// Dependencies: serde, crate::core::tooling
// ============================================================================

//! ## Overview
//! A [`RiskPolicy`] turns observed [`RiskSignals`] into a score in
//! `[0, 100]`. Weights are fixed; thresholds and the sensitive tool list come
//! from configuration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::core::tooling::ToolName;

// ============================================================================
// SECTION: Weights
// ============================================================================

/// Added for PHI access outside business hours.
pub const OFF_HOURS_PHI_WEIGHT: u8 = 15;
/// Added for access from a country not previously seen for the subject.
pub const NEW_REGION_WEIGHT: u8 = 25;
/// Added when recent denials exceed the threshold.
pub const REPEATED_DENIAL_WEIGHT: u8 = 30;
/// Added for sensitive tools.
pub const SENSITIVE_TOOL_WEIGHT: u8 = 10;
/// Upper bound of the score.
pub const MAX_RISK_SCORE: u8 = 100;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Signals observed for one audit record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskSignals {
    /// Whether the access touched PHI.
    pub is_phi_access: bool,
    /// UTC hour of the access.
    pub hour_utc: u8,
    /// Whether the caller location is new for the subject.
    pub new_region: bool,
    /// Denied attempts by the subject inside the window.
    pub recent_denials: u32,
    /// Whether the tool is marked sensitive.
    pub sensitive_tool: bool,
}

/// Computed risk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Score in `[0, 100]`.
    pub score: u8,
    /// Whether the score exceeds the suspicious threshold.
    pub suspicious: bool,
}

/// Thresholds and tool list driving the risk heuristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskPolicy {
    /// First business hour (UTC, inclusive).
    pub business_hours_start: u8,
    /// Last business hour (UTC, inclusive).
    pub business_hours_end: u8,
    /// Lookback window for denied attempts.
    pub denial_window: Duration,
    /// Denials tolerated inside the window before scoring.
    pub denial_threshold: u32,
    /// Scores above this are suspicious.
    pub suspicious_threshold: u8,
    /// Tools that always add the sensitive weight.
    pub sensitive_tools: BTreeSet<ToolName>,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            business_hours_start: 6,
            business_hours_end: 22,
            denial_window: Duration::from_secs(3600),
            denial_threshold: 3,
            suspicious_threshold: 50,
            sensitive_tools: [ToolName::GetPatientPhi, ToolName::GetMedicalRecords]
                .into_iter()
                .collect(),
        }
    }
}

impl RiskPolicy {
    /// Returns true when `hour_utc` falls outside business hours.
    #[must_use]
    pub const fn is_off_hours(&self, hour_utc: u8) -> bool {
        hour_utc < self.business_hours_start || hour_utc > self.business_hours_end
    }

    /// Returns true when `tool` is marked sensitive.
    #[must_use]
    pub fn is_sensitive(&self, tool: Option<ToolName>) -> bool {
        tool.is_some_and(|tool| self.sensitive_tools.contains(&tool))
    }

    /// Scores a set of signals.
    #[must_use]
    pub fn assess(&self, signals: &RiskSignals) -> RiskAssessment {
        let mut score: u8 = 0;
        if signals.is_phi_access && self.is_off_hours(signals.hour_utc) {
            score = score.saturating_add(OFF_HOURS_PHI_WEIGHT);
        }
        if signals.new_region {
            score = score.saturating_add(NEW_REGION_WEIGHT);
        }
        if signals.recent_denials > self.denial_threshold {
            score = score.saturating_add(REPEATED_DENIAL_WEIGHT);
        }
        if signals.sensitive_tool {
            score = score.saturating_add(SENSITIVE_TOOL_WEIGHT);
        }
        let score = score.min(MAX_RISK_SCORE);
        RiskAssessment { score, suspicious: score > self.suspicious_threshold }
    }
}
