use crate::energy::EnergyBreakdown;
use crate::schema::{Cost, LabelId, SiteId};
use serde::{Deserialize, Serialize};

/// Outcome of a full optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub final_energy: Cost,
    pub status: RunStatus,
    pub passes: usize,
    pub breakdown: EnergyBreakdown,
    pub diagnostics: RunDiagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// A complete pass produced zero relabelings.
    Converged,
    /// The pass limit ran out before a zero-change pass.
    PassLimitReached,
    /// The wall-clock budget ran out between moves.
    TimeBudgetExhausted,
}

impl RunStatus {
    pub fn converged(&self) -> bool {
        matches!(self, RunStatus::Converged)
    }
}

/// Best-effort runtime record: soft failures are collected here instead of
/// aborting the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Total energy after each completed pass.
    pub energy_trace: Vec<Cost>,
    pub moves_applied: usize,
    pub moves_no_change: usize,
    /// Moves skipped because a cost pair broke the binary-movability
    /// condition.
    pub moves_skipped: usize,
    /// Moves whose cut would have raised the exact energy; rolled back.
    pub moves_rejected: usize,
    pub relabeled_sites: usize,
    /// Cost or capacity terms clamped at the energy-term cap.
    pub clamp_warnings: u64,
    pub submodularity_violations: Vec<SubmodularityViolation>,
}

impl RunDiagnostics {
    pub fn record_violation(&mut self, violation: SubmodularityViolation) {
        self.moves_skipped += 1;
        self.submodularity_violations.push(violation);
    }
}

/// One smooth-cost pair that failed the expansion/swap reduction condition,
/// identified by the move labels and the offending neighbor pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmodularityViolation {
    pub alpha: LabelId,
    /// Second move label for swap moves; None for expansion.
    pub beta: Option<LabelId>,
    pub site_a: SiteId,
    pub site_b: SiteId,
    pub label_a: LabelId,
    pub label_b: LabelId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_violation_counts_skip() {
        let mut diag = RunDiagnostics::default();
        diag.record_violation(SubmodularityViolation {
            alpha: 2,
            beta: None,
            site_a: 0,
            site_b: 1,
            label_a: 0,
            label_b: 1,
        });
        assert_eq!(diag.moves_skipped, 1);
        assert_eq!(diag.submodularity_violations.len(), 1);
    }

    #[test]
    fn status_round_trips_through_serde() {
        let json = serde_json::to_string(&RunStatus::TimeBudgetExhausted).unwrap();
        assert_eq!(json, "\"TIME_BUDGET_EXHAUSTED\"");
        let back: RunStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RunStatus::TimeBudgetExhausted);
        assert!(!back.converged());
    }
}
