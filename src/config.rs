use crate::random::RandomConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_max_passes() -> usize {
    1000
}

/// Parameters of one optimization run: pass/time budgets and the label
/// sweep policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
    /// Wall-clock budget; checked between moves, never inside a cut.
    #[serde(default)]
    pub time_budget_secs: Option<f64>,
    #[serde(default)]
    pub label_order: LabelOrder,
    #[serde(default)]
    pub random: RandomConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
            time_budget_secs: None,
            label_order: LabelOrder::default(),
            random: RandomConfig::default(),
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_passes > 0, "max_passes must be > 0");
        if let Some(budget) = self.time_budget_secs {
            anyhow::ensure!(
                budget > 0.0 && budget.is_finite(),
                "time_budget_secs must be positive and finite"
            );
        }
        Ok(())
    }
}

/// Order in which labels (or label pairs) are visited within a pass. The
/// order affects the convergence path, never the monotone-energy
/// guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelOrder {
    Sequential,
    Shuffled,
}

impl Default for LabelOrder {
    fn default() -> Self {
        LabelOrder::Sequential
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleMode {
    Expansion,
    Swap,
    Hybrid,
}

impl Default for ScheduleMode {
    fn default() -> Self {
        ScheduleMode::Expansion
    }
}

fn default_problem_path() -> PathBuf {
    PathBuf::from("problem.json")
}

/// Top-level CLI run configuration, loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_problem_path")]
    pub problem_file: PathBuf,
    #[serde(default)]
    pub mode: ScheduleMode,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl RunConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.sweep.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "INFO".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_level(),
            log_path: None,
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub save_labeling: bool,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_labeling: false,
            output_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_object() {
        let sweep: SweepConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(sweep.max_passes, 1000);
        assert_eq!(sweep.label_order, LabelOrder::Sequential);
        assert!(sweep.time_budget_secs.is_none());
        assert!(sweep.validate().is_ok());

        let run: RunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(run.mode, ScheduleMode::Expansion);
        assert_eq!(run.problem_file, PathBuf::from("problem.json"));
    }

    #[test]
    fn validation_rejects_bad_budgets() {
        let mut sweep = SweepConfig::default();
        sweep.max_passes = 0;
        assert!(sweep.validate().is_err());

        let mut sweep = SweepConfig::default();
        sweep.time_budget_secs = Some(0.0);
        assert!(sweep.validate().is_err());
        sweep.time_budget_secs = Some(2.5);
        assert!(sweep.validate().is_ok());
    }

    #[test]
    fn schedule_mode_serde_names() {
        let json = serde_json::to_string(&ScheduleMode::Hybrid).unwrap();
        assert_eq!(json, "\"HYBRID\"");
    }
}
