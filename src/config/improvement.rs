use super::traits::ConfigSection;
use crate::error::{LabError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How a promotion takes effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Stage the change as a reviewable artifact; the active baseline is untouched
    #[default]
    Validation,
    /// Make the promoted record the active baseline immediately
    Adoption,
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::Validation => f.write_str("validation"),
            OperatingMode::Adoption => f.write_str("adoption"),
        }
    }
}

/// Thresholds of the improvement loop.
///
/// None of these have a derivable "right" value; the defaults below are
/// starting points and are expected to be tuned per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImprovementConfig {
    /// Required composite gain over the baseline (inclusive)
    pub min_improvement_margin: f64,
    /// Relative tolerance under which two proposals count as the same change
    pub similarity_tolerance: f64,
    /// How many trailing ledger records of a strategy are checked for repeats
    pub duplicate_lookback: usize,
    pub max_proposals_per_cycle: usize,
    pub mode: OperatingMode,
    /// Allowed composite drop on re-validation before rolling back
    pub rollback_tolerance: f64,
    /// Candidates with more degraded windows than this are not comparable
    pub max_degraded_windows: usize,
    pub history_path: PathBuf,
    /// Seed for the perturbation proposer
    pub seed: u64,
}

impl Default for ImprovementConfig {
    fn default() -> Self {
        Self {
            min_improvement_margin: 0.05,
            similarity_tolerance: 0.01,
            duplicate_lookback: 50,
            max_proposals_per_cycle: 3,
            mode: OperatingMode::Validation,
            rollback_tolerance: 0.1,
            max_degraded_windows: 0,
            history_path: PathBuf::from("results/improvement_history.jsonl"),
            seed: 42,
        }
    }
}

impl ConfigSection for ImprovementConfig {
    fn section_name() -> &'static str {
        "improvement"
    }

    fn validate(&self) -> Result<()> {
        if !self.min_improvement_margin.is_finite() || self.min_improvement_margin < 0.0 {
            return Err(LabError::Configuration(
                "Improvement margin must be a non-negative number".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.similarity_tolerance) {
            return Err(LabError::Configuration(
                "Similarity tolerance must be in [0, 1)".to_string(),
            ));
        }
        if self.max_proposals_per_cycle == 0 {
            return Err(LabError::Configuration(
                "At least one proposal per cycle is required".to_string(),
            ));
        }
        if !self.rollback_tolerance.is_finite() || self.rollback_tolerance < 0.0 {
            return Err(LabError::Configuration(
                "Rollback tolerance must be a non-negative number".to_string(),
            ));
        }
        if self.history_path.as_os_str().is_empty() {
            return Err(LabError::Configuration(
                "History path is empty".to_string(),
            ));
        }
        Ok(())
    }
}
