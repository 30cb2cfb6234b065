use super::traits::ConfigSection;
use crate::error::{LabError, Result};
use serde::{Deserialize, Serialize};

/// Weights of the walk-forward composite score.
///
/// `composite = sharpe_weight * mean(OOS Sharpe)
///            - drawdown_weight * mean(max drawdown)
///            - instability_weight * parameter instability
///            - dispersion_weight * std(OOS Sharpe)
///            - low_trade_penalty (when mean trades < min_trades)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub sharpe_weight: f64,
    pub drawdown_weight: f64,
    pub instability_weight: f64,
    pub dispersion_weight: f64,
    pub low_trade_penalty: f64,
    pub min_trades: f64,
    /// Infinite Sharpe values are clamped to +/- this before averaging
    pub ratio_cap: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            sharpe_weight: 1.0,
            drawdown_weight: 1.0,
            instability_weight: 0.5,
            dispersion_weight: 0.25,
            low_trade_penalty: 0.5,
            min_trades: 3.0,
            ratio_cap: 10.0,
        }
    }
}

impl ConfigSection for ScoringConfig {
    fn section_name() -> &'static str {
        "scoring"
    }

    fn validate(&self) -> Result<()> {
        let weights = [
            ("sharpe_weight", self.sharpe_weight),
            ("drawdown_weight", self.drawdown_weight),
            ("instability_weight", self.instability_weight),
            ("dispersion_weight", self.dispersion_weight),
            ("low_trade_penalty", self.low_trade_penalty),
            ("min_trades", self.min_trades),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(LabError::Configuration(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }
        if !self.ratio_cap.is_finite() || self.ratio_cap <= 0.0 {
            return Err(LabError::Configuration(
                "Ratio cap must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
