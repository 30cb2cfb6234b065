use super::traits::ConfigSection;
use crate::error::{LabError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Annual rate
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
    pub var_confidence: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            periods_per_year: 252.0,
            var_confidence: 0.95,
        }
    }
}

impl ConfigSection for MetricsConfig {
    fn section_name() -> &'static str {
        "metrics"
    }

    fn validate(&self) -> Result<()> {
        if self.periods_per_year <= 0.0 {
            return Err(LabError::Configuration(
                "Periods per year must be positive".to_string(),
            ));
        }
        if self.var_confidence <= 0.0 || self.var_confidence >= 1.0 {
            return Err(LabError::Configuration(
                "VaR confidence must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}
