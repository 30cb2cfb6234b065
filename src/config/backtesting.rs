use super::traits::ConfigSection;
use crate::error::{LabError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestingConfig {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_cash: f64,
    /// Fraction of traded notional charged on entry and on exit
    pub commission: f64,
    /// Share of equity committed per position unless a strategy overrides it
    pub position_fraction: f64,
    pub instruments: Vec<String>,
}

impl Default for BacktestingConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            initial_cash: 10000.0,
            commission: 0.001,
            position_fraction: 1.0,
            instruments: vec!["SPY".to_string()],
        }
    }
}

impl ConfigSection for BacktestingConfig {
    fn section_name() -> &'static str {
        "backtesting"
    }

    fn validate(&self) -> Result<()> {
        if self.initial_cash <= 0.0 {
            return Err(LabError::Configuration(
                "Initial cash must be positive".to_string(),
            ));
        }
        if self.commission < 0.0 {
            return Err(LabError::Configuration(
                "Commission cannot be negative".to_string(),
            ));
        }
        if self.position_fraction <= 0.0 || self.position_fraction > 1.0 {
            return Err(LabError::Configuration(
                "Position fraction must be in (0, 1]".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return Err(LabError::Configuration(format!(
                    "Start date {} must precede end date {}",
                    start, end
                )));
            }
        }
        if self.instruments.is_empty() {
            return Err(LabError::Configuration(
                "At least one instrument is required".to_string(),
            ));
        }
        Ok(())
    }
}
