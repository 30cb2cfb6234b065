use super::traits::ConfigSection;
use crate::engines::metrics::Objective;
use crate::error::{LabError, Result};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// Calendar length of a window or step, e.g. `{ years = 2 }` in TOML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSpan {
    Days(u32),
    Months(u32),
    Years(u32),
}

impl WindowSpan {
    pub fn is_zero(&self) -> bool {
        matches!(self, WindowSpan::Days(0) | WindowSpan::Months(0) | WindowSpan::Years(0))
    }

    /// `from` moved forward by `times` spans; None on calendar overflow
    pub fn advance(&self, from: DateTime<Utc>, times: u32) -> Option<DateTime<Utc>> {
        match *self {
            WindowSpan::Days(n) => from.checked_add_signed(Duration::days(i64::from(n) * i64::from(times))),
            WindowSpan::Months(n) => from.checked_add_months(Months::new(n.checked_mul(times)?)),
            WindowSpan::Years(n) => {
                from.checked_add_months(Months::new(n.checked_mul(12)?.checked_mul(times)?))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    pub width: WindowSpan,
    pub step: WindowSpan,
    /// Share of each window used for training
    pub train_ratio: f64,
    pub objective: Objective,
    /// Multipliers applied to each tunable parameter when building the
    /// search neighbourhood
    pub variations: Vec<f64>,
    pub parallel: bool,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            width: WindowSpan::Years(2),
            step: WindowSpan::Years(1),
            train_ratio: 0.8,
            objective: Objective::SharpeRatio,
            variations: vec![0.8, 0.9, 1.0, 1.1, 1.2],
            parallel: true,
        }
    }
}

impl ConfigSection for WalkForwardConfig {
    fn section_name() -> &'static str {
        "walk_forward"
    }

    fn validate(&self) -> Result<()> {
        if self.width.is_zero() {
            return Err(LabError::Configuration(
                "Window width must be positive".to_string(),
            ));
        }
        if self.step.is_zero() {
            return Err(LabError::Configuration(
                "Window step must be positive".to_string(),
            ));
        }
        if self.train_ratio <= 0.0 || self.train_ratio >= 1.0 {
            return Err(LabError::Configuration(
                "Train ratio must be between 0 and 1".to_string(),
            ));
        }
        if self.variations.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(LabError::Configuration(
                "Variations must be positive multipliers".to_string(),
            ));
        }
        if !self.variations.iter().any(|v| (*v - 1.0).abs() < f64::EPSILON) {
            return Err(LabError::Configuration(
                "Variations must include 1.0 so the centre is always searched".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_span_advance() {
        let start = Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            WindowSpan::Years(1).advance(start, 3),
            Some(Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            WindowSpan::Months(5).advance(start, 1),
            Some(Utc.with_ymd_and_hms(2014, 6, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(WindowSpan::Days(10).advance(start, 0), Some(start));
    }

    #[test]
    fn test_rejects_zero_width() {
        let config = WalkForwardConfig {
            width: WindowSpan::Days(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LabError::Configuration(_))));
        assert!(WalkForwardConfig::default().validate().is_ok());
    }
}
