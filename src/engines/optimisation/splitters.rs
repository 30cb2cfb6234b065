use crate::config::{WalkForwardConfig, WindowSpan};
use crate::error::{LabError, Result};
use crate::types::PriceSeries;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Train/test pair of half-open ranges; the test range starts where the
/// train range ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub index: usize,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
}

pub trait DataSplitter: Send + Sync {
    fn split(&self, series: &PriceSeries) -> Result<Vec<Window>>;
}

/// Fixed-width calendar windows advanced by a fixed step
#[derive(Debug, Clone)]
pub struct WalkForwardSplitter {
    width: WindowSpan,
    step: WindowSpan,
    train_ratio: f64,
}

impl WalkForwardSplitter {
    pub fn new(width: WindowSpan, step: WindowSpan, train_ratio: f64) -> Self {
        Self {
            width,
            step,
            train_ratio,
        }
    }

    pub fn from_config(config: &WalkForwardConfig) -> Self {
        Self::new(config.width, config.step, config.train_ratio)
    }
}

impl DataSplitter for WalkForwardSplitter {
    /// The series covers `[first, last + bar interval)`. Window `k` starts at
    /// `first + k * step` and is kept while it ends inside that period.
    fn split(&self, series: &PriceSeries) -> Result<Vec<Window>> {
        if self.width.is_zero() || self.step.is_zero() {
            return Err(LabError::Configuration(
                "Window width and step must be positive".to_string(),
            ));
        }

        let (first, last, interval) = match (
            series.first_timestamp(),
            series.last_timestamp(),
            series.bar_interval(),
        ) {
            (Some(first), Some(last), Some(interval)) => (first, last, interval),
            _ => {
                return Err(LabError::InsufficientData(format!(
                    "{} has {} bars, need at least two",
                    series.instrument(),
                    series.len()
                )))
            }
        };
        let period_end = last + interval;

        let mut windows = Vec::new();
        for k in 0u32.. {
            let Some(start) = self.step.advance(first, k) else {
                break;
            };
            let Some(end) = self.width.advance(start, 1) else {
                break;
            };
            if end > period_end {
                break;
            }

            let span_ms = (end - start).num_milliseconds() as f64;
            let split = start + Duration::milliseconds((span_ms * self.train_ratio).round() as i64);

            windows.push(Window {
                index: windows.len(),
                train_start: start,
                train_end: split,
                test_start: split,
                test_end: end,
            });
        }

        if windows.is_empty() {
            return Err(LabError::InsufficientData(format!(
                "{} spans {} to {}, shorter than one {:?} window",
                series.instrument(),
                first.date_naive(),
                last.date_naive(),
                self.width
            )));
        }

        Ok(windows)
    }
}
