use crate::error::{LabError, Result};
use crate::types::PriceSeries;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Source of price history.
///
/// `fetch` returns bars with `start <= timestamp < end` (open bounds when
/// `None`) and fails with `LabError::DataUnavailable` on missing or invalid
/// data. Callers treat that as fatal for the instrument only.
pub trait DataProvider: Send + Sync {
    fn fetch(
        &self,
        instrument: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<PriceSeries>;
}

/// Provider over series already held in memory
#[derive(Default)]
pub struct InMemoryProvider {
    series: HashMap<String, PriceSeries>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.insert(series);
        self
    }

    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.instrument().to_string(), series);
    }
}

impl DataProvider for InMemoryProvider {
    fn fetch(
        &self,
        instrument: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<PriceSeries> {
        let series = self
            .series
            .get(instrument)
            .ok_or_else(|| LabError::DataUnavailable {
                instrument: instrument.to_string(),
                reason: "not loaded".to_string(),
            })?;
        restrict(series, start, end)
    }
}

/// Copy of `series` limited to `[start, end)`; empty results are unavailable
pub(crate) fn restrict(
    series: &PriceSeries,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<PriceSeries> {
    let bars = match (start, end) {
        (None, None) => series.bars(),
        (start, end) => series.slice(
            start.unwrap_or(DateTime::<Utc>::MIN_UTC),
            end.unwrap_or(DateTime::<Utc>::MAX_UTC),
        ),
    };

    if bars.is_empty() {
        return Err(LabError::DataUnavailable {
            instrument: series.instrument().to_string(),
            reason: "no bars in requested range".to_string(),
        });
    }

    PriceSeries::new(series.instrument(), bars.to_vec())
}
