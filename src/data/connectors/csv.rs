use super::{types::RequiredColumn, validator::DataValidator};
use crate::data::provider::{restrict, DataProvider};
use crate::error::{LabError, Result};
use crate::types::{Bar, PriceSeries};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use std::path::{Path, PathBuf};

pub struct CsvConnector;

impl CsvConnector {
    /// Load CSV file into DataFrame
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()?;

        Ok(df)
    }

    /// Load, validate and convert a CSV file into bars sorted by time.
    /// Rows with a missing value are dropped with a warning.
    pub fn load_bars<P: AsRef<Path>>(path: P) -> Result<Vec<Bar>> {
        let df = Self::load(&path)?;
        DataValidator::validate_minimum_rows(&df, 1)?;
        let column_map = DataValidator::validate_ohlcv(&df)?;

        let null_report = DataValidator::check_nulls(&df);
        if !null_report.is_empty() {
            log::warn!(
                "Null values in {}: {:?}",
                path.as_ref().display(),
                null_report
            );
        }

        let name = |which: RequiredColumn| -> Result<&str> {
            column_map
                .get(&which)
                .map(String::as_str)
                .ok_or_else(|| LabError::Validation(format!("Missing column {}", which.as_str())))
        };

        let timestamps = Self::timestamps(df.column(name(RequiredColumn::Timestamp)?)?)?;
        let numeric = |which: RequiredColumn| -> Result<Vec<Option<f64>>> {
            let column = df.column(name(which)?)?.cast(&DataType::Float64)?;
            Ok(column.f64()?.into_iter().collect())
        };
        let open = numeric(RequiredColumn::Open)?;
        let high = numeric(RequiredColumn::High)?;
        let low = numeric(RequiredColumn::Low)?;
        let close = numeric(RequiredColumn::Close)?;
        let volume = numeric(RequiredColumn::Volume)?;

        let mut bars = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            if let (Some(timestamp), Some(open), Some(high), Some(low), Some(close), Some(volume)) =
                (timestamps[i], open[i], high[i], low[i], close[i], volume[i])
            {
                bars.push(Bar {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume,
                });
            }
        }

        let dropped = df.height() - bars.len();
        if dropped > 0 {
            log::warn!("Dropped {} incomplete rows from {}", dropped, path.as_ref().display());
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }

    fn timestamps(column: &Column) -> Result<Vec<Option<DateTime<Utc>>>> {
        match column.dtype() {
            DataType::String => column
                .str()?
                .into_iter()
                .map(|value| value.map(parse_timestamp).transpose())
                .collect(),
            DataType::Int64 | DataType::Int32 | DataType::UInt64 | DataType::UInt32 => {
                let column = column.cast(&DataType::Int64)?;
                column
                    .i64()?
                    .into_iter()
                    .map(|value| value.map(from_epoch).transpose())
                    .collect()
            }
            other => Err(LabError::Validation(format!(
                "Unsupported timestamp column type {:?}",
                other
            ))),
        }
    }
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` or a plain `YYYY-MM-DD` date (UTC midnight)
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts.and_utc());
        }
    }
    Err(LabError::Validation(format!("Unparseable timestamp '{}'", value)))
}

/// Epoch seconds, or milliseconds for values too large to be seconds
fn from_epoch(value: i64) -> Result<DateTime<Utc>> {
    let ts = if value.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    };
    ts.ok_or_else(|| LabError::Validation(format!("Invalid epoch timestamp {}", value)))
}

/// Reads `<dir>/<instrument>.csv`
pub struct CsvDataProvider {
    dir: PathBuf,
}

impl CsvDataProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, instrument: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", instrument))
    }
}

impl DataProvider for CsvDataProvider {
    fn fetch(
        &self,
        instrument: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<PriceSeries> {
        let unavailable = |reason: String| LabError::DataUnavailable {
            instrument: instrument.to_string(),
            reason,
        };

        let path = self.path_for(instrument);
        if !path.exists() {
            return Err(unavailable(format!("{} not found", path.display())));
        }

        let bars = CsvConnector::load_bars(&path).map_err(|e| unavailable(e.to_string()))?;
        let series = PriceSeries::new(instrument, bars).map_err(|e| unavailable(e.to_string()))?;
        restrict(&series, start, end)
    }
}
