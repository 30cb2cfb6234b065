use super::types::RequiredColumn;
use crate::error::{LabError, Result};
use polars::prelude::*;
use std::collections::HashMap;

/// Structural checks on a raw price frame before it becomes bars
pub struct DataValidator;

impl DataValidator {
    /// Map every required field to its header in `df`. Price and volume
    /// columns must be numeric and every complete row must have
    /// `low <= open, close <= high`.
    pub fn validate_ohlcv(df: &DataFrame) -> Result<HashMap<RequiredColumn, String>> {
        let headers: Vec<&str> = df.get_column_names().into_iter().map(|c| c.as_str()).collect();

        let mut column_map = HashMap::with_capacity(RequiredColumn::ALL.len());
        for field in RequiredColumn::ALL {
            let header = field
                .headers()
                .iter()
                .find_map(|wanted| headers.iter().find(|h| h.trim().eq_ignore_ascii_case(wanted)))
                .ok_or_else(|| {
                    LabError::Validation(format!(
                        "No {} column; expected one of {:?}, found {:?}",
                        field.as_str(),
                        field.headers(),
                        headers
                    ))
                })?;
            column_map.insert(field, header.to_string());
        }

        for (field, header) in column_map.iter().filter(|(f, _)| **f != RequiredColumn::Timestamp) {
            let dtype = df.column(header)?.dtype().clone();
            if !matches!(
                dtype,
                DataType::Float64 | DataType::Float32 | DataType::Int64 | DataType::Int32 | DataType::UInt64 | DataType::UInt32
            ) {
                return Err(LabError::Validation(format!(
                    "{} column '{}' is {:?}, not numeric",
                    field.as_str(),
                    header,
                    dtype
                )));
            }
        }

        Self::check_price_ranges(df, &column_map)?;
        Ok(column_map)
    }

    /// Rejects the frame if any complete row has a bar range that does not
    /// contain its open and close, reporting the count and first offender
    fn check_price_ranges(df: &DataFrame, column_map: &HashMap<RequiredColumn, String>) -> Result<()> {
        let series = |field: RequiredColumn| -> Result<Column> {
            let header = column_map
                .get(&field)
                .ok_or_else(|| LabError::Validation(format!("No {} column", field.as_str())))?;
            Ok(df.column(header)?.cast(&DataType::Float64)?)
        };
        let (open, high, low, close) = (
            series(RequiredColumn::Open)?,
            series(RequiredColumn::High)?,
            series(RequiredColumn::Low)?,
            series(RequiredColumn::Close)?,
        );
        let (open, high, low, close) = (open.f64()?, high.f64()?, low.f64()?, close.f64()?);

        let mut first_bad = None;
        let mut bad_rows = 0usize;
        for row in 0..df.height() {
            let (Some(o), Some(h), Some(l), Some(c)) = (open.get(row), high.get(row), low.get(row), close.get(row)) else {
                continue;
            };
            if l > h || o > h || c > h || o < l || c < l {
                bad_rows += 1;
                first_bad.get_or_insert((row, o, h, l, c));
            }
        }

        match first_bad {
            None => Ok(()),
            Some((row, o, h, l, c)) => Err(LabError::Validation(format!(
                "{} row(s) with prices outside the bar range, first at row {}: open {} high {} low {} close {}",
                bad_rows, row, o, h, l, c
            ))),
        }
    }

    pub fn validate_minimum_rows(df: &DataFrame, min_rows: usize) -> Result<()> {
        if df.height() < min_rows {
            return Err(LabError::Validation(format!(
                "{} data row(s), at least {} needed",
                df.height(),
                min_rows
            )));
        }
        Ok(())
    }

    /// Null count per column, for columns that have any
    pub fn check_nulls(df: &DataFrame) -> Vec<(String, usize)> {
        df.get_columns()
            .iter()
            .filter_map(|c| {
                let nulls = c.null_count();
                (nulls > 0).then(|| (c.name().to_string(), nulls))
            })
            .collect()
    }
}
