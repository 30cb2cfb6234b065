use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LabError, Result};

/// One OHLCV record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered, immutable price history for one instrument.
///
/// Timestamps are strictly increasing. The series is built once by a data
/// provider and only borrowed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    instrument: String,
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(instrument: impl Into<String>, bars: Vec<Bar>) -> Result<Self> {
        let instrument = instrument.into();
        if instrument.is_empty() {
            return Err(LabError::Validation("Instrument name is empty".to_string()));
        }

        for (i, pair) in bars.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(LabError::Validation(format!(
                    "Timestamps not strictly increasing at row {} ({} then {})",
                    i + 1,
                    pair[0].timestamp,
                    pair[1].timestamp
                )));
            }
        }

        Ok(Self { instrument, bars })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.first().map(|b| b.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.timestamp)
    }

    /// Bars with `start <= timestamp < end`
    pub fn slice(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[Bar] {
        let lo = self.bars.partition_point(|b| b.timestamp < start);
        let hi = self.bars.partition_point(|b| b.timestamp < end);
        if lo >= hi {
            return &[];
        }
        &self.bars[lo..hi]
    }

    /// Bars of `[start, end)` preceded by up to `history` earlier bars, and
    /// the index of the first bar at or after `start` within that slice
    pub fn slice_with_history(&self, start: DateTime<Utc>, end: DateTime<Utc>, history: usize) -> (&[Bar], usize) {
        let lo = self.bars.partition_point(|b| b.timestamp < start);
        let hi = self.bars.partition_point(|b| b.timestamp < end);
        if lo >= hi {
            return (&[], 0);
        }
        let from = lo.saturating_sub(history);
        (&self.bars[from..hi], lo - from)
    }

    /// Smallest positive spacing between consecutive bars
    pub fn bar_interval(&self) -> Option<chrono::Duration> {
        self.bars
            .windows(2)
            .map(|w| w[1].timestamp - w[0].timestamp)
            .min()
    }
}

/// A single strategy parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Flag(bool),
    Int(i64),
    Float(f64),
    Choice(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ParamValue::Int(_) | ParamValue::Float(_))
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Flag(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Choice(v) => write!(f, "{}", v),
        }
    }
}

/// Parameter name -> value. Value equality means "same configuration".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, ParamValue>);

impl ParameterSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_f64(&self, name: &str, default: f64) -> f64 {
        self.get(name).and_then(ParamValue::as_f64).unwrap_or(default)
    }

    /// Integer lookup; floats are rounded, missing or negative values fall back.
    pub fn get_usize(&self, name: &str, default: usize) -> usize {
        match self.get(name).and_then(ParamValue::as_f64) {
            Some(v) if v >= 0.0 => v.round() as usize,
            _ => default,
        }
    }

    pub fn get_flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(ParamValue::Flag(true)))
    }

    /// Copy of `self` with every entry of `changes` applied on top
    pub fn merged(&self, changes: &ParameterSet) -> ParameterSet {
        let mut out = self.clone();
        for (k, v) in changes.iter() {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    /// Entries of `self` that are absent from or differ in `base`
    pub fn diff(&self, base: &ParameterSet) -> ParameterSet {
        let mut out = ParameterSet::new();
        for (k, v) in self.iter() {
            if base.get(k) != Some(v) {
                out.0.insert(k.clone(), v.clone());
            }
        }
        out
    }

    /// Sum of per-key distances: relative difference for numbers, 1 for any
    /// other mismatch (including keys present on one side only).
    pub fn distance(&self, other: &ParameterSet) -> f64 {
        let mut keys: Vec<&String> = self.keys().chain(other.keys()).collect();
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .map(|k| match (self.get(k), other.get(k)) {
                (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => relative_difference(x, y),
                    _ if a == b => 0.0,
                    _ => 1.0,
                },
                _ => 1.0,
            })
            .sum()
    }

    /// Deterministic serialization used for hashing and ordering
    pub fn canonical_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// `|a - b| / max(|a|, |b|)`, zero when both are zero
pub fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        ((a - b).abs() / scale).min(1.0)
    }
}

/// Parameter metadata published by a strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub default: ParamValue,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub tunable: bool,
}

impl ParamSpec {
    pub fn int(name: &str, default: i64, min: i64, max: i64) -> Self {
        Self {
            name: name.to_string(),
            default: ParamValue::Int(default),
            min: Some(min as f64),
            max: Some(max as f64),
            tunable: true,
        }
    }

    pub fn float(name: &str, default: f64, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            default: ParamValue::Float(default),
            min: Some(min),
            max: Some(max),
            tunable: true,
        }
    }

    pub fn fixed(mut self) -> Self {
        self.tunable = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Long,
    Short,
    Flat,
}

/// Target position change at a bar index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub bar: usize,
    pub target: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal,
    EndOfData,
}

/// Trade record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub direction: Direction,
    pub size: f64,
    pub profit: f64,
    pub exit_reason: ExitReason,
    pub fees: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

/// Output of one simulation over a slice of bars
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

/// Serde representation for metric values that may be infinite or NaN.
///
/// JSON has no literal for those, so non-finite values are written as the
/// strings `"inf"`, `"-inf"` and `"NaN"`. `null` reads back as NaN.
pub mod float_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
        Null(()),
    }

    fn decode(repr: Repr) -> Result<f64, String> {
        match repr {
            Repr::Number(v) => Ok(v),
            Repr::Null(()) => Ok(f64::NAN),
            Repr::Text(s) => match s.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "NaN" => Ok(f64::NAN),
                other => Err(format!("invalid metric value '{}'", other)),
            },
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        decode(Repr::deserialize(deserializer)?).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::{decode, Repr};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
            match Option::<Repr>::deserialize(deserializer)? {
                Some(repr) => decode(repr).map(Some).map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2020, 1, day, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let result = PriceSeries::new("X", vec![bar(2, 1.0), bar(1, 1.0)]);
        assert!(result.is_err());

        let result = PriceSeries::new("X", vec![bar(1, 1.0), bar(1, 2.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_slice_is_half_open() {
        let series = PriceSeries::new("X", (1..=10).map(|d| bar(d, d as f64)).collect()).unwrap();
        let start = Utc.with_ymd_and_hms(2020, 1, 3, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 1, 6, 0, 0, 0).unwrap();

        let slice = series.slice(start, end);
        assert_eq!(slice.len(), 3);
        assert_eq!(slice[0].close, 3.0);
        assert_eq!(slice[2].close, 5.0);
        assert!(series.slice(end, start).is_empty());
    }

    #[test]
    fn test_slice_with_history_stops_at_series_start() {
        let series = PriceSeries::new("X", (1..=10).map(|d| bar(d, d as f64)).collect()).unwrap();
        let start = Utc.with_ymd_and_hms(2020, 1, 5, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 1, 8, 0, 0, 0).unwrap();

        let (bars, offset) = series.slice_with_history(start, end, 2);
        assert_eq!((bars.len(), offset), (5, 2));
        assert_eq!(bars[offset].close, 5.0);
        assert_eq!(bars.last().map(|b| b.close), Some(7.0));

        let (bars, offset) = series.slice_with_history(start, end, 100);
        assert_eq!((bars.len(), offset), (7, 4));
        assert_eq!(bars[0].close, 1.0);

        assert_eq!(series.slice_with_history(end, start, 2).0.len(), 0);
    }

    #[test]
    fn test_diff_and_merge() {
        let base = ParameterSet::new()
            .with("n_fast", ParamValue::Int(10))
            .with("n_slow", ParamValue::Int(20));
        let changes = ParameterSet::new().with("n_fast", ParamValue::Int(12));

        let merged = base.merged(&changes);
        assert_eq!(merged.get("n_fast"), Some(&ParamValue::Int(12)));
        assert_eq!(merged.diff(&base), changes);
        assert!(base.diff(&base).is_empty());
    }

    #[test]
    fn test_distance() {
        let a = ParameterSet::new().with("p", ParamValue::Int(10));
        let b = ParameterSet::new().with("p", ParamValue::Int(20));
        assert!((a.distance(&b) - 0.5).abs() < 1e-12);
        assert_eq!(a.distance(&a), 0.0);

        let c = ParameterSet::new().with("mode", ParamValue::Choice("fast".into()));
        assert_eq!(a.distance(&c), 2.0);
    }

    #[derive(Serialize, Deserialize)]
    struct Wrapped {
        #[serde(with = "float_repr")]
        value: f64,
    }

    #[test]
    fn test_non_finite_metrics_survive_json() {
        let text = serde_json::to_string(&Wrapped { value: f64::INFINITY }).unwrap();
        assert_eq!(text, r#"{"value":"inf"}"#);
        let back: Wrapped = serde_json::from_str(&text).unwrap();
        assert_eq!(back.value, f64::INFINITY);

        let back: Wrapped = serde_json::from_str(r#"{"value":"NaN"}"#).unwrap();
        assert!(back.value.is_nan());
    }

    #[test]
    fn test_canonical_string_is_order_independent() {
        let a = ParameterSet::new()
            .with("b", ParamValue::Int(1))
            .with("a", ParamValue::Float(0.5));
        let b = ParameterSet::new()
            .with("a", ParamValue::Float(0.5))
            .with("b", ParamValue::Int(1));
        assert_eq!(a.canonical_string(), b.canonical_string());
    }
}
