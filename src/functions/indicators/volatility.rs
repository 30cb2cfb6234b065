use super::trend::{ema, sma};
use crate::types::Bar;
use anyhow::{bail, Result};

pub struct Bands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Population standard deviation over a trailing window
pub fn rolling_std(values: &[f64], period: usize) -> Result<Vec<f64>> {
    let mean = sma(values, period)?;
    let mut out = vec![f64::NAN; values.len()];
    for i in (period - 1)..values.len() {
        let m = mean[i];
        let var = values[i + 1 - period..=i]
            .iter()
            .map(|v| (v - m).powi(2))
            .sum::<f64>()
            / period as f64;
        out[i] = var.sqrt();
    }
    Ok(out)
}

pub fn bollinger(close: &[f64], period: usize, width: f64) -> Result<Bands> {
    if width <= 0.0 {
        bail!("Bollinger: width must be positive");
    }
    let middle = sma(close, period)?;
    let std = rolling_std(close, period)?;

    Ok(Bands {
        upper: middle.iter().zip(&std).map(|(m, s)| m + width * s).collect(),
        lower: middle.iter().zip(&std).map(|(m, s)| m - width * s).collect(),
        middle,
    })
}

/// Average true range (simple mean of true range)
pub fn atr(bars: &[Bar], period: usize) -> Result<Vec<f64>> {
    let true_range: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let prev_close = if i == 0 { b.close } else { bars[i - 1].close };
            (b.high - b.low)
                .max((b.high - prev_close).abs())
                .max((b.low - prev_close).abs())
        })
        .collect();
    sma(&true_range, period)
}

/// EMA centre line with ATR-scaled envelopes
pub fn keltner(bars: &[Bar], period: usize, multiplier: f64) -> Result<Bands> {
    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let middle = ema(&close, period)?;
    let range = atr(bars, period)?;

    Ok(Bands {
        upper: middle.iter().zip(&range).map(|(m, r)| m + multiplier * r).collect(),
        lower: middle.iter().zip(&range).map(|(m, r)| m - multiplier * r).collect(),
        middle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let close = vec![10.0; 25];
        let bands = bollinger(&close, 20, 2.0).unwrap();
        assert_eq!(bands.upper[24], 10.0);
        assert_eq!(bands.lower[24], 10.0);
    }

    #[test]
    fn test_atr_constant_range() {
        let bars: Vec<Bar> = (0..10)
            .map(|i| Bar {
                timestamp: Utc.timestamp_opt(i * 86_400, 0).unwrap(),
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.0,
                volume: 1.0,
            })
            .collect();
        let out = atr(&bars, 5).unwrap();
        assert!(out[3].is_nan());
        assert!((out[9] - 2.0).abs() < 1e-12);
    }
}
