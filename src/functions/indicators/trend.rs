use anyhow::{bail, Result};

/// Simple moving average
pub fn sma(values: &[f64], period: usize) -> Result<Vec<f64>> {
    if period == 0 {
        bail!("SMA: period must be positive");
    }

    let mut out = vec![f64::NAN; values.len()];
    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 >= period {
            out[i] = sum / period as f64;
        }
    }
    Ok(out)
}

/// Exponential moving average seeded with the SMA of the first `period` values
pub fn ema(values: &[f64], period: usize) -> Result<Vec<f64>> {
    if period == 0 {
        bail!("EMA: period must be positive");
    }

    let mut out = vec![f64::NAN; values.len()];
    if values.len() < period {
        return Ok(out);
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    let mut prev = seed;
    for i in period..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    Ok(out)
}

/// Highest value over the trailing `period` values (current included)
pub fn rolling_max(values: &[f64], period: usize) -> Result<Vec<f64>> {
    rolling_extreme(values, period, f64::max, "rolling_max")
}

/// Lowest value over the trailing `period` values (current included)
pub fn rolling_min(values: &[f64], period: usize) -> Result<Vec<f64>> {
    rolling_extreme(values, period, f64::min, "rolling_min")
}

fn rolling_extreme(
    values: &[f64],
    period: usize,
    pick: fn(f64, f64) -> f64,
    name: &str,
) -> Result<Vec<f64>> {
    if period == 0 {
        bail!("{}: period must be positive", name);
    }

    let mut out = vec![f64::NAN; values.len()];
    for i in (period - 1)..values.len() {
        out[i] = values[i + 1 - period..=i]
            .iter()
            .copied()
            .fold(values[i], pick);
    }
    Ok(out)
}
