use super::trend::ema;
use anyhow::{bail, Result};

/// Wilder RSI
pub fn rsi(close: &[f64], period: usize) -> Result<Vec<f64>> {
    if period == 0 {
        bail!("RSI: period must be positive");
    }

    let mut out = vec![f64::NAN; close.len()];
    if close.len() <= period {
        return Ok(out);
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = close[i] - close[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    for i in (period + 1)..close.len() {
        let change = close[i] - close[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }

    Ok(out)
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(close: &[f64], fast: usize, slow: usize, signal: usize) -> Result<Macd> {
    if fast >= slow {
        bail!("MACD: fast period ({}) must be below slow period ({})", fast, slow);
    }

    let fast_ema = ema(close, fast)?;
    let slow_ema = ema(close, slow)?;
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();

    // Signal EMA runs over the defined part of the MACD line only
    let first = line.iter().position(|v| v.is_finite()).unwrap_or(line.len());
    let mut signal_line = vec![f64::NAN; line.len()];
    let tail = ema(&line[first..], signal)?;
    signal_line[first..].copy_from_slice(&tail);

    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(l, s)| l - s)
        .collect();

    Ok(Macd {
        line,
        signal: signal_line,
        histogram,
    })
}
