use super::int;
use crate::functions::indicators::{atr, bollinger, keltner, rolling_max, rolling_min, sma};
use crate::functions::strategy::{closes, volumes, EntryGate, SignalBuilder, Strategy};
use crate::types::{Bar, ParamSpec, ParameterSet, Position, Signal};
use anyhow::Result;

/// Channel breakout with a channel/ATR protective stop
pub struct DonchianChannel;

const DONCHIAN_ATR_PERIOD: usize = 20;

impl Strategy for DonchianChannel {
    fn name(&self) -> &'static str {
        "DonchianChannel"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("channel_period", 55, 5, 200),
            ParamSpec::int("stop_period", 20, 2, 100),
            ParamSpec::float("atr_multiplier", 2.0, 0.5, 6.0),
        ]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "channel_period", 55) + 1)
            .max(int(params, "stop_period", 20) + 1)
            .max(DONCHIAN_ATR_PERIOD)
            .max(EntryGate::lookback(params))
    }

    fn validate_parameters(&self, params: &ParameterSet) -> bool {
        int(params, "stop_period", 20) <= int(params, "channel_period", 55)
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let close = closes(bars);
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
        let channel = int(params, "channel_period", 55);
        let upper = rolling_max(&highs, channel)?;
        let lower = rolling_min(&lows, channel)?;
        let stop_lower = rolling_min(&lows, int(params, "stop_period", 20))?;
        let range = atr(bars, DONCHIAN_ATR_PERIOD)?;
        let multiplier = params.get_f64("atr_multiplier", 2.0);
        let gate = EntryGate::from_params(bars, params)?;

        let mut builder = SignalBuilder::new();
        let mut stop = f64::NEG_INFINITY;

        for i in 1..bars.len() {
            if builder.is_flat() {
                if upper[i - 1].is_finite()
                    && close[i] > upper[i - 1]
                    && gate.allows(i, Position::Long)
                {
                    builder.set(i, Position::Long);
                    stop = stop_lower[i].min(close[i] - multiplier * range[i]);
                }
            } else if close[i] < lower[i - 1] || close[i] <= stop {
                builder.set(i, Position::Flat);
            }
        }

        Ok(builder.finish())
    }
}

/// Re-entry into the band after a close below the lower Bollinger band
pub struct BollingerBands;

impl Strategy for BollingerBands {
    fn name(&self) -> &'static str {
        "BollingerBands"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("bb_period", 20, 5, 100),
            ParamSpec::float("bb_std", 2.0, 0.5, 4.0),
        ]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "bb_period", 20) + 1).max(EntryGate::lookback(params))
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let close = closes(bars);
        let bands = bollinger(&close, int(params, "bb_period", 20), params.get_f64("bb_std", 2.0))?;
        let gate = EntryGate::from_params(bars, params)?;
        let mut builder = SignalBuilder::new();

        for i in 1..bars.len() {
            if !bands.lower[i - 1].is_finite() {
                continue;
            }
            if builder.is_flat() {
                let reentry = close[i - 1] < bands.lower[i - 1]
                    && close[i] > bars[i].open
                    && close[i] > bands.lower[i];
                if reentry && gate.allows(i, Position::Long) {
                    builder.set(i, Position::Long);
                }
            } else if close[i] >= bands.middle[i] || close[i] < bands.lower[i] {
                builder.set(i, Position::Flat);
            }
        }

        Ok(builder.finish())
    }
}

/// Breakout above the Keltner channel after a Bollinger width squeeze
pub struct Squeeze;

const SQUEEZE_HISTORY: usize = 120;
const SQUEEZE_PERCENTILE: f64 = 20.0;

impl Strategy for Squeeze {
    fn name(&self) -> &'static str {
        "Squeeze"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("bb_period", 20, 5, 100),
            ParamSpec::float("bb_std", 2.0, 0.5, 4.0),
            ParamSpec::int("keltner_period", 20, 5, 100),
            ParamSpec::float("keltner_multiplier", 2.0, 0.5, 4.0),
            ParamSpec::float("volume_multiplier", 1.5, 0.5, 5.0),
        ]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "bb_period", 20) + SQUEEZE_HISTORY)
            .max(int(params, "keltner_period", 20) + 1)
            .max(EntryGate::lookback(params))
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let close = closes(bars);
        let volume = volumes(bars);
        let bands = bollinger(&close, int(params, "bb_period", 20), params.get_f64("bb_std", 2.0))?;
        let channel = keltner(
            bars,
            int(params, "keltner_period", 20),
            params.get_f64("keltner_multiplier", 2.0),
        )?;
        let volume_avg = sma(&volume, 20)?;
        let multiplier = params.get_f64("volume_multiplier", 1.5);
        let width: Vec<f64> = bands
            .upper
            .iter()
            .zip(&bands.lower)
            .map(|(u, l)| u - l)
            .collect();
        let gate = EntryGate::from_params(bars, params)?;
        let mut builder = SignalBuilder::new();

        for i in SQUEEZE_HISTORY..bars.len() {
            let mut history: Vec<f64> = width[i + 1 - SQUEEZE_HISTORY..=i]
                .iter()
                .copied()
                .filter(|w| w.is_finite())
                .collect();
            if history.is_empty() {
                continue;
            }
            history.sort_by(|a, b| a.total_cmp(b));
            let threshold = percentile(&history, SQUEEZE_PERCENTILE);

            if builder.is_flat() {
                let squeeze = width[i] <= threshold
                    && close[i] > channel.upper[i]
                    && volume[i] > volume_avg[i] * multiplier;
                if squeeze && gate.allows(i, Position::Long) {
                    builder.set(i, Position::Long);
                }
            } else if width[i] > threshold * 1.5 {
                builder.set(i, Position::Flat);
            }
        }

        Ok(builder.finish())
    }
}

/// Linear-interpolated percentile of an ascending, non-empty slice
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
