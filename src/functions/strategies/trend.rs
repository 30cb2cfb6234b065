use super::int;
use crate::functions::indicators::{atr, crossed_above, crossed_below, macd, rolling_max, sma};
use crate::functions::strategy::{closes, volumes, EntryGate, SignalBuilder, Strategy};
use crate::types::{Bar, ParamSpec, ParameterSet, Position, Signal};
use anyhow::Result;

/// Long on a fast/slow SMA cross up, short on a cross down
pub struct FixedSma;

impl Strategy for FixedSma {
    fn name(&self) -> &'static str {
        "FixedSma"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("n_fast", 10, 2, 200),
            ParamSpec::int("n_slow", 20, 3, 400),
        ]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "n_slow", 20) + 1).max(EntryGate::lookback(params))
    }

    fn validate_parameters(&self, params: &ParameterSet) -> bool {
        int(params, "n_fast", 10) < int(params, "n_slow", 20)
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let close = closes(bars);
        let fast = sma(&close, int(params, "n_fast", 10))?;
        let slow = sma(&close, int(params, "n_slow", 20))?;
        let gate = EntryGate::from_params(bars, params)?;
        let mut builder = SignalBuilder::new();

        for i in 1..bars.len() {
            if crossed_above(&fast, &slow, i) {
                builder.enter_or_flatten(i, Position::Long, gate.allows(i, Position::Long));
            } else if crossed_below(&fast, &slow, i) {
                builder.enter_or_flatten(i, Position::Short, gate.allows(i, Position::Short));
            }
        }

        Ok(builder.finish())
    }
}

/// Long-only SMA cross
pub struct SmaCross;

impl Strategy for SmaCross {
    fn name(&self) -> &'static str {
        "SmaCross"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("n_fast", 20, 2, 200),
            ParamSpec::int("n_slow", 50, 3, 400),
        ]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "n_slow", 50) + 1).max(EntryGate::lookback(params))
    }

    fn validate_parameters(&self, params: &ParameterSet) -> bool {
        int(params, "n_fast", 20) < int(params, "n_slow", 50)
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let close = closes(bars);
        let fast = sma(&close, int(params, "n_fast", 20))?;
        let slow = sma(&close, int(params, "n_slow", 50))?;
        let gate = EntryGate::from_params(bars, params)?;
        let mut builder = SignalBuilder::new();

        for i in 1..bars.len() {
            if crossed_above(&fast, &slow, i) && gate.allows(i, Position::Long) {
                builder.set(i, Position::Long);
            } else if crossed_below(&fast, &slow, i) {
                builder.set(i, Position::Flat);
            }
        }

        Ok(builder.finish())
    }
}

/// Trend-aligned breakout above the recent high with volume confirmation,
/// exited below the short SMA or on an ATR trailing stop.
pub struct MovingAverageBreakout;

const BREAKOUT_LOOKBACK: usize = 20;
const TRAILING_ATR: f64 = 1.5;

impl Strategy for MovingAverageBreakout {
    fn name(&self) -> &'static str {
        "MovingAverageBreakout"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("sma_short", 20, 2, 100),
            ParamSpec::int("sma_medium", 50, 5, 200),
            ParamSpec::int("sma_long", 200, 20, 400),
            ParamSpec::int("atr_period", 14, 2, 100),
            ParamSpec::float("volume_multiplier", 1.5, 0.5, 5.0),
        ]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "sma_long", 200) + 1)
            .max(BREAKOUT_LOOKBACK + 1)
            .max(EntryGate::lookback(params))
    }

    fn validate_parameters(&self, params: &ParameterSet) -> bool {
        let short = int(params, "sma_short", 20);
        let medium = int(params, "sma_medium", 50);
        let long = int(params, "sma_long", 200);
        short < medium && medium < long
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let close = closes(bars);
        let volume = volumes(bars);
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let short = sma(&close, int(params, "sma_short", 20))?;
        let medium = sma(&close, int(params, "sma_medium", 50))?;
        let long = sma(&close, int(params, "sma_long", 200))?;
        let range = atr(bars, int(params, "atr_period", 14))?;
        let volume_avg = sma(&volume, BREAKOUT_LOOKBACK)?;
        let recent_high = rolling_max(&highs, BREAKOUT_LOOKBACK)?;
        let multiplier = params.get_f64("volume_multiplier", 1.5);
        let gate = EntryGate::from_params(bars, params)?;

        let mut builder = SignalBuilder::new();
        let mut trailing = f64::NEG_INFINITY;

        for i in 1..bars.len() {
            if builder.is_flat() {
                let breakout = close[i] > medium[i]
                    && medium[i] > long[i]
                    && close[i] > recent_high[i - 1] + 0.2 * range[i]
                    && volume[i] > volume_avg[i] * multiplier;
                if breakout && gate.allows(i, Position::Long) {
                    builder.set(i, Position::Long);
                    trailing = close[i] - TRAILING_ATR * range[i];
                }
            } else {
                if close[i] < short[i] || close[i] < trailing {
                    builder.set(i, Position::Flat);
                } else if range[i].is_finite() {
                    trailing = trailing.max(close[i] - TRAILING_ATR * range[i]);
                }
            }
        }

        Ok(builder.finish())
    }
}

/// MACD signal-line cross above zero with volume confirmation
pub struct Macd;

const VOLUME_AVERAGE: usize = 20;

impl Strategy for Macd {
    fn name(&self) -> &'static str {
        "Macd"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("macd_fast", 12, 2, 50),
            ParamSpec::int("macd_slow", 26, 5, 100),
            ParamSpec::int("macd_signal", 9, 2, 50),
            ParamSpec::float("volume_multiplier", 1.0, 0.0, 5.0),
        ]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "macd_slow", 26) + int(params, "macd_signal", 9))
            .max(VOLUME_AVERAGE)
            .max(EntryGate::lookback(params))
    }

    fn validate_parameters(&self, params: &ParameterSet) -> bool {
        int(params, "macd_fast", 12) < int(params, "macd_slow", 26)
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let close = closes(bars);
        let volume = volumes(bars);
        let lines = macd(
            &close,
            int(params, "macd_fast", 12),
            int(params, "macd_slow", 26),
            int(params, "macd_signal", 9),
        )?;
        let volume_avg = sma(&volume, VOLUME_AVERAGE)?;
        let multiplier = params.get_f64("volume_multiplier", 1.0);
        let gate = EntryGate::from_params(bars, params)?;
        let mut builder = SignalBuilder::new();

        for i in 1..bars.len() {
            if builder.is_flat() {
                let entry = lines.line[i] > 0.0
                    && crossed_above(&lines.line, &lines.signal, i)
                    && volume[i] > volume_avg[i] * multiplier;
                if entry && gate.allows(i, Position::Long) {
                    builder.set(i, Position::Long);
                }
            } else if lines.line[i] < 0.0 && crossed_below(&lines.line, &lines.signal, i) {
                builder.set(i, Position::Flat);
            }
        }

        Ok(builder.finish())
    }
}
