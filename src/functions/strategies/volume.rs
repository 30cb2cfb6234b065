use super::int;
use crate::functions::indicators::{obv, rolling_max, sma};
use crate::functions::strategy::{closes, volumes, EntryGate, SignalBuilder, Strategy};
use crate::types::{Bar, ParamSpec, ParameterSet, Position, Signal};
use anyhow::Result;

/// New high on heavy volume, exited at a fixed profit target
pub struct VolumeBreakout;

impl Strategy for VolumeBreakout {
    fn name(&self) -> &'static str {
        "VolumeBreakout"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("breakout_period", 20, 5, 100),
            ParamSpec::float("volume_multiplier", 2.0, 0.5, 6.0),
            ParamSpec::float("profit_target", 0.1, 0.01, 0.5),
        ]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "breakout_period", 20) + 1)
            .max(21)
            .max(EntryGate::lookback(params))
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let close = closes(bars);
        let volume = volumes(bars);
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let recent_high = rolling_max(&highs, int(params, "breakout_period", 20))?;
        let volume_avg = sma(&volume, 20)?;
        let multiplier = params.get_f64("volume_multiplier", 2.0);
        let target = params.get_f64("profit_target", 0.1);
        let gate = EntryGate::from_params(bars, params)?;

        let mut builder = SignalBuilder::new();
        let mut entry_price = 0.0;

        for i in 1..bars.len() {
            if builder.is_flat() {
                let breakout = recent_high[i - 1].is_finite()
                    && close[i] > recent_high[i - 1]
                    && volume[i] > volume_avg[i] * multiplier;
                if breakout && gate.allows(i, Position::Long) {
                    builder.set(i, Position::Long);
                    entry_price = close[i];
                }
            } else if close[i] >= entry_price * (1.0 + target) {
                builder.set(i, Position::Flat);
            }
        }

        Ok(builder.finish())
    }
}

/// OBV above its rising average
pub struct Obv;

const OBV_SLOPE_BARS: usize = 4;

impl Strategy for Obv {
    fn name(&self) -> &'static str {
        "Obv"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::int("obv_period", 20, 2, 200)]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "obv_period", 20) + OBV_SLOPE_BARS).max(EntryGate::lookback(params))
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let balance = obv(bars);
        let average = sma(&balance, int(params, "obv_period", 20))?;
        let gate = EntryGate::from_params(bars, params)?;
        let mut builder = SignalBuilder::new();

        for i in OBV_SLOPE_BARS..bars.len() {
            if !average[i - OBV_SLOPE_BARS].is_finite() {
                continue;
            }
            if builder.is_flat() {
                let rising = balance[i] > average[i] && average[i] > average[i - OBV_SLOPE_BARS];
                if rising && gate.allows(i, Position::Long) {
                    builder.set(i, Position::Long);
                }
            } else if balance[i] < average[i] {
                builder.set(i, Position::Flat);
            }
        }

        Ok(builder.finish())
    }
}
