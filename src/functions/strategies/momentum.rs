use super::int;
use crate::functions::indicators::{rsi, sma};
use crate::functions::strategy::{closes, EntryGate, SignalBuilder, Strategy};
use crate::types::{Bar, ParamSpec, ParameterSet, Position, Signal};
use anyhow::Result;

/// RSI leaving the oversold zone while price is above its average
pub struct Momentum;

impl Strategy for Momentum {
    fn name(&self) -> &'static str {
        "Momentum"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("rsi_period", 14, 2, 50),
            ParamSpec::float("rsi_oversold", 30.0, 5.0, 50.0),
            ParamSpec::float("rsi_overbought", 70.0, 50.0, 95.0),
            ParamSpec::int("lookback_period", 20, 2, 200),
        ]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "rsi_period", 14) + 2)
            .max(int(params, "lookback_period", 20))
            .max(EntryGate::lookback(params))
    }

    fn validate_parameters(&self, params: &ParameterSet) -> bool {
        params.get_f64("rsi_oversold", 30.0) < params.get_f64("rsi_overbought", 70.0)
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let close = closes(bars);
        let strength = rsi(&close, int(params, "rsi_period", 14))?;
        let average = sma(&close, int(params, "lookback_period", 20))?;
        let oversold = params.get_f64("rsi_oversold", 30.0);
        let overbought = params.get_f64("rsi_overbought", 70.0);
        let gate = EntryGate::from_params(bars, params)?;
        let mut builder = SignalBuilder::new();

        for i in 1..bars.len() {
            let (prev, now) = (strength[i - 1], strength[i]);
            if !prev.is_finite() || !now.is_finite() || !average[i].is_finite() {
                continue;
            }
            if builder.is_flat() {
                if prev <= oversold && now > oversold && close[i] > average[i]
                    && gate.allows(i, Position::Long)
                {
                    builder.set(i, Position::Long);
                }
            } else if prev >= overbought && now < overbought && close[i] < average[i] {
                builder.set(i, Position::Flat);
            }
        }

        Ok(builder.finish())
    }
}

/// Buy rising RSI above the entry level, exit on either band
pub struct RsiMomentum;

impl Strategy for RsiMomentum {
    fn name(&self) -> &'static str {
        "RsiMomentum"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("rsi_period", 14, 2, 50),
            ParamSpec::float("rsi_entry", 55.0, 40.0, 80.0),
            ParamSpec::float("rsi_exit_high", 70.0, 55.0, 95.0),
            ParamSpec::float("rsi_exit_low", 45.0, 10.0, 60.0),
        ]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "rsi_period", 14) + 2).max(EntryGate::lookback(params))
    }

    fn validate_parameters(&self, params: &ParameterSet) -> bool {
        let entry = params.get_f64("rsi_entry", 55.0);
        params.get_f64("rsi_exit_low", 45.0) < entry && entry < params.get_f64("rsi_exit_high", 70.0)
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let close = closes(bars);
        let strength = rsi(&close, int(params, "rsi_period", 14))?;
        let entry = params.get_f64("rsi_entry", 55.0);
        let exit_high = params.get_f64("rsi_exit_high", 70.0);
        let exit_low = params.get_f64("rsi_exit_low", 45.0);
        let gate = EntryGate::from_params(bars, params)?;
        let mut builder = SignalBuilder::new();

        for i in 1..bars.len() {
            let (prev, now) = (strength[i - 1], strength[i]);
            if !prev.is_finite() || !now.is_finite() {
                continue;
            }
            if builder.is_flat() {
                if now > entry && now > prev && gate.allows(i, Position::Long) {
                    builder.set(i, Position::Long);
                }
            } else if now >= exit_high || now <= exit_low {
                builder.set(i, Position::Flat);
            }
        }

        Ok(builder.finish())
    }
}

/// Short-period RSI dip buying inside a long-term uptrend, with a time stop
pub struct RsiExtreme;

impl Strategy for RsiExtreme {
    fn name(&self) -> &'static str {
        "RsiExtreme"
    }

    fn parameter_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("rsi_period", 2, 2, 20),
            ParamSpec::float("rsi_oversold", 5.0, 1.0, 40.0),
            ParamSpec::float("rsi_overbought", 70.0, 50.0, 95.0),
            ParamSpec::int("sma_period", 200, 20, 400),
            ParamSpec::int("time_stop_bars", 3, 1, 20),
        ]
    }

    fn min_lookback(&self, params: &ParameterSet) -> usize {
        (int(params, "sma_period", 200) + 1)
            .max(int(params, "rsi_period", 2) + 2)
            .max(EntryGate::lookback(params))
    }

    fn validate_parameters(&self, params: &ParameterSet) -> bool {
        params.get_f64("rsi_oversold", 5.0) < params.get_f64("rsi_overbought", 70.0)
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>> {
        if bars.len() < self.min_lookback(params) {
            return Ok(Vec::new());
        }

        let close = closes(bars);
        let strength = rsi(&close, int(params, "rsi_period", 2))?;
        let trend = sma(&close, int(params, "sma_period", 200))?;
        let oversold = params.get_f64("rsi_oversold", 5.0);
        let overbought = params.get_f64("rsi_overbought", 70.0);
        let time_stop = int(params, "time_stop_bars", 3);
        let gate = EntryGate::from_params(bars, params)?;

        let mut builder = SignalBuilder::new();
        let mut entry_bar = 0;

        for i in 0..bars.len() {
            if !strength[i].is_finite() || !trend[i].is_finite() {
                continue;
            }
            if builder.is_flat() {
                if close[i] > trend[i] && strength[i] < oversold && gate.allows(i, Position::Long) {
                    builder.set(i, Position::Long);
                    entry_bar = i;
                }
            } else if strength[i] > overbought || i - entry_bar >= time_stop {
                builder.set(i, Position::Flat);
            }
        }

        Ok(builder.finish())
    }
}
