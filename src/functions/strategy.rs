use crate::functions::indicators::{atr, sma};
use crate::types::{Bar, ParamSpec, ParameterSet, Position, Signal};
use anyhow::Result;

/// Signal-generation capability.
///
/// Implementations are pure: the output depends only on `bars` and `params`.
/// A series shorter than `min_lookback` yields an empty signal list.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parameters this strategy reads, with defaults and search bounds
    fn parameter_specs(&self) -> Vec<ParamSpec>;

    fn default_parameters(&self) -> ParameterSet {
        self.parameter_specs()
            .into_iter()
            .map(|spec| (spec.name, spec.default))
            .collect()
    }

    /// Bars needed before the first signal can be produced
    fn min_lookback(&self, params: &ParameterSet) -> usize;

    /// Reject internally inconsistent combinations (e.g. fast >= slow)
    fn validate_parameters(&self, _params: &ParameterSet) -> bool {
        true
    }

    fn generate_signals(&self, bars: &[Bar], params: &ParameterSet) -> Result<Vec<Signal>>;
}

/// Collects position changes, dropping repeats of the current target.
pub struct SignalBuilder {
    current: Position,
    signals: Vec<Signal>,
}

impl SignalBuilder {
    pub fn new() -> Self {
        Self {
            current: Position::Flat,
            signals: Vec::new(),
        }
    }

    pub fn position(&self) -> Position {
        self.current
    }

    pub fn is_flat(&self) -> bool {
        self.current == Position::Flat
    }

    pub fn set(&mut self, bar: usize, target: Position) {
        if target != self.current {
            self.signals.push(Signal { bar, target });
            self.current = target;
        }
    }

    /// Move to `target` when allowed, otherwise go flat
    pub fn enter_or_flatten(&mut self, bar: usize, target: Position, allowed: bool) {
        if allowed {
            self.set(bar, target);
        } else {
            self.set(bar, Position::Flat);
        }
    }

    pub fn finish(self) -> Vec<Signal> {
        self.signals
    }
}

impl Default for SignalBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Optional entry filters shared by every strategy.
///
/// `trend_filter` only allows longs above (shorts below) the `trend_sma`
/// average; `volatility_filter` blocks entries while ATR / close exceeds
/// `max_atr_pct`.
pub struct EntryGate {
    close: Vec<f64>,
    trend: Option<Vec<f64>>,
    volatility: Option<(Vec<f64>, f64)>,
}

impl EntryGate {
    pub fn from_params(bars: &[Bar], params: &ParameterSet) -> Result<Self> {
        let close: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let trend = if params.get_flag("trend_filter") {
            Some(sma(&close, params.get_usize("trend_sma", 50))?)
        } else {
            None
        };

        let volatility = if params.get_flag("volatility_filter") {
            let range = atr(bars, params.get_usize("atr_period", 14))?;
            Some((range, params.get_f64("max_atr_pct", 0.05)))
        } else {
            None
        };

        Ok(Self {
            close,
            trend,
            volatility,
        })
    }

    /// Extra warm-up bars the enabled filters require
    pub fn lookback(params: &ParameterSet) -> usize {
        let mut lookback = 0;
        if params.get_flag("trend_filter") {
            lookback = lookback.max(params.get_usize("trend_sma", 50));
        }
        if params.get_flag("volatility_filter") {
            lookback = lookback.max(params.get_usize("atr_period", 14));
        }
        lookback
    }

    pub fn allows(&self, i: usize, side: Position) -> bool {
        if let Some(trend) = &self.trend {
            let level = trend[i];
            if !level.is_finite() {
                return false;
            }
            match side {
                Position::Long if self.close[i] <= level => return false,
                Position::Short if self.close[i] >= level => return false,
                _ => {}
            }
        }

        if let Some((range, cap)) = &self.volatility {
            let pct = range[i] / self.close[i];
            if !pct.is_finite() || pct > *cap {
                return false;
            }
        }

        true
    }
}

pub(crate) fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

pub(crate) fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamValue;

    #[test]
    fn test_builder_drops_repeats() {
        let mut builder = SignalBuilder::new();
        builder.set(0, Position::Flat);
        builder.set(1, Position::Long);
        builder.set(2, Position::Long);
        builder.enter_or_flatten(3, Position::Short, false);
        let signals = builder.finish();

        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0], Signal { bar: 1, target: Position::Long });
        assert_eq!(signals[1], Signal { bar: 3, target: Position::Flat });
    }

    #[test]
    fn test_gate_lookback() {
        let params = ParameterSet::new()
            .with("trend_filter", ParamValue::Flag(true))
            .with("trend_sma", ParamValue::Int(80));
        assert_eq!(EntryGate::lookback(&params), 80);
        assert_eq!(EntryGate::lookback(&ParameterSet::new()), 0);
    }
}
