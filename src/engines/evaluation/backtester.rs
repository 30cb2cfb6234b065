use crate::{
    config::BacktestingConfig,
    engines::evaluation::Portfolio,
    error::Result,
    functions::strategy::Strategy,
    types::{Bar, Direction, ExitReason, ParameterSet, Position, SimulationResult},
};

/// Replays a strategy's signals over a slice of bars.
///
/// Orders fill at the signal bar's close. The simulation only ever sees the
/// bars it is handed; bars before `start` in [`Backtester::run_from`] feed the
/// indicators but never trade or enter the equity curve.
#[derive(Debug, Clone)]
pub struct Backtester {
    initial_balance: f64,
    commission: f64,
    position_fraction: f64,
}

impl Backtester {
    pub fn new(initial_balance: f64, commission: f64, position_fraction: f64) -> Self {
        Self {
            initial_balance,
            commission,
            position_fraction,
        }
    }

    pub fn from_config(config: &BacktestingConfig) -> Self {
        Self::new(config.initial_cash, config.commission, config.position_fraction)
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn run(
        &self,
        strategy: &dyn Strategy,
        bars: &[Bar],
        params: &ParameterSet,
    ) -> Result<SimulationResult> {
        self.run_from(strategy, bars, 0, params)
    }

    /// Simulate `bars[start..]` with `bars[..start]` as indicator history.
    /// Trade bar indices are relative to `start`.
    pub fn run_from(
        &self,
        strategy: &dyn Strategy,
        bars: &[Bar],
        start: usize,
        params: &ParameterSet,
    ) -> Result<SimulationResult> {
        if start >= bars.len() {
            return Ok(SimulationResult::default());
        }

        let mut signals = strategy.generate_signals(bars, params)?;
        signals.sort_by_key(|s| s.bar);

        let stop_loss = params.get_f64("stop_loss", 0.0);
        let take_profit = params.get_f64("take_profit", 0.0);
        let fraction = params.get_f64("max_position_size", self.position_fraction);

        let mut portfolio = Portfolio::new(self.initial_balance, self.commission, fraction);
        let mut pending = signals.iter().peekable();
        let last = bars.len() - 1;

        for (i, bar) in bars.iter().enumerate().skip(start) {
            let at = i - start;
            portfolio.check_risk_exits(at, bar, stop_loss, take_profit);

            while let Some(signal) = pending.next_if(|s| s.bar <= i) {
                if signal.bar < i {
                    continue;
                }
                let target = match signal.target {
                    Position::Long => Some(Direction::Long),
                    Position::Short => Some(Direction::Short),
                    Position::Flat => None,
                };
                if portfolio.direction() != target {
                    portfolio.close_position(at, bar, ExitReason::Signal);
                    if let Some(direction) = target {
                        portfolio.open_position(at, bar, direction, fraction);
                    }
                }
            }

            if i == last {
                portfolio.close_position(at, bar, ExitReason::EndOfData);
            }
            portfolio.mark_to_market(bar);
        }

        Ok(SimulationResult {
            trades: portfolio.trades,
            equity_curve: portfolio.equity_curve,
        })
    }
}
