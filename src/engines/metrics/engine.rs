// src/engines/metrics/engine.rs
use crate::config::MetricsConfig;
use crate::engines::metrics::{ProfitabilityMetrics, RiskMetrics, StabilityMetrics};
use crate::types::{float_repr, SimulationResult};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Fixed-shape statistics for one simulated run.
///
/// Ratios follow the `safe_ratio` sentinel policy: a zero denominator yields
/// `+inf` / `-inf`, and `0 / 0` or missing inputs yield `NaN`. Drawdown, VaR
/// and CVaR are positive fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(with = "float_repr")]
    pub total_return: f64,
    #[serde(with = "float_repr")]
    pub annualized_return: f64,
    #[serde(with = "float_repr")]
    pub volatility: f64,
    #[serde(with = "float_repr")]
    pub sharpe_ratio: f64,
    #[serde(with = "float_repr")]
    pub sortino_ratio: f64,
    #[serde(with = "float_repr")]
    pub calmar_ratio: f64,
    #[serde(with = "float_repr")]
    pub max_drawdown: f64,
    #[serde(with = "float_repr")]
    pub value_at_risk: f64,
    #[serde(with = "float_repr")]
    pub conditional_var: f64,
    #[serde(with = "float_repr")]
    pub win_rate: f64,
    #[serde(with = "float_repr")]
    pub profit_factor: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub num_trades: usize,
    #[serde(with = "float_repr")]
    pub average_trade: f64,
    #[serde(with = "float_repr")]
    pub largest_win: f64,
    #[serde(with = "float_repr")]
    pub largest_loss: f64,
    #[serde(with = "float_repr")]
    pub downside_deviation: f64,
    #[serde(with = "float_repr")]
    pub ulcer_index: f64,
    #[serde(with = "float_repr")]
    pub final_equity: f64,
    #[serde(with = "float_repr")]
    pub rolling_dispersion: f64,
    #[serde(with = "float_repr")]
    pub normality_p_value: f64,
    #[serde(with = "float_repr")]
    pub return_autocorrelation: f64,
    /// Filled in by the walk-forward aggregation, never by the engine
    #[serde(default, with = "float_repr::option")]
    pub parameter_stability: Option<f64>,
}

impl PerformanceMetrics {
    /// `(name, value, higher_is_better)` for every scalar statistic
    pub fn named_values(&self) -> Vec<(&'static str, f64, bool)> {
        vec![
            ("total_return", self.total_return, true),
            ("annualized_return", self.annualized_return, true),
            ("volatility", self.volatility, false),
            ("sharpe_ratio", self.sharpe_ratio, true),
            ("sortino_ratio", self.sortino_ratio, true),
            ("calmar_ratio", self.calmar_ratio, true),
            ("max_drawdown", self.max_drawdown, false),
            ("value_at_risk", self.value_at_risk, false),
            ("conditional_var", self.conditional_var, false),
            ("win_rate", self.win_rate, true),
            ("profit_factor", self.profit_factor, true),
            ("num_trades", self.num_trades as f64, true),
            ("average_trade", self.average_trade, true),
            ("ulcer_index", self.ulcer_index, false),
            ("rolling_dispersion", self.rolling_dispersion, false),
            ("normality_p_value", self.normality_p_value, true),
        ]
    }
}

/// In-sample objective maximised by the walk-forward parameter search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    SharpeRatio,
    SortinoRatio,
    CalmarRatio,
    TotalReturn,
    ProfitFactor,
}

impl Objective {
    pub fn evaluate(&self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            Objective::SharpeRatio => metrics.sharpe_ratio,
            Objective::SortinoRatio => metrics.sortino_ratio,
            Objective::CalmarRatio => metrics.calmar_ratio,
            Objective::TotalReturn => metrics.total_return,
            Objective::ProfitFactor => metrics.profit_factor,
        }
    }
}

const ROBUST_RATIO_CAP: f64 = 10.0;

pub struct MetricsEngine {
    initial_balance: f64,
    risk_free_rate: f64,
    periods_per_year: f64,
    var_confidence: f64,
}

impl MetricsEngine {
    pub fn new(initial_balance: f64, risk_free_rate: f64, periods_per_year: f64, var_confidence: f64) -> Self {
        Self {
            initial_balance,
            risk_free_rate,
            periods_per_year,
            var_confidence,
        }
    }

    pub fn from_config(initial_balance: f64, config: &MetricsConfig) -> Self {
        Self::new(
            initial_balance,
            config.risk_free_rate,
            config.periods_per_year,
            config.var_confidence,
        )
    }

    /// Pure function of the equity curve and trade list
    pub fn calculate_all(&self, result: &SimulationResult) -> PerformanceMetrics {
        let mut equity = Vec::with_capacity(result.equity_curve.len() + 1);
        equity.push(self.initial_balance);
        equity.extend(result.equity_curve.iter().map(|p| p.equity));

        let final_equity = equity.last().copied().unwrap_or(self.initial_balance);
        let total_return = final_equity / self.initial_balance - 1.0;

        let elapsed_days = match (result.equity_curve.first(), result.equity_curve.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_seconds() as f64 / 86_400.0,
            _ => 0.0,
        };
        let annualized_return = Self::annualize(total_return, elapsed_days);

        let risk = RiskMetrics::calculate(
            &equity,
            self.periods_per_year,
            self.risk_free_rate,
            self.var_confidence,
        );
        let trades = ProfitabilityMetrics::calculate(&result.trades);
        let stability = StabilityMetrics::calculate(&equity, self.periods_per_year);

        PerformanceMetrics {
            total_return,
            annualized_return,
            volatility: risk.volatility,
            sharpe_ratio: risk.sharpe_ratio,
            sortino_ratio: risk.sortino_ratio,
            calmar_ratio: super::returns::safe_ratio(annualized_return, risk.max_drawdown),
            max_drawdown: risk.max_drawdown,
            value_at_risk: risk.value_at_risk,
            conditional_var: risk.conditional_var,
            win_rate: trades.win_rate,
            profit_factor: trades.profit_factor,
            max_consecutive_wins: trades.max_consecutive_wins,
            max_consecutive_losses: trades.max_consecutive_losses,
            num_trades: trades.num_trades,
            average_trade: trades.average_trade,
            largest_win: trades.largest_win,
            largest_loss: trades.largest_loss,
            downside_deviation: risk.downside_deviation,
            ulcer_index: risk.ulcer_index,
            final_equity,
            rolling_dispersion: stability.rolling_dispersion,
            normality_p_value: stability.normality_p_value,
            return_autocorrelation: stability.autocorrelation,
            parameter_stability: None,
        }
    }

    fn annualize(total_return: f64, elapsed_days: f64) -> f64 {
        if elapsed_days <= 0.0 || !total_return.is_finite() {
            return f64::NAN;
        }
        let growth = 1.0 + total_return;
        if growth <= 0.0 {
            return -1.0;
        }
        growth.powf(365.25 / elapsed_days) - 1.0
    }

    /// Weighted single-run score used for quick ranking in batch reports.
    /// Infinite ratios are capped and NaN counts as zero.
    pub fn robust_score(&self, metrics: &PerformanceMetrics) -> f64 {
        let clean = |v: f64| {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(-ROBUST_RATIO_CAP, ROBUST_RATIO_CAP)
            }
        };

        clean(metrics.sharpe_ratio) * 0.3
            + clean(metrics.sortino_ratio) * 0.2
            + clean(metrics.calmar_ratio) * 0.15
            + (clean(metrics.win_rate) - 0.5) * 0.1
            + clean(metrics.profit_factor).min(3.0) * 0.1
            - clean(metrics.max_drawdown) * 0.05
            - clean(metrics.value_at_risk).min(0.1) * 0.05
            + (1.0 - clean(metrics.ulcer_index).min(1.0)) * 0.05
    }

    /// Plain-text summary for the CLI
    pub fn report(&self, metrics: &PerformanceMetrics) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Performance ===");
        let _ = writeln!(out, "Total return:       {:>10.2}%", metrics.total_return * 100.0);
        let _ = writeln!(out, "Annualized return:  {:>10.2}%", metrics.annualized_return * 100.0);
        let _ = writeln!(out, "Volatility:         {:>10.2}%", metrics.volatility * 100.0);
        let _ = writeln!(out, "Sharpe ratio:       {:>10.3}", metrics.sharpe_ratio);
        let _ = writeln!(out, "Sortino ratio:      {:>10.3}", metrics.sortino_ratio);
        let _ = writeln!(out, "Calmar ratio:       {:>10.3}", metrics.calmar_ratio);
        let _ = writeln!(out, "Max drawdown:       {:>10.2}%", metrics.max_drawdown * 100.0);
        let _ = writeln!(out, "=== Trades ===");
        let _ = writeln!(out, "Trades:             {:>10}", metrics.num_trades);
        let _ = writeln!(out, "Win rate:           {:>10.2}%", metrics.win_rate * 100.0);
        let _ = writeln!(out, "Profit factor:      {:>10.3}", metrics.profit_factor);
        let _ = writeln!(out, "Average trade:      {:>10.2}", metrics.average_trade);
        let _ = writeln!(
            out,
            "Streaks (W/L):      {:>5}/{}",
            metrics.max_consecutive_wins, metrics.max_consecutive_losses
        );
        let _ = writeln!(out, "=== Risk ===");
        let _ = writeln!(out, "VaR:                {:>10.2}%", metrics.value_at_risk * 100.0);
        let _ = writeln!(out, "CVaR:               {:>10.2}%", metrics.conditional_var * 100.0);
        let _ = writeln!(out, "Ulcer index:        {:>10.3}", metrics.ulcer_index);
        let _ = writeln!(out, "=== Stability ===");
        let _ = writeln!(out, "Rolling dispersion: {:>10.4}", metrics.rolling_dispersion);
        let _ = writeln!(out, "Normality p-value:  {:>10.4}", metrics.normality_p_value);
        let _ = writeln!(out, "Autocorrelation:    {:>10.4}", metrics.return_autocorrelation);
        let _ = write!(out, "Robust score:       {:>10.4}", self.robust_score(metrics));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, EquityPoint, ExitReason, Trade};
    use chrono::{Duration, TimeZone, Utc};

    fn trade(profit: f64) -> Trade {
        let t = Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap();
        Trade {
            entry_bar: 0,
            exit_bar: 1,
            entry_time: t,
            exit_time: t,
            entry_price: 100.0,
            exit_price: 100.0 + profit,
            direction: Direction::Long,
            size: 1.0,
            profit,
            exit_reason: ExitReason::Signal,
            fees: 0.0,
        }
    }

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        let start = Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &equity)| EquityPoint {
                timestamp: start + Duration::days(i as i64),
                equity,
            })
            .collect()
    }

    #[test]
    fn test_no_losing_trades_gives_infinite_profit_factor() {
        let engine = MetricsEngine::new(1000.0, 0.0, 252.0, 0.95);
        let result = SimulationResult {
            trades: vec![trade(10.0), trade(5.0)],
            equity_curve: curve(&[1000.0, 1010.0, 1015.0]),
        };
        let metrics = engine.calculate_all(&result);

        assert_eq!(metrics.profit_factor, f64::INFINITY);
        assert_eq!(metrics.win_rate, 1.0);
        assert_eq!(metrics.max_consecutive_wins, 2);
        assert_eq!(metrics.max_drawdown, 0.0);
        assert_eq!(metrics.calmar_ratio, f64::INFINITY);
        assert!((metrics.total_return - 0.015).abs() < 1e-12);
    }

    #[test]
    fn test_no_trades_gives_nan_trade_stats() {
        let engine = MetricsEngine::new(1000.0, 0.0, 252.0, 0.95);
        let result = SimulationResult {
            trades: Vec::new(),
            equity_curve: curve(&[1000.0, 1000.0]),
        };
        let metrics = engine.calculate_all(&result);

        assert!(metrics.profit_factor.is_nan());
        assert!(metrics.win_rate.is_nan());
        assert!(metrics.sharpe_ratio.is_nan());
        assert!(metrics.normality_p_value.is_nan());
        assert!(metrics.rolling_dispersion.is_nan());
        assert_eq!(metrics.num_trades, 0);
        assert!(engine.robust_score(&metrics).is_finite());
    }

    #[test]
    fn test_streaks_and_objective() {
        let engine = MetricsEngine::new(1000.0, 0.0, 252.0, 0.95);
        let result = SimulationResult {
            trades: vec![trade(-1.0), trade(-2.0), trade(3.0), trade(-1.0), trade(-1.0), trade(-1.0)],
            equity_curve: curve(&[1000.0, 999.0, 997.0, 1000.0, 999.0, 998.0, 997.0]),
        };
        let metrics = engine.calculate_all(&result);

        assert_eq!(metrics.max_consecutive_losses, 3);
        assert_eq!(metrics.max_consecutive_wins, 1);
        assert!((metrics.profit_factor - 0.5).abs() < 1e-12);
        assert_eq!(Objective::ProfitFactor.evaluate(&metrics), metrics.profit_factor);
        assert_eq!(metrics.largest_loss, -2.0);
    }
}
