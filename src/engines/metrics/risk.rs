// src/engines/metrics/risk.rs
use crate::engines::metrics::returns::{mean, safe_ratio, sample_std, simple_returns};

/// Equity-curve statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskMetrics {
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub downside_deviation: f64,
    pub max_drawdown: f64,
    pub value_at_risk: f64,
    pub conditional_var: f64,
    pub ulcer_index: f64,
}

impl RiskMetrics {
    /// `equity` includes the starting balance as its first value
    pub fn calculate(equity: &[f64], periods_per_year: f64, risk_free_rate: f64, confidence: f64) -> Self {
        let returns = simple_returns(equity);
        let scale = periods_per_year.sqrt();
        let rf_per_period = risk_free_rate / periods_per_year;

        let volatility = sample_std(&returns) * scale;
        let excess = (mean(&returns) - rf_per_period) * periods_per_year;
        let downside_deviation = Self::downside_deviation(&returns, rf_per_period) * scale;
        let (value_at_risk, conditional_var) = Self::historical_var(&returns, confidence);

        Self {
            volatility,
            sharpe_ratio: safe_ratio(excess, volatility),
            sortino_ratio: safe_ratio(excess, downside_deviation),
            downside_deviation,
            max_drawdown: Self::max_drawdown(equity),
            value_at_risk,
            conditional_var,
            ulcer_index: Self::ulcer_index(equity),
        }
    }

    /// Largest peak-to-trough decline as a positive fraction
    pub fn max_drawdown(equity: &[f64]) -> f64 {
        Self::drawdowns(equity).into_iter().fold(0.0, f64::max)
    }

    fn drawdowns(equity: &[f64]) -> Vec<f64> {
        let mut peak = f64::NEG_INFINITY;
        equity
            .iter()
            .map(|&value| {
                peak = peak.max(value);
                if peak > 0.0 {
                    (peak - value) / peak
                } else {
                    0.0
                }
            })
            .collect()
    }

    fn downside_deviation(returns: &[f64], target: f64) -> f64 {
        if returns.is_empty() {
            return f64::NAN;
        }
        let squares: f64 = returns.iter().map(|r| (r - target).min(0.0).powi(2)).sum();
        (squares / returns.len() as f64).sqrt()
    }

    /// Historical VaR and CVaR, both reported as positive losses
    fn historical_var(returns: &[f64], confidence: f64) -> (f64, f64) {
        if returns.is_empty() {
            return (f64::NAN, f64::NAN);
        }
        let mut sorted = returns.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let cutoff = (((1.0 - confidence) * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
        let var = -sorted[cutoff];
        let cvar = -mean(&sorted[..=cutoff]);
        (var, cvar)
    }

    fn ulcer_index(equity: &[f64]) -> f64 {
        let drawdowns = Self::drawdowns(equity);
        if drawdowns.is_empty() {
            return f64::NAN;
        }
        (drawdowns.iter().map(|d| d * d).sum::<f64>() / drawdowns.len() as f64).sqrt()
    }
}
