use super::splitters::Window;
use crate::config::ScoringConfig;
use crate::engines::metrics::returns::{mean, sample_std};
use crate::engines::metrics::PerformanceMetrics;
use crate::types::{float_repr, ParamValue, ParameterSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of one walk-forward window.
///
/// A degraded window carries a reason and no score; it stays visible in
/// diagnostics but is left out of every aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub window: Window,
    pub parameters: Option<ParameterSet>,
    #[serde(default, with = "float_repr::option")]
    pub in_sample_objective: Option<f64>,
    /// Computed on the test slice only
    pub metrics: Option<PerformanceMetrics>,
    #[serde(default, with = "float_repr::option")]
    pub score: Option<f64>,
    pub train_bars: usize,
    pub test_bars: usize,
    pub degraded_reason: Option<String>,
}

impl WindowResult {
    pub fn degraded(window: Window, train_bars: usize, test_bars: usize, reason: String) -> Self {
        Self {
            window,
            parameters: None,
            in_sample_objective: None,
            metrics: None,
            score: None,
            train_bars,
            test_bars,
            degraded_reason: Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_reason.is_some() || self.metrics.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    #[serde(with = "float_repr")]
    pub mean: f64,
    #[serde(with = "float_repr")]
    pub std: f64,
    /// Minimum for higher-is-better metrics, maximum otherwise
    #[serde(with = "float_repr")]
    pub worst: f64,
}

/// Cross-window summary for one strategy on one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub strategy: String,
    pub instrument: String,
    pub metrics: BTreeMap<String, MetricSummary>,
    /// Normalised variance of the chosen parameters; lower is more stable
    pub parameter_stability: f64,
    #[serde(default, with = "float_repr::option")]
    pub composite_score: Option<f64>,
    pub healthy_windows: usize,
    pub degraded_windows: usize,
    pub windows: Vec<WindowResult>,
}

impl AggregateResult {
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }
}

/// Build the aggregate. A pure function of `windows` and `scoring`.
pub fn aggregate(
    strategy: &str,
    instrument: &str,
    mut windows: Vec<WindowResult>,
    scoring: &ScoringConfig,
) -> AggregateResult {
    let healthy: Vec<&WindowResult> = windows.iter().filter(|w| !w.is_degraded()).collect();
    let healthy_windows = healthy.len();
    let degraded_windows = windows.len() - healthy_windows;

    let metrics = summarize(&healthy);
    let chosen: Vec<&ParameterSet> = healthy.iter().filter_map(|w| w.parameters.as_ref()).collect();
    let stability = parameter_stability(&chosen);
    let composite_score = composite_score(&healthy, stability, scoring);

    for window in windows.iter_mut().filter(|w| w.metrics.is_some()) {
        if let Some(m) = window.metrics.as_mut() {
            m.parameter_stability = Some(stability);
        }
    }

    AggregateResult {
        strategy: strategy.to_string(),
        instrument: instrument.to_string(),
        metrics,
        parameter_stability: stability,
        composite_score,
        healthy_windows,
        degraded_windows,
        windows,
    }
}

fn summarize(healthy: &[&WindowResult]) -> BTreeMap<String, MetricSummary> {
    let mut columns: BTreeMap<&'static str, (Vec<f64>, bool)> = BTreeMap::new();
    for metrics in healthy.iter().filter_map(|w| w.metrics.as_ref()) {
        for (name, value, higher_is_better) in metrics.named_values() {
            let entry = columns.entry(name).or_insert_with(|| (Vec::new(), higher_is_better));
            if !value.is_nan() {
                entry.0.push(value);
            }
        }
    }

    columns
        .into_iter()
        .filter(|(_, (values, _))| !values.is_empty())
        .map(|(name, (values, higher_is_better))| {
            let worst = if higher_is_better {
                values.iter().copied().fold(f64::INFINITY, f64::min)
            } else {
                values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            };
            let std = if values.len() < 2 { 0.0 } else { sample_std(&values) };
            (
                name.to_string(),
                MetricSummary {
                    mean: mean(&values),
                    std,
                    worst,
                },
            )
        })
        .collect()
}

/// Mean per-parameter instability of the chosen sets.
///
/// Numeric parameters contribute `variance / mean^2` (plain variance when the
/// mean is zero); other values contribute the share of windows that differ
/// from the most common choice. Zero with fewer than two sets.
pub fn parameter_stability(sets: &[&ParameterSet]) -> f64 {
    if sets.len() < 2 {
        return 0.0;
    }

    let names: BTreeSet<&String> = sets.iter().flat_map(|s| s.keys()).collect();
    if names.is_empty() {
        return 0.0;
    }

    let per_param: Vec<f64> = names
        .into_iter()
        .map(|name| {
            let values: Vec<Option<&ParamValue>> = sets.iter().map(|s| s.get(name)).collect();
            let numeric: Option<Vec<f64>> = values.iter().map(|v| v.and_then(ParamValue::as_f64)).collect();

            match numeric {
                Some(nums) => {
                    let m = mean(&nums);
                    let variance = nums.iter().map(|v| (v - m).powi(2)).sum::<f64>() / nums.len() as f64;
                    if m == 0.0 {
                        variance
                    } else {
                        variance / (m * m)
                    }
                }
                None => {
                    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                    for value in &values {
                        let key = value.map(|v| v.to_string()).unwrap_or_default();
                        *counts.entry(key).or_default() += 1;
                    }
                    let mode = counts.values().copied().max().unwrap_or(0);
                    (values.len() - mode) as f64 / values.len() as f64
                }
            }
        })
        .collect();

    mean(&per_param)
}

/// `sharpe_weight * mean(Sharpe) - drawdown_weight * mean(drawdown)
///  - instability_weight * stability - dispersion_weight * std(Sharpe)
///  - low_trade_penalty [mean trades < min_trades]`
///
/// Sharpe values are clamped to `+/- ratio_cap`; a NaN Sharpe (a test
/// window that never traded) counts as 0. None when there is no healthy
/// window.
pub fn composite_score(healthy: &[&WindowResult], stability: f64, scoring: &ScoringConfig) -> Option<f64> {
    let metrics: Vec<&PerformanceMetrics> = healthy.iter().filter_map(|w| w.metrics.as_ref()).collect();
    if metrics.is_empty() {
        return None;
    }

    let sharpes: Vec<f64> = metrics
        .iter()
        .map(|m| if m.sharpe_ratio.is_nan() { 0.0 } else { m.sharpe_ratio })
        .map(|s| s.clamp(-scoring.ratio_cap, scoring.ratio_cap))
        .collect();
    let mean_sharpe = mean(&sharpes);
    let sharpe_dispersion = if sharpes.len() < 2 { 0.0 } else { sample_std(&sharpes) };

    let drawdowns: Vec<f64> = metrics
        .iter()
        .map(|m| m.max_drawdown)
        .filter(|d| d.is_finite())
        .collect();
    let mean_drawdown = if drawdowns.is_empty() { 0.0 } else { mean(&drawdowns) };

    let trades: Vec<f64> = metrics.iter().map(|m| m.num_trades as f64).collect();
    let trade_penalty = if mean(&trades) < scoring.min_trades {
        scoring.low_trade_penalty
    } else {
        0.0
    };

    Some(
        scoring.sharpe_weight * mean_sharpe
            - scoring.drawdown_weight * mean_drawdown
            - scoring.instability_weight * stability
            - scoring.dispersion_weight * sharpe_dispersion
            - trade_penalty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window(index: usize) -> Window {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        Window {
            index,
            train_start: t,
            train_end: t,
            test_start: t,
            test_end: t,
        }
    }

    fn metrics(sharpe: f64, drawdown: f64, trades: usize) -> PerformanceMetrics {
        PerformanceMetrics {
            total_return: 0.1,
            annualized_return: 0.1,
            volatility: 0.2,
            sharpe_ratio: sharpe,
            sortino_ratio: sharpe,
            calmar_ratio: 1.0,
            max_drawdown: drawdown,
            value_at_risk: 0.02,
            conditional_var: 0.03,
            win_rate: 0.5,
            profit_factor: 1.5,
            max_consecutive_wins: 2,
            max_consecutive_losses: 2,
            num_trades: trades,
            average_trade: 1.0,
            largest_win: 2.0,
            largest_loss: -1.0,
            downside_deviation: 0.1,
            ulcer_index: 0.05,
            final_equity: 11000.0,
            rolling_dispersion: f64::NAN,
            normality_p_value: 0.5,
            return_autocorrelation: 0.0,
            parameter_stability: None,
        }
    }

    fn healthy(index: usize, n_fast: i64, m: PerformanceMetrics) -> WindowResult {
        WindowResult {
            window: window(index),
            parameters: Some(ParameterSet::new().with("n_fast", ParamValue::Int(n_fast))),
            in_sample_objective: Some(1.0),
            score: Some(m.sharpe_ratio),
            metrics: Some(m),
            train_bars: 100,
            test_bars: 25,
            degraded_reason: None,
        }
    }

    #[test]
    fn test_identical_parameters_are_stable() {
        let a = ParameterSet::new().with("n", ParamValue::Int(10));
        assert_eq!(parameter_stability(&[&a, &a, &a]), 0.0);

        let b = ParameterSet::new().with("n", ParamValue::Int(30));
        // mean 20, variance 100 -> 100 / 400
        assert!((parameter_stability(&[&a, &b]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_degraded_windows_are_excluded() {
        let scoring = ScoringConfig::default();
        let windows = vec![
            healthy(0, 10, metrics(1.0, 0.1, 5)),
            WindowResult::degraded(window(1), 0, 0, "empty train slice".to_string()),
            healthy(2, 10, metrics(1.0, 0.1, 5)),
        ];

        let result = aggregate("FixedSma", "SPY", windows, &scoring);
        assert_eq!(result.healthy_windows, 2);
        assert_eq!(result.degraded_windows, 1);
        assert_eq!(result.windows.len(), 3);
        // 1.0 * 1.0 - 1.0 * 0.1 - 0 - 0 - 0
        assert!((result.composite_score.unwrap() - 0.9).abs() < 1e-12);
        assert_eq!(result.metric("sharpe_ratio").unwrap().worst, 1.0);
        assert_eq!(result.windows[0].metrics.as_ref().unwrap().parameter_stability, Some(0.0));
    }

    #[test]
    fn test_all_degraded_has_no_score() {
        let windows = vec![WindowResult::degraded(window(0), 10, 0, "empty test slice".to_string())];
        let result = aggregate("FixedSma", "SPY", windows, &ScoringConfig::default());
        assert_eq!(result.composite_score, None);
        assert!(result.metrics.is_empty());
    }

    #[test]
    fn test_infinite_sharpe_is_capped_and_low_trades_penalised() {
        let scoring = ScoringConfig::default();
        let windows = vec![healthy(0, 10, metrics(f64::INFINITY, 0.0, 1))];
        let result = aggregate("FixedSma", "SPY", windows, &scoring);
        let expected = scoring.ratio_cap - scoring.low_trade_penalty;
        assert!((result.composite_score.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_idle_window_counts_as_zero_sharpe() {
        let scoring = ScoringConfig::default();
        let windows = vec![
            healthy(0, 10, metrics(2.0, 0.1, 5)),
            healthy(1, 10, metrics(f64::NAN, 0.0, 0)),
        ];
        let result = aggregate("FixedSma", "SPY", windows, &scoring);
        // mean Sharpe 1.0, mean drawdown 0.05, std(2, 0) = sqrt(2), 2.5 trades < 3
        let expected = 1.0 - 0.05 - 0.25 * 2f64.sqrt() - 0.5;
        assert!((result.composite_score.unwrap() - expected).abs() < 1e-12);

        // A strategy that never trades cannot outrank a modestly profitable one
        let idle = aggregate("Idle", "SPY", vec![healthy(0, 10, metrics(f64::NAN, 0.0, 0))], &scoring);
        let active = aggregate("Active", "SPY", vec![healthy(0, 10, metrics(0.8, 0.1, 5))], &scoring);
        assert!(active.composite_score > idle.composite_score);
    }
}
