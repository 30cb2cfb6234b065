use super::aggregate::{aggregate, AggregateResult, WindowResult};
use super::progress::{CancellationToken, ProgressCallback, SilentProgress};
use super::search::ParameterSpace;
use super::splitters::{DataSplitter, WalkForwardSplitter, Window};
use crate::config::{AppConfig, ScoringConfig};
use crate::engines::evaluation::Backtester;
use crate::engines::metrics::{MetricsEngine, Objective, PerformanceMetrics};
use crate::error::{LabError, Result};
use crate::functions::strategy::Strategy;
use crate::types::{Bar, ParameterSet, PriceSeries};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Rolling train/test evaluation of a strategy over a parameter space.
///
/// Each run goes through three phases:
/// 1. score every candidate on every window's train slice,
/// 2. pick one candidate per window in window order, since the tie-break
///    depends on the previous window's choice,
/// 3. simulate each choice on its test slice, with the strategy's
///    `min_lookback` preceding bars as indicator history only.
///
/// Phases 1 and 3 run on the rayon pool when `parallel` is set; results are
/// gathered in window order either way.
pub struct WalkForwardEngine {
    splitter: WalkForwardSplitter,
    backtester: Backtester,
    metrics: MetricsEngine,
    objective: Objective,
    scoring: ScoringConfig,
    variations: Vec<f64>,
    parallel: bool,
    cancel: CancellationToken,
}

/// Train-phase outcome of one window
enum TrainOutcome {
    /// `(candidate index, objective)` for every candidate that passed
    Viable(Vec<(usize, f64)>),
    Degraded(String),
}

impl WalkForwardEngine {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            splitter: WalkForwardSplitter::from_config(&config.walk_forward),
            backtester: Backtester::from_config(&config.backtesting),
            metrics: MetricsEngine::from_config(config.backtesting.initial_cash, &config.metrics),
            objective: config.walk_forward.objective,
            scoring: config.scoring.clone(),
            variations: config.walk_forward.variations.clone(),
            parallel: config.walk_forward.parallel,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Multipliers used to build search neighbourhoods
    pub fn variations(&self) -> &[f64] {
        &self.variations
    }

    /// Neighbourhood of `center` restricted to parameter sets the strategy accepts
    pub fn search_space(&self, strategy: &dyn Strategy, center: &ParameterSet) -> ParameterSpace {
        ParameterSpace::around(center, &strategy.parameter_specs(), &self.variations).retain_valid(strategy)
    }

    pub fn run(
        &self,
        series: &PriceSeries,
        strategy: &dyn Strategy,
        space: &ParameterSpace,
    ) -> Result<AggregateResult> {
        self.run_with_progress(series, strategy, space, &mut SilentProgress)
    }

    pub fn run_with_progress(
        &self,
        series: &PriceSeries,
        strategy: &dyn Strategy,
        space: &ParameterSpace,
        progress: &mut dyn ProgressCallback,
    ) -> Result<AggregateResult> {
        if space.is_empty() {
            return Err(LabError::Validation(format!(
                "Empty parameter space for {}",
                strategy.name()
            )));
        }

        let windows = self.splitter.split(series)?;
        log::info!(
            "Walk-forward {} on {}: {} windows, {} candidates",
            strategy.name(),
            series.instrument(),
            windows.len(),
            space.len()
        );
        progress.on_run_start(strategy.name(), windows.len());

        // Phase 1
        let trained = self.map_windows(&windows, |window| {
            self.check_cancelled()?;
            Ok(self.train(series, strategy, space, window))
        })?;

        // Phase 2
        let mut previous: Option<&ParameterSet> = None;
        let mut selections: Vec<(Window, std::result::Result<(usize, f64), String>)> = Vec::new();
        for (window, outcome) in windows.iter().zip(trained) {
            self.check_cancelled()?;
            let selection = match outcome {
                TrainOutcome::Viable(scored) => {
                    let chosen = select(&scored, space.candidates(), previous);
                    previous = Some(&space.candidates()[chosen.0]);
                    Ok(chosen)
                }
                TrainOutcome::Degraded(reason) => Err(reason),
            };
            selections.push((*window, selection));
        }

        // Phase 3
        let results = self.map_windows(&selections, |(window, selection)| {
            self.check_cancelled()?;
            Ok(self.test(series, strategy, space, window, selection))
        })?;

        for result in &results {
            if let Some(reason) = &result.degraded_reason {
                log::warn!(
                    "{} on {} window {} degraded: {}",
                    strategy.name(),
                    series.instrument(),
                    result.window.index,
                    reason
                );
            }
            progress.on_window_complete(result.window.index, windows.len(), result.score);
        }

        let aggregate = aggregate(strategy.name(), series.instrument(), results, &self.scoring);
        progress.on_run_complete(aggregate.composite_score);
        log::info!(
            "{} on {}: composite {:?}, {} healthy / {} degraded windows",
            strategy.name(),
            series.instrument(),
            aggregate.composite_score,
            aggregate.healthy_windows,
            aggregate.degraded_windows
        );
        Ok(aggregate)
    }

    /// One full-sample simulation, no windowing
    pub fn evaluate(&self, bars: &[Bar], strategy: &dyn Strategy, params: &ParameterSet) -> Result<PerformanceMetrics> {
        self.evaluate_from(bars, 0, strategy, params)
    }

    /// Simulation of `bars[start..]` warmed up on `bars[..start]`
    pub fn evaluate_from(
        &self,
        bars: &[Bar],
        start: usize,
        strategy: &dyn Strategy,
        params: &ParameterSet,
    ) -> Result<PerformanceMetrics> {
        let simulation = self.backtester.run_from(strategy, bars, start, params)?;
        Ok(self.metrics.calculate_all(&simulation))
    }

    pub fn metrics_engine(&self) -> &MetricsEngine {
        &self.metrics
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LabError::Aborted);
        }
        Ok(())
    }

    fn map_windows<W, T, F>(&self, items: &[W], f: F) -> Result<Vec<T>>
    where
        W: Sync,
        T: Send,
        F: Fn(&W) -> Result<T> + Sync + Send,
    {
        if self.parallel {
            items.par_iter().map(f).collect()
        } else {
            items.iter().map(f).collect()
        }
    }

    fn train(
        &self,
        series: &PriceSeries,
        strategy: &dyn Strategy,
        space: &ParameterSpace,
        window: &Window,
    ) -> TrainOutcome {
        let train = series.slice(window.train_start, window.train_end);
        if train.is_empty() {
            return TrainOutcome::Degraded(
                LabError::InsufficientData(format!("window {} has an empty train slice", window.index)).to_string(),
            );
        }

        let scored: Vec<(usize, f64)> = space
            .candidates()
            .iter()
            .enumerate()
            .filter_map(|(i, params)| self.objective_on(train, strategy, params).map(|v| (i, v)))
            .collect();

        if scored.is_empty() {
            return TrainOutcome::Degraded(
                LabError::NoViableParameters {
                    window: window.index,
                    reason: format!("none of {} candidates traded with a defined objective", space.len()),
                }
                .to_string(),
            );
        }

        TrainOutcome::Viable(scored)
    }

    /// In-sample objective, or None when the candidate fails it
    fn objective_on(&self, bars: &[Bar], strategy: &dyn Strategy, params: &ParameterSet) -> Option<f64> {
        let metrics = match self.evaluate(bars, strategy, params) {
            Ok(metrics) => metrics,
            Err(e) => {
                log::debug!("Candidate {} failed: {}", params, e);
                return None;
            }
        };

        let value = self.objective.evaluate(&metrics);
        if metrics.num_trades == 0 || value.is_nan() {
            return None;
        }
        Some(value)
    }

    fn test(
        &self,
        series: &PriceSeries,
        strategy: &dyn Strategy,
        space: &ParameterSpace,
        window: &Window,
        selection: &std::result::Result<(usize, f64), String>,
    ) -> WindowResult {
        let train_bars = series.slice(window.train_start, window.train_end).len();
        let test_bars = series.slice(window.test_start, window.test_end).len();

        let (index, in_sample) = match selection {
            Ok(chosen) => *chosen,
            Err(reason) => return WindowResult::degraded(*window, train_bars, test_bars, reason.clone()),
        };
        let params = &space.candidates()[index];

        if test_bars == 0 {
            let reason = LabError::InsufficientData(format!("window {} has an empty test slice", window.index));
            return WindowResult::degraded(*window, train_bars, 0, reason.to_string());
        }

        let history = strategy.min_lookback(params);
        let (bars, start) = series.slice_with_history(window.test_start, window.test_end, history);
        match self.evaluate_from(bars, start, strategy, params) {
            Ok(metrics) => WindowResult {
                window: *window,
                parameters: Some(params.clone()),
                in_sample_objective: Some(in_sample),
                score: Some(self.objective.evaluate(&metrics)),
                metrics: Some(metrics),
                train_bars,
                test_bars,
                degraded_reason: None,
            },
            Err(e) => WindowResult::degraded(*window, train_bars, test_bars, e.to_string()),
        }
    }
}

/// Best objective; ties go to the candidate closest to `previous`, then to
/// the lowest index (candidates are in canonical order).
fn select(scored: &[(usize, f64)], candidates: &[ParameterSet], previous: Option<&ParameterSet>) -> (usize, f64) {
    let distance = |i: usize| previous.map(|p| candidates[i].distance(p)).unwrap_or(0.0);

    let mut best = scored[0];
    for &(i, value) in &scored[1..] {
        let better = match value.total_cmp(&best.1) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => match distance(i).total_cmp(&distance(best.0)) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => i < best.0,
            },
        };
        if better {
            best = (i, value);
        }
    }
    best
}
