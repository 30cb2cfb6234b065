use crate::config::AppConfig;
use crate::data::DataProvider;
use crate::engines::optimisation::{AggregateResult, ProgressCallback, SilentProgress, WalkForwardEngine};
use crate::error::{LabError, Result};
use crate::functions::registry::StrategyKind;
use crate::types::ParameterSet;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};

/// Per-instrument result of a batch run
#[derive(Debug, Clone)]
pub enum InstrumentOutcome {
    Completed {
        instrument: String,
        results: Vec<AggregateResult>,
    },
    Failed {
        instrument: String,
        reason: String,
    },
}

impl InstrumentOutcome {
    pub fn instrument(&self) -> &str {
        match self {
            InstrumentOutcome::Completed { instrument, .. } | InstrumentOutcome::Failed { instrument, .. } => {
                instrument
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, InstrumentOutcome::Failed { .. })
    }
}

pub fn run_backtests(
    config: &AppConfig,
    provider: &dyn DataProvider,
    strategies: &[(StrategyKind, ParameterSet)],
) -> Result<Vec<InstrumentOutcome>> {
    run_backtests_with_progress(config, provider, strategies, &mut SilentProgress)
}

/// Walk-forward every strategy on every configured instrument.
///
/// Missing data or too-short series fail that instrument only; configuration
/// errors and cancellation abort the whole batch.
pub fn run_backtests_with_progress(
    config: &AppConfig,
    provider: &dyn DataProvider,
    strategies: &[(StrategyKind, ParameterSet)],
    progress: &mut dyn ProgressCallback,
) -> Result<Vec<InstrumentOutcome>> {
    if strategies.is_empty() {
        return Err(LabError::Configuration("No strategy is enabled".to_string()));
    }
    config.validate()?;

    let engine = WalkForwardEngine::from_config(config);
    let start = config.backtesting.start_date.map(midnight);
    // The configured end date is inclusive
    let end = config
        .backtesting
        .end_date
        .and_then(|d| d.checked_add_days(Days::new(1)))
        .map(midnight);

    let mut outcomes = Vec::with_capacity(config.backtesting.instruments.len());
    for instrument in &config.backtesting.instruments {
        let series = match provider.fetch(instrument, start, end) {
            Ok(series) => series,
            Err(e @ LabError::DataUnavailable { .. }) => {
                log::warn!("Skipping {}: {}", instrument, e);
                outcomes.push(InstrumentOutcome::Failed {
                    instrument: instrument.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };
        log::info!("Loaded {} bars for {}", series.len(), instrument);

        let mut results = Vec::with_capacity(strategies.len());
        let mut failure = None;
        for (kind, params) in strategies {
            let strategy = kind.strategy();
            let space = engine.search_space(strategy, params);
            match engine.run_with_progress(&series, strategy, &space, progress) {
                Ok(result) => results.push(result),
                Err(e @ LabError::InsufficientData(_)) => {
                    log::warn!("Skipping {}: {}", instrument, e);
                    failure = Some(e.to_string());
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        outcomes.push(match failure {
            Some(reason) => InstrumentOutcome::Failed {
                instrument: instrument.clone(),
                reason,
            },
            None => InstrumentOutcome::Completed {
                instrument: instrument.clone(),
                results,
            },
        });
    }

    Ok(outcomes)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::default()).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryProvider;

    #[test]
    fn test_missing_instrument_is_contained() {
        let mut config = AppConfig::default();
        config.backtesting.instruments = vec!["MISSING".to_string()];
        let strategies = config.strategies.enabled().unwrap();

        let outcomes = run_backtests(&config, &InMemoryProvider::new(), &strategies).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_failed());
        assert_eq!(outcomes[0].instrument(), "MISSING");
    }

    fn cycling_series(instrument: &str, days: i64) -> crate::types::PriceSeries {
        let start = midnight(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let bars = (0..days)
            .map(|i| {
                let close = 100.0 + 10.0 * (i as f64 / 15.0).sin() + 0.01 * i as f64;
                crate::types::Bar {
                    timestamp: start + chrono::Duration::days(i),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000.0,
                }
            })
            .collect();
        crate::types::PriceSeries::new(instrument, bars).unwrap()
    }

    #[test]
    fn test_short_series_fails_only_that_instrument() {
        let provider = InMemoryProvider::new().with_series(cycling_series("SHORT", 120));

        let mut config = AppConfig::default();
        config.backtesting.instruments = vec!["SHORT".to_string(), "MISSING".to_string()];
        let strategies = config.strategies.enabled().unwrap();

        let outcomes = run_backtests(&config, &provider, &strategies).unwrap();
        let names: Vec<&str> = outcomes.iter().map(InstrumentOutcome::instrument).collect();
        assert_eq!(names, ["SHORT", "MISSING"]);
        assert!(outcomes.iter().all(InstrumentOutcome::is_failed));
    }

    #[test]
    fn test_missing_instrument_does_not_stop_the_batch() {
        let provider = InMemoryProvider::new().with_series(cycling_series("SPY", 3 * 365 + 1));

        let mut config = AppConfig::default();
        config.backtesting.instruments = vec!["MISSING".to_string(), "SPY".to_string()];
        let kind = StrategyKind::FixedSma;
        let strategies = vec![(kind, config.strategies.parameters_for(kind))];

        let outcomes = run_backtests(&config, &provider, &strategies).unwrap();
        assert_eq!(outcomes.len(), 2);
        match &outcomes[0] {
            InstrumentOutcome::Failed { instrument, reason } => {
                assert_eq!(instrument, "MISSING");
                assert!(reason.contains("MISSING"), "{}", reason);
            }
            other => panic!("expected MISSING to fail, got {:?}", other),
        }
        match &outcomes[1] {
            InstrumentOutcome::Completed { instrument, results } => {
                assert_eq!(instrument, "SPY");
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].strategy, "FixedSma");
                assert_eq!(results[0].windows.len(), 2);
            }
            other => panic!("expected SPY to complete, got {:?}", other),
        }
    }

    #[test]
    fn test_no_strategies_is_fatal() {
        let provider = InMemoryProvider::new().with_series(cycling_series("SPY", 3 * 365 + 1));
        let config = AppConfig::default();
        assert!(matches!(
            run_backtests(&config, &provider, &[]),
            Err(LabError::Configuration(_))
        ));
    }

    #[test]
    fn test_midnight() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        assert_eq!(midnight(date).to_rfc3339(), "2020-01-02T00:00:00+00:00");
    }
}
