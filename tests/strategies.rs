mod common;

use strategy_lab::functions::registry::StrategyKind;
use strategy_lab::types::{Bar, Position};

fn bars(seed: u64) -> Vec<Bar> {
    common::daily_series("SPY", common::day(2018, 1, 1), common::day(2020, 12, 31), seed)
        .bars()
        .to_vec()
}

#[test]
fn test_short_series_yields_no_signals() {
    let bars = bars(1);
    for kind in StrategyKind::ALL {
        let strategy = kind.strategy();
        let params = strategy.default_parameters();
        let lookback = strategy.min_lookback(&params);
        assert!(lookback > 0, "{} has no warm-up", kind);

        let signals = strategy.generate_signals(&bars[..lookback - 1], &params).unwrap();
        assert!(signals.is_empty(), "{} signalled during warm-up", kind);
    }
}

#[test]
fn test_signals_are_well_formed() {
    let bars = bars(2);
    for kind in StrategyKind::ALL {
        let strategy = kind.strategy();
        let params = strategy.default_parameters();
        let signals = strategy.generate_signals(&bars, &params).unwrap();

        let mut previous = Position::Flat;
        for pair in signals.windows(2) {
            assert!(pair[0].bar < pair[1].bar, "{} signals out of order", kind);
        }
        for signal in &signals {
            assert!(signal.bar > 0 && signal.bar < bars.len());
            assert_ne!(signal.target, previous, "{} repeated a target", kind);
            previous = signal.target;
        }
    }
}

#[test]
fn test_signals_are_deterministic() {
    let bars = bars(3);
    for kind in StrategyKind::ALL {
        let strategy = kind.strategy();
        let params = strategy.default_parameters();
        assert_eq!(
            strategy.generate_signals(&bars, &params).unwrap(),
            strategy.generate_signals(&bars, &params).unwrap(),
            "{} is not deterministic",
            kind
        );
    }
}

#[test]
fn test_signals_ignore_future_bars() {
    let bars = bars(4);
    let cut = bars.len() * 2 / 3;
    for kind in StrategyKind::ALL {
        let strategy = kind.strategy();
        let params = strategy.default_parameters();
        let full = strategy.generate_signals(&bars, &params).unwrap();
        let prefix = strategy.generate_signals(&bars[..cut], &params).unwrap();

        let full_before_cut: Vec<_> = full.into_iter().filter(|s| s.bar < cut).collect();
        assert_eq!(prefix, full_before_cut, "{} looked ahead", kind);
    }
}

#[test]
fn test_inconsistent_parameters_are_rejected() {
    let strategy = StrategyKind::SmaCross.strategy();
    let params = strategy
        .default_parameters()
        .with("n_fast", strategy_lab::types::ParamValue::Int(60))
        .with("n_slow", strategy_lab::types::ParamValue::Int(30));
    assert!(!strategy.validate_parameters(&params));
}
