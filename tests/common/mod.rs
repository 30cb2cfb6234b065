#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strategy_lab::types::{Bar, PriceSeries};

pub fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
}

pub fn bar(timestamp: DateTime<Utc>, close: f64) -> Bar {
    Bar {
        timestamp,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1_000.0,
    }
}

/// Seeded random walk with slow sinusoidal trends, one bar per calendar day.
/// The last 80 days of every 180 are a quiet, steady climb, and about one
/// day in eight trades on heavy volume.
pub fn daily_series(instrument: &str, start: DateTime<Utc>, end: DateTime<Utc>, seed: u64) -> PriceSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bars = Vec::new();
    let mut close = 100.0;
    let mut ts = start;
    let mut i = 0usize;

    while ts <= end {
        let quiet = i % 180 >= 100;
        let (drift, shock, spread) = if quiet {
            (0.0015, rng.gen_range(-0.001..0.001), rng.gen_range(0.0003..0.001))
        } else {
            (
                0.002 * (i as f64 / 90.0).sin(),
                rng.gen_range(-0.015..0.015),
                rng.gen_range(0.002..0.02),
            )
        };
        let open = close;
        close = (close * (1.0 + drift + shock)).max(1.0);
        let spread = close * spread;
        let volume = if rng.gen_bool(0.12) {
            rng.gen_range(3_500.0..5_000.0)
        } else {
            rng.gen_range(500.0..1_500.0)
        };
        bars.push(Bar {
            timestamp: ts,
            open,
            high: open.max(close) + spread,
            low: (open.min(close) - spread).max(0.5),
            close,
            volume,
        });
        ts += Duration::days(1);
        i += 1;
    }

    PriceSeries::new(instrument, bars).unwrap()
}

/// 2014-01-01 through 2023-12-31, daily
pub fn ten_year_series(seed: u64) -> PriceSeries {
    daily_series("SPY", day(2014, 1, 1), day(2023, 12, 31), seed)
}
