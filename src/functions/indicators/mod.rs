//! Bar-by-bar indicator helpers used by the strategy variants.
//!
//! Every function returns a vector aligned with its input; positions inside
//! the warm-up period hold `f64::NAN`.

pub mod momentum;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use momentum::{macd, rsi, Macd};
pub use trend::{ema, rolling_max, rolling_min, sma};
pub use volatility::{atr, bollinger, keltner, rolling_std, Bands};
pub use volume::obv;

/// `true` when `a` crosses above `b` between bars `i - 1` and `i`
pub fn crossed_above(a: &[f64], b: &[f64], i: usize) -> bool {
    i > 0
        && [a[i], b[i], a[i - 1], b[i - 1]].iter().all(|v| v.is_finite())
        && a[i - 1] <= b[i - 1]
        && a[i] > b[i]
}

/// `true` when `a` crosses below `b` between bars `i - 1` and `i`
pub fn crossed_below(a: &[f64], b: &[f64], i: usize) -> bool {
    crossed_above(b, a, i)
}
