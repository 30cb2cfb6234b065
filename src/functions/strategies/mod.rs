//! The concrete strategy variants.
//!
//! Each one only differs in signal logic; callers go through
//! [`crate::functions::strategy::Strategy`].

pub mod momentum;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use momentum::{Momentum, RsiExtreme, RsiMomentum};
pub use trend::{FixedSma, Macd, MovingAverageBreakout, SmaCross};
pub use volatility::{BollingerBands, DonchianChannel, Squeeze};
pub use volume::{Obv, VolumeBreakout};

use crate::types::ParameterSet;

pub(crate) fn int(params: &ParameterSet, name: &str, default: usize) -> usize {
    params.get_usize(name, default)
}
