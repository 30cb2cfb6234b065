use crate::error::{LabError, Result};
use crate::functions::strategies::{
    BollingerBands, DonchianChannel, FixedSma, Macd, Momentum, MovingAverageBreakout, Obv,
    RsiExtreme, RsiMomentum, SmaCross, Squeeze, VolumeBreakout,
};
use crate::functions::strategy::Strategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of bundled strategies.
///
/// Only used to look a strategy up by name; evaluation code takes a
/// `&dyn Strategy` and never matches on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StrategyKind {
    FixedSma,
    SmaCross,
    Momentum,
    MovingAverageBreakout,
    DonchianChannel,
    Macd,
    RsiMomentum,
    RsiExtreme,
    BollingerBands,
    Squeeze,
    VolumeBreakout,
    Obv,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 12] = [
        StrategyKind::FixedSma,
        StrategyKind::SmaCross,
        StrategyKind::Momentum,
        StrategyKind::MovingAverageBreakout,
        StrategyKind::DonchianChannel,
        StrategyKind::Macd,
        StrategyKind::RsiMomentum,
        StrategyKind::RsiExtreme,
        StrategyKind::BollingerBands,
        StrategyKind::Squeeze,
        StrategyKind::VolumeBreakout,
        StrategyKind::Obv,
    ];

    pub fn strategy(self) -> &'static dyn Strategy {
        match self {
            StrategyKind::FixedSma => &FixedSma,
            StrategyKind::SmaCross => &SmaCross,
            StrategyKind::Momentum => &Momentum,
            StrategyKind::MovingAverageBreakout => &MovingAverageBreakout,
            StrategyKind::DonchianChannel => &DonchianChannel,
            StrategyKind::Macd => &Macd,
            StrategyKind::RsiMomentum => &RsiMomentum,
            StrategyKind::RsiExtreme => &RsiExtreme,
            StrategyKind::BollingerBands => &BollingerBands,
            StrategyKind::Squeeze => &Squeeze,
            StrategyKind::VolumeBreakout => &VolumeBreakout,
            StrategyKind::Obv => &Obv,
        }
    }

    pub fn name(self) -> &'static str {
        self.strategy().name()
    }
}

impl FromStr for StrategyKind {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| LabError::UnknownStrategy(s.to_string()))
    }
}

impl TryFrom<String> for StrategyKind {
    type Error = LabError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<StrategyKind> for String {
    fn from(kind: StrategyKind) -> Self {
        kind.name().to_string()
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
