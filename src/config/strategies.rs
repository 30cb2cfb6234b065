use super::traits::ConfigSection;
use crate::error::{LabError, Result};
use crate::functions::registry::StrategyKind;
use crate::types::ParameterSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyEntry {
    pub enabled: bool,
    /// Overrides applied on top of the strategy's defaults
    pub parameters: ParameterSet,
}

impl Default for StrategyEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            parameters: ParameterSet::new(),
        }
    }
}

/// Strategy name -> enable flag and parameter overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategiesConfig(pub BTreeMap<String, StrategyEntry>);

impl Default for StrategiesConfig {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        for kind in [StrategyKind::FixedSma, StrategyKind::SmaCross, StrategyKind::Macd] {
            entries.insert(kind.name().to_string(), StrategyEntry::default());
        }
        Self(entries)
    }
}

impl StrategiesConfig {
    /// Enabled strategies with their effective parameters, in name order
    pub fn enabled(&self) -> Result<Vec<(StrategyKind, ParameterSet)>> {
        let mut out = Vec::new();
        for (name, entry) in &self.0 {
            if !entry.enabled {
                continue;
            }
            let kind: StrategyKind = name.parse()?;
            let params = kind.strategy().default_parameters().merged(&entry.parameters);
            out.push((kind, params));
        }
        Ok(out)
    }

    /// Defaults plus configured overrides, whether or not the strategy is enabled
    pub fn parameters_for(&self, kind: StrategyKind) -> ParameterSet {
        let defaults = kind.strategy().default_parameters();
        match self.0.get(kind.name()) {
            Some(entry) => defaults.merged(&entry.parameters),
            None => defaults,
        }
    }
}

impl ConfigSection for StrategiesConfig {
    fn section_name() -> &'static str {
        "strategies"
    }

    fn validate(&self) -> Result<()> {
        let enabled = self.enabled()?;
        if enabled.is_empty() {
            return Err(LabError::Configuration(
                "No strategy is enabled".to_string(),
            ));
        }
        for (kind, params) in &enabled {
            if !kind.strategy().validate_parameters(params) {
                return Err(LabError::Configuration(format!(
                    "Inconsistent parameters for {}: {}",
                    kind, params
                )));
            }
        }
        Ok(())
    }
}
