use super::{
    backtesting::BacktestingConfig, improvement::ImprovementConfig, metrics::MetricsConfig,
    scoring::ScoringConfig, strategies::StrategiesConfig, traits::ConfigSection,
    walk_forward::WalkForwardConfig,
};
use crate::error::{LabError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Environment overrides look like `LAB_IMPROVEMENT__MODE=adoption`
pub const ENV_PREFIX: &str = "LAB";
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backtesting: BacktestingConfig,
    pub walk_forward: WalkForwardConfig,
    pub scoring: ScoringConfig,
    pub metrics: MetricsConfig,
    pub improvement: ImprovementConfig,
    pub strategies: StrategiesConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.backtesting.validate()?;
        self.walk_forward.validate()?;
        self.scoring.validate()?;
        self.metrics.validate()?;
        self.improvement.validate()?;
        self.strategies.validate()?;
        Ok(())
    }

    /// Build from an optional TOML/JSON file layered under `LAB_*`
    /// environment overrides. Missing keys fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(LabError::Configuration(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config = AppConfig::load(Some(path.as_ref()))?;
        log::info!(
            "Loaded config from {} ({} strategies)",
            path.as_ref().display(),
            config.strategies.0.len()
        );

        *self.config.write().map_err(|_| poisoned())? = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config = self.config.read().map_err(|_| poisoned())?;
        let toml_str = toml::to_string_pretty(&*config)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn get(&self) -> Result<AppConfig> {
        Ok(self.config.read().map_err(|_| poisoned())?.clone())
    }

    /// Apply `f` and keep the result only if it still validates
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.config.write().map_err(|_| poisoned())?;
        let mut candidate = config.clone();
        f(&mut candidate);
        candidate.validate()?;
        *config = candidate;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> LabError {
    LabError::Validation("Config lock poisoned".to_string())
}
