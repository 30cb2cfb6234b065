pub mod backtesting;
pub mod improvement;
pub mod manager;
pub mod metrics;
pub mod scoring;
pub mod strategies;
pub mod traits;
pub mod walk_forward;

pub use backtesting::BacktestingConfig;
pub use improvement::{ImprovementConfig, OperatingMode};
pub use manager::{AppConfig, ConfigManager};
pub use metrics::MetricsConfig;
pub use scoring::ScoringConfig;
pub use strategies::{StrategiesConfig, StrategyEntry};
pub use traits::ConfigSection;
pub use walk_forward::{WalkForwardConfig, WindowSpan};
