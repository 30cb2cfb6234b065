pub mod engine;
pub mod profitability;
pub mod returns;
pub mod risk;
pub mod stability;

pub use engine::{MetricsEngine, Objective, PerformanceMetrics};
pub use profitability::ProfitabilityMetrics;
pub use risk::RiskMetrics;
pub use stability::StabilityMetrics;
