pub mod evaluation;
pub mod improvement;
pub mod metrics;
pub mod optimisation;
