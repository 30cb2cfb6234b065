pub mod indicators;
pub mod registry;
pub mod strategies;
pub mod strategy;
