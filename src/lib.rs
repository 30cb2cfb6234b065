pub mod config;
pub mod data;
pub mod engines;
pub mod error;
pub mod functions;
pub mod runner;
pub mod types;

pub use error::{LabError, Result};
