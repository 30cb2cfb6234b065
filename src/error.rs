use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("No viable parameter set in window {window}: {reason}")]
    NoViableParameters { window: usize, reason: String },

    #[error("Data unavailable for {instrument}: {reason}")]
    DataUnavailable { instrument: String, reason: String },

    #[error("Stale baseline for {strategy}: expected version {expected}, found {found}")]
    StaleBaseline {
        strategy: String,
        expected: u64,
        found: u64,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Run aborted before completion")]
    Aborted,

    #[error("History corrupted at line {line}: {reason}")]
    HistoryCorrupted { line: usize, reason: String },

    #[error("Checksum mismatch at line {line}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        line: usize,
        expected: String,
        actual: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error(transparent)]
    Indicator(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LabError>;
