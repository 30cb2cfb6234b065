pub mod connectors;
pub mod provider;

pub use connectors::{CsvConnector, CsvDataProvider, DataValidator};
pub use provider::{DataProvider, InMemoryProvider};
