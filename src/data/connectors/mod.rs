mod csv;
mod types;
mod validator;

pub use csv::{parse_timestamp, CsvConnector, CsvDataProvider};
pub use types::RequiredColumn;
pub use validator::DataValidator;
