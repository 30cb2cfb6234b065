use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A named, self-validating block of the application config
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn section_name() -> &'static str;
    fn validate(&self) -> Result<()>;
}
