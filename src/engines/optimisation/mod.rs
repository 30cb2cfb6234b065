//! Walk-forward optimisation: windowing, parameter search and aggregation.

pub mod aggregate;
pub mod progress;
pub mod search;
pub mod splitters;
pub mod walk_forward;

pub use aggregate::{AggregateResult, MetricSummary, WindowResult};
pub use progress::{CancellationToken, ConsoleProgressCallback, ProgressCallback, SilentProgress};
pub use search::ParameterSpace;
pub use splitters::{DataSplitter, WalkForwardSplitter, Window};
pub use walk_forward::WalkForwardEngine;
