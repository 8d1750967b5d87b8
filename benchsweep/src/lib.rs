pub mod aggregate;
pub mod error;
pub mod executor;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod sweep;

pub use aggregate::{AggregateRow, Aggregator, Histogram, HistogramBucket, HistogramSpec, Summary};
pub use error::ConfigError;
pub use executor::{Execution, Executor, StopSignal};
pub use parser::{Failure, Parsed, ResultParser, ResultRecord};
pub use pipeline::{SweepReport, run_sweep};
pub use runner::{ProcessRunner, RawOutcome, Runner};
pub use sweep::{GroupKey, InstanceSweep, SizeSweep, Sweep, WorkItem};
