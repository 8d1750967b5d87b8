pub mod aggregate;
pub mod run;

pub use aggregate::{AggregateArgs, AggregateCommand};
pub use run::{RunArgs, RunCommand};
