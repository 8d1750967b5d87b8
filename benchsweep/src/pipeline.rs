use crate::{
    aggregate::{Aggregator, Summary},
    executor::Executor,
    parser::{Parsed, ResultParser},
    runner::Runner,
    sweep::{Sweep, WorkItem},
};

/// Result of a complete sweep.
#[derive(Debug)]
pub struct SweepReport {
    pub summary: Summary,
    pub executed: usize,
    pub skipped: usize,
}

/// Sweep → executor → parser → aggregator.
///
/// Every planned item is registered with the aggregator up front, so keys
/// whose items never ran (after a stop) still show up in the summary.
/// `on_outcome` sees each parsed outcome in completion order.
pub fn run_sweep<R, F>(
    sweep: &Sweep,
    executor: &Executor,
    runner: &R,
    mut aggregator: Aggregator,
    mut on_outcome: F,
) -> SweepReport
where
    R: Runner + ?Sized,
    F: FnMut(&WorkItem, &Parsed),
{
    let items: Vec<_> = sweep.items().collect();
    for item in &items {
        aggregator.schedule(item.key());
    }

    let parser = ResultParser::new(sweep.key_fields());
    let execution = executor.run_with(items, runner, |item, outcome| {
        let parsed = parser.parse(outcome);
        match &parsed {
            Ok(record) => log::info!("{}: {} ms", item.id(), record.duration_ms),
            Err(failure) => log::warn!("{}: {failure:?}", item.id()),
        }
        on_outcome(item, &parsed);
        aggregator.record(item.key(), &parsed);
    });

    SweepReport {
        summary: aggregator.finish(),
        executed: execution.outcomes.len(),
        skipped: execution.skipped.len(),
    }
}
