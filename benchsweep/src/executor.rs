use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
};

use crate::{
    error::{ConfigError, Result},
    runner::{RawOutcome, Runner},
    sweep::WorkItem,
};

/// Shared flag asking the executor to stop handing out work.
///
/// Raising it never interrupts a running solver; those finish or hit their
/// own deadline.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a sweep produced.
#[derive(Debug, Default)]
pub struct Execution {
    /// One entry per executed item, in completion order.
    pub outcomes: Vec<(WorkItem, RawOutcome)>,
    /// Items never started because the stop signal was raised.
    pub skipped: Vec<WorkItem>,
    /// Submission position of each entry in `outcomes`.
    positions: Vec<usize>,
}

impl Execution {
    #[must_use]
    pub fn was_stopped(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// Outcomes back in the order their items were submitted.
    #[must_use]
    pub fn sorted_outcomes(&self) -> Vec<&(WorkItem, RawOutcome)> {
        let mut sorted: Vec<_> = self.positions.iter().zip(&self.outcomes).collect();
        sorted.sort_by_key(|&(position, _)| *position);
        sorted.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

/// Bounded pool of worker threads pulling items from a shared queue.
#[derive(Debug, Clone)]
pub struct Executor {
    jobs: usize,
    stop: StopSignal,
}

impl Executor {
    pub fn new(jobs: usize) -> Result<Self> {
        if jobs == 0 {
            return Err(ConfigError::InvalidValue(
                "jobs must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            jobs,
            stop: StopSignal::new(),
        })
    }

    /// One worker per available hardware thread.
    #[must_use]
    pub fn with_default_parallelism() -> Self {
        Self {
            jobs: default_jobs(),
            stop: StopSignal::new(),
        }
    }

    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    #[must_use]
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn run<I, R>(&self, items: I, runner: &R) -> Execution
    where
        I: IntoIterator<Item = WorkItem>,
        I::IntoIter: Send,
        R: Runner + ?Sized,
    {
        self.run_with(items, runner, |_, _| {})
    }

    /// Runs every item, calling `on_outcome` on the calling thread as each
    /// one completes.
    pub fn run_with<I, R, F>(&self, items: I, runner: &R, mut on_outcome: F) -> Execution
    where
        I: IntoIterator<Item = WorkItem>,
        I::IntoIter: Send,
        R: Runner + ?Sized,
        F: FnMut(&WorkItem, &RawOutcome),
    {
        let items = items.into_iter();
        let workers = self.worker_count(items.size_hint());
        let queue = Mutex::new(items.enumerate());
        let (tx, rx) = mpsc::channel();
        let mut outcomes = Vec::new();
        let mut positions = Vec::new();

        thread::scope(|scope| {
            for worker in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let stop = &self.stop;
                scope.spawn(move || {
                    loop {
                        let next = {
                            let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                            if stop.is_raised() {
                                break;
                            }
                            queue.next()
                        };
                        let Some((position, item)) = next else {
                            break;
                        };

                        log::info!("Starting {} (worker {worker})", item.id());
                        let outcome = runner.run(&item);
                        if tx.send((position, item, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for (position, item, outcome) in rx {
                on_outcome(&item, &outcome);
                positions.push(position);
                outcomes.push((item, outcome));
            }
        });

        let skipped: Vec<_> = queue
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|(_, item)| item)
            .collect();
        if !skipped.is_empty() {
            log::warn!(
                "Stopped early: {} items completed, {} never started",
                outcomes.len(),
                skipped.len()
            );
        }

        Execution {
            outcomes,
            skipped,
            positions,
        }
    }

    /// No more workers than there can be items.
    fn worker_count(&self, size_hint: (usize, Option<usize>)) -> usize {
        match size_hint {
            (_, Some(upper)) => self.jobs.min(upper.max(1)),
            (_, None) => self.jobs,
        }
    }
}

#[must_use]
pub fn default_jobs() -> usize {
    thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::SizeSweep;
    use std::{
        collections::BTreeSet,
        sync::atomic::AtomicUsize,
        time::{Duration, Instant},
    };

    /// Sleeps for a fixed time and reports it as the duration.
    struct MockRunner {
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        stop_on_call: Option<(usize, StopSignal)>,
    }

    impl MockRunner {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                stop_on_call: None,
            }
        }

        fn stopping_on(mut self, call: usize, stop: StopSignal) -> Self {
            self.stop_on_call = Some((call, stop));
            self
        }
    }

    impl Runner for MockRunner {
        fn run(&self, item: &WorkItem) -> RawOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((at, stop)) = &self.stop_on_call
                && call == *at
            {
                stop.raise();
            }

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            RawOutcome::Completed(format!("{} {}", item.arg(), self.delay.as_millis()))
        }
    }

    fn items(count: u64) -> Vec<WorkItem> {
        SizeSweep::new(1, count, 1, 1).unwrap().items().collect()
    }

    #[test]
    fn every_item_yields_exactly_one_outcome() {
        for jobs in [1, 3, 8, 64] {
            let runner = MockRunner::new(Duration::from_millis(1));
            let execution = Executor::new(jobs).unwrap().run(items(25), &runner);

            assert_eq!(execution.outcomes.len(), 25);
            assert!(execution.skipped.is_empty());
            let ids: BTreeSet<_> = execution.outcomes.iter().map(|(i, _)| i.id()).collect();
            assert_eq!(ids.len(), 25);
            assert_eq!(runner.calls.load(Ordering::SeqCst), 25);
        }
    }

    #[test]
    fn outcomes_stay_paired_with_their_items() {
        let runner = MockRunner::new(Duration::from_millis(2));
        let execution = Executor::new(4).unwrap().run(items(12), &runner);
        for (item, outcome) in &execution.outcomes {
            assert_eq!(outcome, &RawOutcome::Completed(format!("{} 2", item.arg())));
        }

        let sorted: Vec<_> = execution
            .sorted_outcomes()
            .iter()
            .map(|(item, _)| item.id().to_string())
            .collect();
        let expected: Vec<_> = items(12).iter().map(|i| i.id().to_string()).collect();
        assert_eq!(sorted, expected);
        assert_eq!(sorted[1], "n=2#0");
        assert_eq!(sorted[9], "n=10#0");
    }

    #[test]
    fn sorted_outcomes_follow_submission_order_across_trials() {
        let items: Vec<_> = SizeSweep::new(1, 12, 1, 12).unwrap().items().collect();
        let runner = MockRunner::new(Duration::from_millis(1));
        let execution = Executor::new(5).unwrap().run(items.clone(), &runner);

        let sorted: Vec<_> = execution
            .sorted_outcomes()
            .iter()
            .map(|(item, _)| item.id().to_string())
            .collect();
        let expected: Vec<_> = items.iter().map(|i| i.id().to_string()).collect();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn pool_never_outnumbers_items() {
        let executor = Executor::new(64).unwrap();
        assert_eq!(executor.worker_count((4, Some(4))), 4);
        assert_eq!(executor.worker_count((0, Some(0))), 1);
        assert_eq!(executor.worker_count((0, None)), 64);
        assert_eq!(Executor::new(2).unwrap().worker_count((10, Some(10))), 2);

        let runner = MockRunner::new(Duration::from_millis(1));
        let execution = executor.run(items(4), &runner);
        assert_eq!(execution.outcomes.len(), 4);
    }

    #[test]
    fn single_worker_serializes_runs() {
        let runner = MockRunner::new(Duration::from_millis(40));
        let started = Instant::now();
        let execution = Executor::new(1).unwrap().run(items(5), &runner);

        assert_eq!(execution.outcomes.len(), 5);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enough_workers_run_everything_at_once() {
        let runner = MockRunner::new(Duration::from_millis(200));
        let started = Instant::now();
        let execution = Executor::new(8).unwrap().run(items(5), &runner);

        assert_eq!(execution.outcomes.len(), 5);
        // Sum of the runs is one second; the slowest single run is 200ms.
        assert!(started.elapsed() < Duration::from_millis(700));
        assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn concurrency_never_exceeds_limit() {
        let runner = MockRunner::new(Duration::from_millis(5));
        Executor::new(3).unwrap().run(items(30), &runner);
        assert!(runner.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn stop_signal_prevents_new_work() {
        let stop = StopSignal::new();
        let runner = MockRunner::new(Duration::from_millis(5)).stopping_on(3, stop.clone());
        let execution = Executor::new(1)
            .unwrap()
            .with_stop_signal(stop)
            .run(items(10), &runner);

        // The item that raised the signal still completes.
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(execution.outcomes.len(), 3);
        assert_eq!(execution.skipped.len(), 7);
        assert!(execution.was_stopped());
        assert_eq!(execution.skipped[0].id(), "n=4#0");
    }

    #[test]
    fn stop_with_many_workers_bounds_extra_work() {
        let stop = StopSignal::new();
        let runner = MockRunner::new(Duration::from_millis(20)).stopping_on(2, stop.clone());
        let execution = Executor::new(4)
            .unwrap()
            .with_stop_signal(stop)
            .run(items(40), &runner);

        let calls = runner.calls.load(Ordering::SeqCst);
        assert!(calls <= 2 + 3, "started {calls} runs after stop");
        assert_eq!(execution.outcomes.len(), calls);
        assert_eq!(execution.outcomes.len() + execution.skipped.len(), 40);
    }

    #[test]
    fn raised_signal_runs_nothing() {
        let stop = StopSignal::new();
        stop.raise();
        let runner = MockRunner::new(Duration::from_millis(1));
        let execution = Executor::new(2)
            .unwrap()
            .with_stop_signal(stop)
            .run(items(4), &runner);

        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        assert!(execution.outcomes.is_empty());
        assert_eq!(execution.skipped.len(), 4);
    }

    #[test]
    fn callback_sees_each_outcome() {
        let runner = MockRunner::new(Duration::from_millis(1));
        let mut seen = Vec::new();
        let execution = Executor::new(2)
            .unwrap()
            .run_with(items(6), &runner, |item, _| seen.push(item.id().to_string()));
        assert_eq!(seen.len(), execution.outcomes.len());
    }

    #[test]
    fn zero_jobs_is_rejected() {
        assert!(matches!(Executor::new(0), Err(ConfigError::InvalidValue(_))));
        assert!(Executor::with_default_parallelism().jobs() >= 1);
    }
}
