use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use benchsweep::{
    Aggregator, Executor, GroupKey, HistogramSpec, InstanceSweep, RawOutcome, Runner, SizeSweep,
    StopSignal, Sweep, WorkItem, report, run_sweep,
};

fn make_temp_dir(prefix: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let suffix: u64 = rand::random();
    path.push(format!("{prefix}-{suffix}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

/// Queens-style solver: odd sizes time out, size 9 prints garbage.
struct FakeQueens;

impl Runner for FakeQueens {
    fn run(&self, item: &WorkItem) -> RawOutcome {
        let n: u64 = item.arg().parse().unwrap();
        match n {
            9 => RawOutcome::Completed("garbage".to_string()),
            n if n % 2 == 1 => RawOutcome::TimedOut,
            n => RawOutcome::Completed(format!("{n} {}", n * 100)),
        }
    }
}

#[test]
fn size_sweep_end_to_end() {
    let sweep = Sweep::Sizes(SizeSweep::new(4, 9, 1, 3).unwrap());
    let executor = Executor::new(4).unwrap();
    let aggregator = Aggregator::new(HistogramSpec::new(500, 1_000).unwrap());

    let mut log = Vec::new();
    let result = run_sweep(&sweep, &executor, &FakeQueens, aggregator, |item, parsed| {
        log.push(report::log_line(item.key(), parsed));
    });

    assert_eq!(result.executed, 18);
    assert_eq!(result.skipped, 0);
    assert_eq!(log.len(), 18);
    assert_eq!(log.iter().filter(|l| l.ends_with("timeout")).count(), 6);

    let mut summary = Vec::new();
    report::write_summary(&mut summary, &result.summary.rows).unwrap();
    assert_eq!(
        String::from_utf8(summary).unwrap(),
        "4 0 400\n5 3 -\n6 0 600\n7 3 -\n8 0 800\n9 3 -\n"
    );

    let mut histogram = Vec::new();
    report::write_histogram(&mut histogram, &result.summary.histogram).unwrap();
    assert_eq!(String::from_utf8(histogram).unwrap(), "0.5 3\n1.0 9\n");
}

/// Vertex-cover-style solver reading the graph shape from the item key.
struct FakeCover {
    calls: AtomicUsize,
    stop: StopSignal,
}

impl Runner for FakeCover {
    fn run(&self, item: &WorkItem) -> RawOutcome {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
            self.stop.raise();
        }
        let key = item.key().fields();
        RawOutcome::Completed(format!("{} {} {}", key[0], key[1], key[0] * key[1]))
    }
}

#[test]
fn instance_sweep_stopped_midway_still_reports_every_key() {
    let dir = make_temp_dir("benchsweep-pipeline");
    fs::write(dir.join("g1"), "0 1\n1 2\n").unwrap();
    fs::write(dir.join("g2"), "0 1\n1 2\n2 3\n").unwrap();
    fs::write(dir.join("g3"), "0 5\n").unwrap();
    fs::write(dir.join("g4"), "0 7\n1 7\n").unwrap();

    let sweep = Sweep::Instances(InstanceSweep::load(&dir, 1).unwrap());
    let stop = StopSignal::new();
    let executor = Executor::new(1).unwrap().with_stop_signal(stop.clone());
    let runner = FakeCover {
        calls: AtomicUsize::new(0),
        stop,
    };

    let result = run_sweep(
        &sweep,
        &executor,
        &runner,
        Aggregator::new(HistogramSpec::default()),
        |_, _| {},
    );

    assert_eq!(result.executed, 2);
    assert_eq!(result.skipped, 2);

    let rows = &result.summary.rows;
    let keys: Vec<_> = rows.iter().map(|r| r.key.clone()).collect();
    assert_eq!(
        keys,
        [
            GroupKey::from([3, 2]),
            GroupKey::from([4, 3]),
            GroupKey::from([6, 1]),
            GroupKey::from([8, 2]),
        ]
    );
    assert_eq!(rows[0].mean_ms, Some(6.0));
    assert_eq!(rows[1].mean_ms, Some(12.0));
    assert!(rows[2].has_no_data());
    assert!(rows[3].has_no_data());

    let mut summary = Vec::new();
    report::write_summary(&mut summary, rows).unwrap();
    assert_eq!(
        String::from_utf8(summary).unwrap(),
        "3 2 0 6\n4 3 0 12\n6 1 - -\n8 2 - -\n"
    );
}
