//! Runs a real shell-script solver through the whole pipeline. Kept as the
//! only test in this binary so no other test forks while the script is
//! being written.
#![cfg(unix)]

use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf, time::Duration};

use benchsweep::{
    Aggregator, Executor, HistogramSpec, ProcessRunner, SizeSweep, Sweep, report, run_sweep,
    runner::resolve_executable,
};

const SOLVER: &str = r#"#!/bin/sh
case "$1" in
  7) sleep 10 ;;
  9) echo garbage ;;
  11) exit 3 ;;
  *) echo "$1 $(( $1 * 10 ))" ;;
esac
"#;

fn make_temp_dir(prefix: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let suffix: u64 = rand::random();
    path.push(format!("{prefix}-{suffix}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

#[test]
fn script_solver_outcomes_are_classified() {
    let dir = make_temp_dir("benchsweep-solver");
    let solver = dir.join("solver.sh");
    fs::write(&solver, SOLVER).unwrap();
    fs::set_permissions(&solver, fs::Permissions::from_mode(0o755)).unwrap();
    let solver = resolve_executable(&solver).unwrap();

    let sweep = Sweep::Sizes(SizeSweep::new(5, 11, 2, 2).unwrap());
    let runner = ProcessRunner::new(solver, Duration::from_millis(500))
        .with_kill_grace(Duration::from_millis(200));
    let executor = Executor::new(3).unwrap();

    let result = run_sweep(
        &sweep,
        &executor,
        &runner,
        Aggregator::new(HistogramSpec::new(100, 1_000).unwrap()),
        |_, _| {},
    );
    assert_eq!(result.executed, 8);

    let mut summary = Vec::new();
    report::write_summary(&mut summary, &result.summary.rows).unwrap();
    assert_eq!(
        String::from_utf8(summary).unwrap(),
        "5 0 50\n7 2 -\n9 2 -\n11 2 -\n"
    );
    assert_eq!(result.summary.histogram.buckets[0].cumulative, 2);
    assert_eq!(result.summary.histogram.total(), 2);
}
