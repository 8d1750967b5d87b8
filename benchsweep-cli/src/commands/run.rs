use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    process::Command,
    time::{Duration, Instant},
};

use benchsweep::{
    AggregateRow, Aggregator, Executor, Histogram, HistogramSpec, InstanceSweep, ProcessRunner,
    SizeSweep, StopSignal, Sweep, aggregate, executor, report, run_sweep, runner,
};
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

pub struct RunCommand;

#[derive(Args)]
pub struct RunArgs {
    #[arg(long, help = "Path to the benchmark suite YAML")]
    pub suite: PathBuf,
    #[arg(long, help = "Output directory for raw results and reports")]
    pub output: Option<PathBuf>,
    #[arg(long, help = "Override the suite's concurrency limit")]
    pub jobs: Option<usize>,
    #[arg(long, help = "Override the suite's per-run timeout (ms)")]
    pub timeout_ms: Option<u64>,
    #[arg(
        long,
        default_value_t = false,
        help = "Print the cumulative histogram instead of the per-key summary"
    )]
    pub histogram: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuiteConfig {
    executable: PathBuf,
    sweep: SweepConfig,
    #[serde(default = "default_trials")]
    trials: u32,
    #[serde(default)]
    jobs: Option<usize>,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "default_kill_grace_ms")]
    kill_grace_ms: u64,
    #[serde(default)]
    histogram: HistogramConfig,
    #[serde(default)]
    min_ok: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SweepConfig {
    #[serde(default)]
    sizes: Option<SizeRange>,
    #[serde(default)]
    instances: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SizeRange {
    start: u64,
    end: u64,
    #[serde(default = "default_step")]
    step: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HistogramConfig {
    #[serde(default = "default_bucket_ms")]
    bucket_ms: u64,
    /// Defaults to whichever is larger of one minute and the run timeout.
    #[serde(default)]
    ceiling_ms: Option<u64>,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bucket_ms: default_bucket_ms(),
            ceiling_ms: None,
        }
    }
}

fn default_trials() -> u32 {
    1
}

fn default_step() -> u64 {
    1
}

fn default_timeout_ms() -> u64 {
    u64::try_from(runner::DEFAULT_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}

fn default_kill_grace_ms() -> u64 {
    u64::try_from(runner::DEFAULT_KILL_GRACE.as_millis()).unwrap_or(u64::MAX)
}

fn default_bucket_ms() -> u64 {
    aggregate::DEFAULT_BUCKET_MS
}

fn default_ceiling_ms() -> u64 {
    aggregate::DEFAULT_CEILING_MS
}

/// Everything validated and ready to run; building it is the only place a
/// run can fail fatally.
struct Plan {
    sweep: Sweep,
    runner: ProcessRunner,
    executor: Executor,
    histogram: HistogramSpec,
    min_ok: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunMetadata {
    suite: String,
    executable: String,
    jobs: usize,
    timeout_ms: u64,
    kill_grace_ms: u64,
    items: usize,
    executed: usize,
    skipped: usize,
    elapsed_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_commit: Option<String>,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    metadata: RunMetadata,
    rows: &'a [AggregateRow],
    histogram: &'a Histogram,
}

impl RunCommand {
    pub fn execute(args: &RunArgs, stop: StopSignal) -> Result<()> {
        let mut config = load_suite(&args.suite)?;
        if let Some(jobs) = args.jobs {
            config.jobs = Some(jobs);
        }
        if let Some(timeout_ms) = args.timeout_ms {
            config.timeout_ms = timeout_ms;
        }

        let plan = build_plan(&config, stop)?;
        let mut stdout = io::stdout().lock();
        run_plan(&plan, &config, &args.suite, args.output.as_deref(), args.histogram, &mut stdout)
    }
}

fn load_suite(suite: &Path) -> Result<SuiteConfig> {
    if !suite.exists() {
        return Err(CliError::FileNotFound(suite.display().to_string()));
    }
    let mut file = File::open(suite)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(serde_yaml::from_slice(&buf)?)
}

fn build_plan(config: &SuiteConfig, stop: StopSignal) -> Result<Plan> {
    let executable = runner::resolve_executable(&config.executable)?;

    let sweep = match (&config.sweep.sizes, &config.sweep.instances) {
        (Some(range), None) => Sweep::Sizes(SizeSweep::new(
            range.start,
            range.end,
            range.step,
            config.trials,
        )?),
        (None, Some(dir)) => Sweep::Instances(InstanceSweep::load(dir, config.trials)?),
        (Some(_), Some(_)) => {
            return Err(CliError::InvalidInput(
                "sweep must set either sizes or instances, not both".to_string(),
            ));
        }
        (None, None) => {
            return Err(CliError::InvalidInput(
                "sweep must set sizes or instances".to_string(),
            ));
        }
    };

    if config.timeout_ms == 0 {
        return Err(CliError::InvalidInput(
            "timeout_ms must be greater than zero".to_string(),
        ));
    }
    if config.min_ok == Some(0) {
        return Err(CliError::InvalidInput(
            "min_ok must be greater than zero".to_string(),
        ));
    }

    let executor = Executor::new(config.jobs.unwrap_or_else(executor::default_jobs))?
        .with_stop_signal(stop);
    let runner = ProcessRunner::new(executable, Duration::from_millis(config.timeout_ms))
        .with_kill_grace(Duration::from_millis(config.kill_grace_ms));
    let ceiling_ms = match config.histogram.ceiling_ms {
        Some(ceiling_ms) => {
            if ceiling_ms < config.timeout_ms {
                log::warn!(
                    "histogram ceiling {ceiling_ms} ms is below the {} ms timeout; slower runs \
                     will only be counted as overflow",
                    config.timeout_ms
                );
            }
            ceiling_ms
        }
        None => default_ceiling_ms().max(config.timeout_ms),
    };
    let histogram = HistogramSpec::new(config.histogram.bucket_ms, ceiling_ms)?;

    Ok(Plan {
        sweep,
        runner,
        executor,
        histogram,
        min_ok: config.min_ok.unwrap_or(1),
    })
}

fn run_plan<W: Write>(
    plan: &Plan,
    config: &SuiteConfig,
    suite_path: &Path,
    output: Option<&Path>,
    print_histogram: bool,
    stdout: &mut W,
) -> Result<()> {
    let mut raw_log = match output {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            Some(BufWriter::new(File::create(dir.join("raw.txt"))?))
        }
        None => None,
    };
    let mut raw_log_error = None;

    log::info!(
        "Starting benchmark sweep: {} items, {} jobs, {} ms timeout",
        plan.sweep.len(),
        plan.executor.jobs(),
        plan.runner.timeout().as_millis()
    );
    let started = Instant::now();

    let result = run_sweep(
        &plan.sweep,
        &plan.executor,
        &plan.runner,
        Aggregator::new(plan.histogram).with_min_ok(plan.min_ok),
        |item, parsed| {
            if let Some(writer) = raw_log.as_mut()
                && raw_log_error.is_none()
                && let Err(e) = writeln!(writer, "{}", report::log_line(item.key(), parsed))
            {
                raw_log_error = Some(e);
            }
        },
    );

    let elapsed = started.elapsed();
    log::info!(
        "Sweep finished in {:.1}s: {} executed, {} skipped",
        elapsed.as_secs_f64(),
        result.executed,
        result.skipped
    );
    if result.skipped > 0 {
        log::warn!("Sweep was stopped; {} items never ran", result.skipped);
    }

    if let Some(e) = raw_log_error {
        return Err(e.into());
    }
    if let Some(mut writer) = raw_log {
        writer.flush()?;
    }

    if print_histogram {
        report::write_histogram(stdout, &result.summary.histogram)?;
    } else {
        report::write_summary(stdout, &result.summary.rows)?;
    }

    if let Some(dir) = output {
        let mut summary_txt = Vec::new();
        report::write_summary(&mut summary_txt, &result.summary.rows)?;
        fs::write(dir.join("summary.txt"), summary_txt)?;

        let mut histogram_txt = Vec::new();
        report::write_histogram(&mut histogram_txt, &result.summary.histogram)?;
        fs::write(dir.join("histogram.txt"), histogram_txt)?;

        let summary = RunSummary {
            metadata: RunMetadata {
                suite: path_to_string(suite_path),
                executable: path_to_string(plan.runner.executable()),
                jobs: plan.executor.jobs(),
                timeout_ms: config.timeout_ms,
                kill_grace_ms: config.kill_grace_ms,
                items: plan.sweep.len(),
                executed: result.executed,
                skipped: result.skipped,
                elapsed_s: elapsed.as_secs_f64(),
                git_commit: git_commit_hash(),
            },
            rows: &result.summary.rows,
            histogram: &result.summary.histogram,
        };
        fs::write(dir.join("summary.json"), serde_json::to_vec_pretty(&summary)?)?;
        log::info!("Wrote reports to {}", dir.display());
    }

    Ok(())
}

fn path_to_string(path: &Path) -> String {
    path.display().to_string()
}

fn git_commit_hash() -> Option<String> {
    let output = Command::new("git")
        .arg("rev-parse")
        .arg("HEAD")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let commit = String::from_utf8(output.stdout).ok()?;
    Some(commit.trim().to_string())
}
