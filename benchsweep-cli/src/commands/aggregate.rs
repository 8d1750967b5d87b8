use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use benchsweep::{Aggregator, HistogramSpec, ResultParser, aggregate, report};
use clap::Args;

use crate::error::{CliError, Result};

pub struct AggregateCommand;

#[derive(Args)]
pub struct AggregateArgs {
    #[arg(
        long,
        default_value_t = 1,
        help = "Number of key fields before the duration (1 for sizes, 2 for graphs)"
    )]
    pub key_fields: usize,
    #[arg(long, default_value_t = aggregate::DEFAULT_BUCKET_MS, help = "Histogram bucket width (ms)")]
    pub bucket_ms: u64,
    #[arg(long, default_value_t = aggregate::DEFAULT_CEILING_MS, help = "Histogram ceiling (ms)")]
    pub ceiling_ms: u64,
    #[arg(long, help = "Only report a mean for keys with at least this many successes")]
    pub min_ok: Option<usize>,
    #[arg(
        long,
        default_value_t = false,
        help = "Print the cumulative histogram instead of the per-key summary"
    )]
    pub histogram: bool,
    #[arg(required = true, help = "Raw result files written by `run`")]
    pub files: Vec<PathBuf>,
}

impl AggregateCommand {
    pub fn execute(args: &AggregateArgs) -> Result<()> {
        let mut stdout = io::stdout().lock();
        aggregate_files(args, &mut stdout)
    }
}

fn aggregate_files<W: Write>(args: &AggregateArgs, out: &mut W) -> Result<()> {
    if args.min_ok == Some(0) {
        return Err(CliError::InvalidInput(
            "min_ok must be greater than zero".to_string(),
        ));
    }

    let spec = HistogramSpec::new(args.bucket_ms, args.ceiling_ms)?;
    let mut aggregator = Aggregator::new(spec).with_min_ok(args.min_ok.unwrap_or(1));
    let parser = ResultParser::new(args.key_fields);

    for path in &args.files {
        let lines = add_file(&mut aggregator, &parser, path)?;
        log::info!("Read {lines} results from {}", path.display());
    }

    let summary = aggregator.finish();
    if args.histogram {
        report::write_histogram(out, &summary.histogram)?;
    } else {
        report::write_summary(out, &summary.rows)?;
    }
    Ok(())
}

fn add_file(aggregator: &mut Aggregator, parser: &ResultParser, path: &Path) -> Result<usize> {
    if !path.exists() {
        return Err(CliError::FileNotFound(path.display().to_string()));
    }
    let contents = fs::read_to_string(path)?;

    let mut added = 0;
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some((key, parsed)) = parser.parse_log_line(line) else {
            log::warn!("{}:{}: skipping unrecognized line {line:?}", path.display(), idx + 1);
            continue;
        };
        aggregator.record(&key, &parsed);
        added += 1;
    }
    Ok(added)
}
