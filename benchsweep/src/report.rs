//! Plain-text renderings consumed by the table-formatting scripts.

use std::io::{self, Write};

use crate::{
    aggregate::{AggregateRow, Histogram},
    parser::Parsed,
    sweep::GroupKey,
};

/// Marker for a value that does not exist.
pub const ABSENT: &str = "-";

/// One `<key> <count_failed> <mean_ms>` line per row.
///
/// A key whose runs all failed prints its failure count and `-` for the mean;
/// a key that never ran prints `-` for both.
pub fn write_summary<W: Write>(writer: &mut W, rows: &[AggregateRow]) -> io::Result<()> {
    for row in rows {
        if row.has_no_data() {
            writeln!(writer, "{} {ABSENT} {ABSENT}", row.key)?;
            continue;
        }
        match row.rounded_mean_ms() {
            Some(mean) => writeln!(writer, "{} {} {mean}", row.key, row.count_failed)?,
            None => writeln!(writer, "{} {} {ABSENT}", row.key, row.count_failed)?,
        }
    }
    Ok(())
}

/// One `<upper bound in seconds> <cumulative count>` line per bucket.
pub fn write_histogram<W: Write>(writer: &mut W, histogram: &Histogram) -> io::Result<()> {
    for bucket in &histogram.buckets {
        writeln!(writer, "{} {}", format_seconds(bucket.hi_ms), bucket.cumulative)?;
    }
    Ok(())
}

/// Milliseconds as seconds with as few decimals as needed, but at least one.
#[must_use]
pub fn format_seconds(ms: u64) -> String {
    let fraction = format!("{:03}", ms % 1000);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{}.0", ms / 1000)
    } else {
        format!("{}.{fraction}", ms / 1000)
    }
}

/// Raw results log line for one outcome: `<key> <duration_ms>` on success,
/// `<item key> <failure tag>` otherwise.
#[must_use]
pub fn log_line(item_key: &GroupKey, parsed: &Parsed) -> String {
    match parsed {
        Ok(record) => format!("{} {}", record.key, record.duration_ms),
        Err(failure) => format!("{item_key} {}", failure.tag()),
    }
}
