use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    error::{ConfigError, Result},
    parser::Parsed,
    sweep::GroupKey,
};

pub const DEFAULT_BUCKET_MS: u64 = 100;
pub const DEFAULT_CEILING_MS: u64 = 60_000;
const MAX_BUCKETS: u64 = 1_000_000;

/// Fixed-width buckets covering `[0, ceiling_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistogramSpec {
    bucket_ms: u64,
    ceiling_ms: u64,
}

impl HistogramSpec {
    pub fn new(bucket_ms: u64, ceiling_ms: u64) -> Result<Self> {
        if bucket_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "histogram bucket width must be greater than zero".to_string(),
            ));
        }
        if ceiling_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "histogram ceiling must be greater than zero".to_string(),
            ));
        }
        if ceiling_ms.div_ceil(bucket_ms) > MAX_BUCKETS {
            return Err(ConfigError::InvalidValue(format!(
                "histogram would need more than {MAX_BUCKETS} buckets"
            )));
        }
        Ok(Self {
            bucket_ms,
            ceiling_ms,
        })
    }

    #[must_use]
    pub fn bucket_ms(&self) -> u64 {
        self.bucket_ms
    }

    #[must_use]
    pub fn ceiling_ms(&self) -> u64 {
        self.ceiling_ms
    }

    /// The last bucket may reach past the ceiling when it is not a multiple
    /// of the bucket width.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        usize::try_from(self.ceiling_ms.div_ceil(self.bucket_ms)).unwrap_or(usize::MAX)
    }

    fn bucket_of(&self, duration_ms: u64) -> Option<usize> {
        usize::try_from(duration_ms / self.bucket_ms)
            .ok()
            .filter(|&idx| idx < self.bucket_count())
    }
}

impl Default for HistogramSpec {
    fn default() -> Self {
        Self {
            bucket_ms: DEFAULT_BUCKET_MS,
            ceiling_ms: DEFAULT_CEILING_MS,
        }
    }
}

/// Aggregated statistics for one grouping key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: GroupKey,
    /// Items planned for this key, whether or not they ran.
    pub scheduled: usize,
    /// Items planned for this key that ran, wherever their result landed.
    pub executed: usize,
    pub count_ok: usize,
    pub count_failed: usize,
    pub total_ms: u128,
    /// Absent when no run succeeded, or fewer than the configured minimum.
    pub mean_ms: Option<f64>,
}

impl AggregateRow {
    /// Nothing planned under this key ran, and no result was reported for it.
    #[must_use]
    pub fn has_no_data(&self) -> bool {
        self.executed == 0 && self.count_ok == 0 && self.count_failed == 0
    }

    /// Mean rounded half-up to whole milliseconds, computed on integers.
    #[must_use]
    pub fn rounded_mean_ms(&self) -> Option<u64> {
        if self.mean_ms.is_none() || self.count_ok == 0 {
            return None;
        }
        let count = self.count_ok as u128;
        let mean = self.total_ms / count + u128::from(self.total_ms % count * 2 >= count);
        u64::try_from(mean).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistogramBucket {
    pub lo_ms: u64,
    pub hi_ms: u64,
    /// Successful runs with a duration below `hi_ms`.
    pub cumulative: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Histogram {
    pub buckets: Vec<HistogramBucket>,
    /// Successful runs at or beyond the last bucket bound.
    pub overflow: usize,
}

impl Histogram {
    #[must_use]
    pub fn total(&self) -> usize {
        self.buckets.last().map_or(0, |b| b.cumulative) + self.overflow
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub rows: Vec<AggregateRow>,
    pub histogram: Histogram,
}

#[derive(Debug, Default)]
struct KeyStats {
    scheduled: usize,
    executed: usize,
    count_ok: usize,
    count_failed: usize,
    total_ms: u128,
}

/// Order-independent reduction of parsed outcomes into per-key rows and a
/// global cumulative histogram.
#[derive(Debug)]
pub struct Aggregator {
    spec: HistogramSpec,
    min_ok: usize,
    keys: BTreeMap<GroupKey, KeyStats>,
    bucket_counts: Vec<usize>,
    overflow: usize,
}

impl Aggregator {
    #[must_use]
    pub fn new(spec: HistogramSpec) -> Self {
        Self {
            spec,
            min_ok: 1,
            keys: BTreeMap::new(),
            bucket_counts: vec![0; spec.bucket_count()],
            overflow: 0,
        }
    }

    /// Only report a mean for keys with at least `min_ok` successful runs.
    #[must_use]
    pub fn with_min_ok(mut self, min_ok: usize) -> Self {
        self.min_ok = min_ok.max(1);
        self
    }

    /// Registers a planned item so its key is reported even if it never runs.
    pub fn schedule(&mut self, key: &GroupKey) {
        self.stats(key).scheduled += 1;
    }

    /// Adds one outcome. Measurements are grouped by the key the solver
    /// reported; failures by the key of the item that was run.
    pub fn record(&mut self, item_key: &GroupKey, parsed: &Parsed) {
        self.stats(item_key).executed += 1;
        match parsed {
            Ok(record) => {
                if &record.key != item_key {
                    log::warn!(
                        "solver reported key {} for an item planned as {item_key}",
                        record.key
                    );
                }
                let stats = self.stats(&record.key);
                stats.count_ok += 1;
                stats.total_ms += u128::from(record.duration_ms);

                match self.spec.bucket_of(record.duration_ms) {
                    Some(idx) => self.bucket_counts[idx] += 1,
                    None => self.overflow += 1,
                }
            }
            Err(_) => self.stats(item_key).count_failed += 1,
        }
    }

    fn stats(&mut self, key: &GroupKey) -> &mut KeyStats {
        self.keys.entry(key.clone()).or_default()
    }

    #[must_use]
    pub fn finish(self) -> Summary {
        let rows = self
            .keys
            .into_iter()
            .map(|(key, stats)| {
                let mean_ms = (stats.count_ok > 0 && stats.count_ok >= self.min_ok)
                    .then(|| stats.total_ms as f64 / stats.count_ok as f64);
                AggregateRow {
                    key,
                    scheduled: stats.scheduled,
                    executed: stats.executed,
                    count_ok: stats.count_ok,
                    count_failed: stats.count_failed,
                    total_ms: stats.total_ms,
                    mean_ms,
                }
            })
            .collect();

        if self.overflow > 0 {
            log::warn!(
                "{} successful runs took {} ms or longer and are past the last histogram bucket",
                self.overflow,
                self.spec.bucket_count() as u64 * self.spec.bucket_ms
            );
        }

        let mut cumulative = 0;
        let mut lo_ms = 0;
        let buckets = self
            .bucket_counts
            .iter()
            .map(|&count| {
                cumulative += count;
                let hi_ms = lo_ms + self.spec.bucket_ms;
                let bucket = HistogramBucket {
                    lo_ms,
                    hi_ms,
                    cumulative,
                };
                lo_ms = hi_ms;
                bucket
            })
            .collect();

        Summary {
            rows,
            histogram: Histogram {
                buckets,
                overflow: self.overflow,
            },
        }
    }
}
