use serde::Serialize;

use crate::{runner::RawOutcome, sweep::GroupKey};

/// A successful measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRecord {
    pub key: GroupKey,
    pub duration_ms: u64,
}

/// Why a run did not produce a measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Failure {
    Timeout,
    /// The raw text is kept for diagnostics.
    MalformedOutput(String),
    ProcessError(String),
}

impl Failure {
    /// Short tag used in raw result logs.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Failure::Timeout => "timeout",
            Failure::MalformedOutput(_) => "malformed",
            Failure::ProcessError(_) => "failed",
        }
    }
}

pub type Parsed = Result<ResultRecord, Failure>;

/// Parses solver lines of the form `<key fields...> <duration_ms>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultParser {
    key_fields: usize,
}

impl ResultParser {
    #[must_use]
    pub fn new(key_fields: usize) -> Self {
        Self { key_fields }
    }

    #[must_use]
    pub fn key_fields(&self) -> usize {
        self.key_fields
    }

    #[must_use]
    pub fn parse(&self, outcome: &RawOutcome) -> Parsed {
        match outcome {
            RawOutcome::Completed(text) => self.parse_line(text),
            RawOutcome::TimedOut => Err(Failure::Timeout),
            RawOutcome::ProcessFailed(detail) => Err(Failure::ProcessError(detail.clone())),
        }
    }

    /// Parses the text a solver printed. Anything but exactly one line of
    /// `key_fields + 1` unsigned integers is malformed.
    #[must_use]
    pub fn parse_line(&self, text: &str) -> Parsed {
        let malformed = || Failure::MalformedOutput(text.to_string());

        if text.contains(['\n', '\r']) {
            return Err(malformed());
        }
        let fields = parse_fields(text).ok_or_else(malformed)?;
        let Some((&duration_ms, key)) = fields.split_last() else {
            return Err(malformed());
        };
        if key.len() != self.key_fields {
            return Err(malformed());
        }

        Ok(ResultRecord {
            key: GroupKey::new(key.to_vec()),
            duration_ms,
        })
    }

    /// Parses one line of a raw results log (`<key...> <duration|tag>`).
    /// Returns `None` for lines that do not even carry a usable key.
    #[must_use]
    pub fn parse_log_line(&self, line: &str) -> Option<(GroupKey, Parsed)> {
        let fields: Vec<_> = line.split_ascii_whitespace().collect();
        let (&last, key) = fields.split_last()?;
        if key.len() != self.key_fields {
            return None;
        }
        let key = GroupKey::new(
            key.iter()
                .map(|field| field.parse().ok())
                .collect::<Option<Vec<u64>>>()?,
        );

        let parsed = match last.parse::<u64>() {
            Ok(duration_ms) => Ok(ResultRecord {
                key: key.clone(),
                duration_ms,
            }),
            Err(_) if last == Failure::Timeout.tag() => Err(Failure::Timeout),
            Err(_) if last == "malformed" => Err(Failure::MalformedOutput(line.to_string())),
            Err(_) => Err(Failure::ProcessError(last.to_string())),
        };
        Some((key, parsed))
    }
}

fn parse_fields(text: &str) -> Option<Vec<u64>> {
    text.split_ascii_whitespace()
        .map(|field| field.parse().ok())
        .collect()
}
