use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::error::{ConfigError, Result};

/// Grouping key of a measurement: `[size]` for size sweeps, `[vertices, edges]`
/// for graph instances. Ordered lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupKey(Vec<u64>);

impl GroupKey {
    #[must_use]
    pub fn new(fields: Vec<u64>) -> Self {
        Self(fields)
    }

    #[must_use]
    pub fn fields(&self) -> &[u64] {
        &self.0
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

impl From<u64> for GroupKey {
    fn from(value: u64) -> Self {
        Self(vec![value])
    }
}

impl<const N: usize> From<[u64; N]> for GroupKey {
    fn from(value: [u64; N]) -> Self {
        Self(value.to_vec())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, field) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{field}")?;
        }
        Ok(())
    }
}

/// One solver invocation to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    id: String,
    key: GroupKey,
    arg: String,
}

impl WorkItem {
    #[must_use]
    pub fn new(id: impl Into<String>, key: GroupKey, arg: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key,
            arg: arg.into(),
        }
    }

    /// Identity used in logs; unique within one sweep.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// The single argument handed to the solver.
    #[must_use]
    pub fn arg(&self) -> &str {
        &self.arg
    }
}

/// Sweep over board sizes `start..=end` in steps of `step`, `trials` times each.
#[derive(Debug, Clone)]
pub struct SizeSweep {
    start: u64,
    end: u64,
    step: u64,
    trials: u32,
}

impl SizeSweep {
    pub fn new(start: u64, end: u64, step: u64, trials: u32) -> Result<Self> {
        if step == 0 {
            return Err(ConfigError::InvalidRange("step must be greater than zero".to_string()));
        }
        if start > end {
            return Err(ConfigError::InvalidRange(format!(
                "start {start} is greater than end {end}"
            )));
        }
        if trials == 0 {
            return Err(ConfigError::InvalidRange(
                "trials must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            start,
            end,
            step,
            trials,
        })
    }

    pub fn sizes(&self) -> impl Iterator<Item = u64> + Send + use<> {
        let (start, end, step) = (self.start, self.end, self.step);
        std::iter::successors(Some(start), move |&n| n.checked_add(step)).take_while(move |&n| n <= end)
    }

    /// Items in ascending size order, ties broken by trial index.
    pub fn items(&self) -> impl Iterator<Item = WorkItem> + Send + use<> {
        let trials = self.trials;
        self.sizes().flat_map(move |n| {
            (0..trials).map(move |trial| {
                WorkItem::new(format!("n={n}#{trial}"), GroupKey::from(n), n.to_string())
            })
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sizes().count() * self.trials as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct Instance {
    name: String,
    path: PathBuf,
    key: GroupKey,
}

/// Sweep over the graph files of a directory, sorted by file name.
#[derive(Debug, Clone)]
pub struct InstanceSweep {
    instances: Vec<Instance>,
    trials: u32,
}

impl InstanceSweep {
    /// Reads every regular file in `dir` and derives its `[vertices, edges]` key.
    pub fn load(dir: &Path, trials: u32) -> Result<Self> {
        if trials == 0 {
            return Err(ConfigError::InvalidRange(
                "trials must be greater than zero".to_string(),
            ));
        }

        let dir_error = |source: std::io::Error| ConfigError::InstanceDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut instances = Vec::new();
        for entry in fs::read_dir(dir).map_err(dir_error)? {
            let entry = entry.map_err(dir_error)?;
            if !entry.file_type().map_err(dir_error)?.is_file() {
                continue;
            }
            let path = entry.path();
            let contents = fs::read_to_string(&path).map_err(dir_error)?;
            let (vertices, edges) =
                edge_list_shape(&contents).map_err(|(line, reason)| ConfigError::InvalidInstance {
                    path: path.clone(),
                    line,
                    reason,
                })?;
            instances.push(Instance {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                key: GroupKey::from([vertices, edges]),
            });
        }

        if instances.is_empty() {
            return Err(ConfigError::EmptyInstanceDir(dir.to_path_buf()));
        }

        instances.sort_by(|a, b| a.name.cmp(&b.name));
        log::debug!("loaded {} instances from {}", instances.len(), dir.display());

        Ok(Self { instances, trials })
    }

    pub fn items(&self) -> impl Iterator<Item = WorkItem> + Send + '_ {
        let trials = self.trials;
        self.instances.iter().flat_map(move |instance| {
            (0..trials).map(move |trial| {
                let id = if trials > 1 {
                    format!("{}#{trial}", instance.name)
                } else {
                    instance.name.clone()
                };
                WorkItem::new(
                    id,
                    instance.key.clone(),
                    instance.path.to_string_lossy().into_owned(),
                )
            })
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len() * self.trials as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Either kind of parameter sweep.
#[derive(Debug, Clone)]
pub enum Sweep {
    Sizes(SizeSweep),
    Instances(InstanceSweep),
}

impl Sweep {
    pub fn items(&self) -> Box<dyn Iterator<Item = WorkItem> + Send + '_> {
        match self {
            Sweep::Sizes(sweep) => Box::new(sweep.items()),
            Sweep::Instances(sweep) => Box::new(sweep.items()),
        }
    }

    /// Number of leading integer fields the solver prints before the duration.
    #[must_use]
    pub fn key_fields(&self) -> usize {
        match self {
            Sweep::Sizes(_) => 1,
            Sweep::Instances(_) => 2,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Sweep::Sizes(sweep) => sweep.len(),
            Sweep::Instances(sweep) => sweep.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns `(max vertex id + 1, edge count)` of a `u v` per line edge list, or
/// the 1-based line number and reason of the first bad line.
fn edge_list_shape(contents: &str) -> std::result::Result<(u64, u64), (usize, String)> {
    let mut vertices = 0u64;
    let mut edges = 0u64;
    for (idx, line) in contents.lines().enumerate() {
        let fields: Vec<_> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let &[u, v] = fields.as_slice() else {
            return Err((idx + 1, format!("expected 2 fields, found {}", fields.len())));
        };
        for field in [u, v] {
            let id: u64 = field
                .parse()
                .map_err(|_| (idx + 1, format!("bad vertex id {field:?}")))?;
            vertices = vertices.max(id.saturating_add(1));
        }
        edges += 1;
    }
    Ok((vertices, edges))
}
