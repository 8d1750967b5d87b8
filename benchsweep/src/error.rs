use std::{fmt, io, path::PathBuf};

/// Problems detected before any work is scheduled. These are the only fatal
/// errors of a sweep; per-item failures are carried as [`crate::parser::Failure`].
#[derive(Debug)]
pub enum ConfigError {
    ExecutableNotFound(PathBuf),
    NotExecutable(PathBuf),
    InstanceDir { path: PathBuf, source: io::Error },
    EmptyInstanceDir(PathBuf),
    InvalidInstance { path: PathBuf, line: usize, reason: String },
    InvalidRange(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ExecutableNotFound(path) => {
                write!(f, "solver executable not found: {}", path.display())
            }
            ConfigError::NotExecutable(path) => {
                write!(f, "solver is not executable: {}", path.display())
            }
            ConfigError::InstanceDir { path, source } => {
                write!(f, "cannot read instance directory {}: {source}", path.display())
            }
            ConfigError::EmptyInstanceDir(path) => {
                write!(f, "instance directory {} contains no files", path.display())
            }
            ConfigError::InvalidInstance { path, line, reason } => {
                write!(f, "{}:{line}: not an edge list: {reason}", path.display())
            }
            ConfigError::InvalidRange(msg) => write!(f, "invalid sweep range: {msg}"),
            ConfigError::InvalidValue(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InstanceDir { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
