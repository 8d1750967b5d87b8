use std::{fmt, io};

use benchsweep::ConfigError;

#[derive(Debug)]
pub enum CliError {
    Config(ConfigError),
    IoError(io::Error),
    YamlError(serde_yaml::Error),
    JsonError(serde_json::Error),
    InvalidInput(String),
    FileNotFound(String),
    ProcessError(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "configuration error: {e}"),
            CliError::IoError(e) => write!(f, "I/O error: {e}"),
            CliError::YamlError(e) => write!(f, "YAML error: {e}"),
            CliError::JsonError(e) => write!(f, "JSON error: {e}"),
            CliError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            CliError::FileNotFound(path) => write!(f, "file not found: {path}"),
            CliError::ProcessError(msg) => write!(f, "process error: {msg}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::IoError(e) => Some(e),
            CliError::YamlError(e) => Some(e),
            CliError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::IoError(e)
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(e: serde_yaml::Error) -> Self {
        CliError::YamlError(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::JsonError(e)
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
