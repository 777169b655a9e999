//! Error types for dhruva-amcl.

use thiserror::Error;

/// Crate-level error type.
///
/// Errors surface only on explicit operations (file I/O, config loading);
/// the scan and odometry entry points log and drop instead of failing.
#[derive(Error, Debug)]
pub enum AmclError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_yaml::Error> for AmclError {
    fn from(e: serde_yaml::Error) -> Self {
        AmclError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AmclError>;
