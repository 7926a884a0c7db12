//! Errors raised while reading the controller configuration

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Why a controller configuration was rejected
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be opened or read
    #[error("cannot read controller config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a YAML mapping of controller settings
    #[error("malformed controller config {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An inline YAML document did not parse
    #[error("malformed controller config: {0}")]
    Syntax(#[from] serde_yaml::Error),

    /// A setting parsed but is out of range
    #[error("setting `{field}` {reason}")]
    Validation { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn below_minimum(field: &'static str, minimum: u64) -> Self {
        Self::out_of_range(field, format!("must be at least {minimum}"))
    }

    pub(crate) fn out_of_range(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}
