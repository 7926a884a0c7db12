//! Error types for the controller runtime

use hasi_config::ConfigError;
use hasi_core::{DeviceError, ExecuteError, ParseError};
use hasi_stores::StoreError;
use thiserror::Error;

/// Result type for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Errors raised while setting up or running the controller
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Script or device wiring could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A cycle or command failed
    #[error(transparent)]
    Execute(#[from] ExecuteError),

    /// The device bus failed
    #[error("device bus error: {0}")]
    Device(#[from] DeviceError),

    /// A store could not be saved
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was cancelled
    #[error("task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ControllerError::from(ParseError::UnknownControlCommand("z".to_string()));
        assert_eq!(err.to_string(), "parse error: unknown command z");

        let err = ControllerError::from(DeviceError::NotFound("relay".to_string()));
        assert_eq!(err.to_string(), "device bus error: device not found: relay");
    }
}
