//! Error types shared across the controller

use thiserror::Error;

/// Result type for parse-time operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for per-cycle operations
pub type ExecuteResult<T> = Result<T, ExecuteError>;

/// Result type for device bus operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Malformed script, configuration or device wiring
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A `[...]` variable token could not be understood
    #[error("invalid variable token '{token}': {reason}")]
    InvalidVariable { token: String, reason: String },

    /// A derived (on/off/change) variable has no basic variable to watch
    #[error("can't find basic variable \"{basic}\" for modified variable \"{derived}\"")]
    MissingBasic { basic: String, derived: String },

    /// `[sys_<name>]` with an unknown name
    #[error("invalid system parameter {name}")]
    InvalidSystemVariable { name: String },

    /// `[clock_<name>]` with an unknown name
    #[error("invalid clock parameter {name}")]
    InvalidClockVariable { name: String },

    /// `[random_<n>]` where `n` is not a positive integer
    #[error("invalid random range '{name}' (expected a positive integer)")]
    InvalidRandomVariable { name: String },

    /// A connection or output id that does not resolve to a device channel
    #[error("invalid device id '{id}': {reason}")]
    InvalidDeviceId { id: String, reason: String },

    /// Unknown or malformed control command
    #[error("unknown command {0}")]
    UnknownControlCommand(String),

    /// Error raised by the script engine
    #[error("script error: {0}")]
    Script(String),
}

/// Fault raised while running a cycle
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecuteError {
    /// Input values do not match the connection layout
    #[error("inputs and connections are out of sync ({expected} != {found})")]
    OutOfSync { expected: String, found: String },

    /// A command no manager claimed
    #[error("invalid command found in return from execute: {0}")]
    UnrecognizedCommand(String),

    /// Runtime fault inside the script engine
    #[error("script evaluation failed: {0}")]
    Script(String),

    /// A remote or HTTP command source failed
    #[error("command source '{source_name}' failed: {reason}")]
    Source { source_name: String, reason: String },

    /// Device fault while executing a command
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Fault raised by the device bus
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// No device with this id on the bus
    #[error("device not found: {0}")]
    NotFound(String),

    /// Bus or device initialization failed
    #[error("device initialization failed: {0}")]
    Init(String),

    /// Reading, writing or polling a device failed
    #[error("I/O error on device {device}: {reason}")]
    Io { device: String, reason: String },

    /// Channel index outside the device's channel count
    #[error("channel {channel} out of range for device {device} ({count} channels)")]
    ChannelOutOfRange {
        device: String,
        channel: usize,
        count: usize,
    },
}
