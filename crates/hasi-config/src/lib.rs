//! YAML configuration for the HASI controller
//!
//! Every key is optional; missing keys take the defaults of
//! [`ControllerConfig::default`].
//!
//! # Example
//!
//! ```ignore
//! use hasi_config::ControllerConfig;
//!
//! let config = ControllerConfig::load("/etc/hasi/hasi.yaml")?;
//! println!("event loop delay: {} ms", config.event_loop_delay_ms);
//! ```

mod controller_config;
mod error;

pub use controller_config::{ControllerConfig, DelayMode, ReportConfig, StoreFiles, WatchdogConfig};
pub use error::{ConfigError, ConfigResult};
