//! Controller configuration
//!
//! Parses the controller's YAML file into [`ControllerConfig`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// How the event-loop delay is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayMode {
    /// Fixed by configuration (and the `+`/`-` shell commands)
    #[default]
    Manual,
    /// Nudged so that the load ratio stays near the target
    BasedOnLoad,
    /// Nudged so that the overload ratio stays near the target
    BasedOnOverload,
}

/// Files backing the four persistent stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFiles {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    #[serde(default = "default_timer_file")]
    pub timer_file: PathBuf,

    #[serde(default = "default_stopwatch_file")]
    pub stopwatch_file: PathBuf,

    #[serde(default = "default_pulse_file")]
    pub pulse_file: PathBuf,
}

impl StoreFiles {
    /// All four files below `dir`, with the default file names
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            state_file: dir.join(default_state_file()),
            timer_file: dir.join(default_timer_file()),
            stopwatch_file: dir.join(default_stopwatch_file()),
            pulse_file: dir.join(default_pulse_file()),
        }
    }
}

impl Default for StoreFiles {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            timer_file: default_timer_file(),
            stopwatch_file: default_stopwatch_file(),
            pulse_file: default_pulse_file(),
        }
    }
}

/// OS watchdog settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Start the pinger at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Watchdog character device
    #[serde(default = "default_watchdog_device")]
    pub device: PathBuf,

    /// Timeout programmed into the device; 0 keeps the hardware's own
    #[serde(default = "default_watchdog_timeout")]
    pub timeout_secs: u32,

    /// Seconds between keep-alives; 0 picks two thirds of the device timeout
    #[serde(default)]
    pub interval_secs: u32,
}

impl WatchdogConfig {
    /// Keep-alive period for a device whose effective timeout is
    /// `timeout_secs`; `None` if no usable period results
    pub fn keepalive_interval(&self, timeout_secs: u64) -> Option<Duration> {
        let interval = if self.interval_secs > 0 {
            Duration::from_secs(u64::from(self.interval_secs))
        } else {
            Duration::from_millis(timeout_secs * 2000 / 3)
        };
        (!interval.is_zero()).then_some(interval)
    }

    /// The longest interval that keeps a third of `timeout_secs` in reserve
    pub fn save_interval(timeout_secs: u64) -> Duration {
        Duration::from_millis(timeout_secs * 2000 / 3)
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: default_watchdog_device(),
            timeout_secs: default_watchdog_timeout(),
            interval_secs: 0,
        }
    }
}

/// Debug report delivery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Name used in report subjects
    #[serde(default)]
    pub system_name: String,

    #[serde(default)]
    pub from_address: String,

    #[serde(default)]
    pub to_address: String,
}

impl ReportConfig {
    /// Reports can only be mailed if both addresses are set
    pub fn can_mail(&self) -> bool {
        !self.from_address.is_empty() && !self.to_address.is_empty()
    }

    /// Subject line for debug reports
    pub fn subject(&self) -> String {
        if self.system_name.is_empty() {
            "HAS Debug Event".to_string()
        } else {
            format!("HAS {} Debug Event", self.system_name)
        }
    }
}

/// Top-level controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Rule script handed to the script engine
    #[serde(default = "default_script_file")]
    pub script_file: PathBuf,

    /// Target of file event logging
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Target of the `d` shell command
    #[serde(default = "default_dump_file")]
    pub dump_file: PathBuf,

    /// Persistent store files
    #[serde(default)]
    pub stores: StoreFiles,

    /// Initial delay between ticks in milliseconds
    #[serde(default = "default_event_loop_delay")]
    pub event_loop_delay_ms: u32,

    #[serde(default)]
    pub delay_mode: DelayMode,

    /// Ratio the automatic delay modes steer towards
    #[serde(default = "default_auto_delay_target")]
    pub auto_delay_target: f64,

    /// Seconds between store saves; 0 disables restore points
    #[serde(default = "default_restore_point_interval")]
    pub restore_point_interval_secs: u64,

    /// Ticks to skip between pushes of the assignments to remotes
    #[serde(default)]
    pub remote_update_skip: u32,

    /// Pending auxiliary script executions before new ones are dropped
    #[serde(default = "default_script_queue_size")]
    pub script_queue_size: usize,

    /// How long shutdown waits for the event loop
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    #[serde(default)]
    pub watchdog: WatchdogConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

fn default_script_file() -> PathBuf {
    PathBuf::from("hasi.txt")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("events.log")
}

fn default_dump_file() -> PathBuf {
    PathBuf::from("state_dump.txt")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("states.save")
}

fn default_timer_file() -> PathBuf {
    PathBuf::from("timers.save")
}

fn default_stopwatch_file() -> PathBuf {
    PathBuf::from("stopWatches.save")
}

fn default_pulse_file() -> PathBuf {
    PathBuf::from("pulses.save")
}

fn default_event_loop_delay() -> u32 {
    20
}

fn default_auto_delay_target() -> f64 {
    0.05
}

fn default_restore_point_interval() -> u64 {
    300
}

fn default_script_queue_size() -> usize {
    32
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_watchdog_device() -> PathBuf {
    PathBuf::from("/dev/watchdog")
}

fn default_watchdog_timeout() -> u32 {
    15
}

fn default_true() -> bool {
    true
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            script_file: default_script_file(),
            log_file: default_log_file(),
            dump_file: default_dump_file(),
            stores: StoreFiles::default(),
            event_loop_delay_ms: default_event_loop_delay(),
            delay_mode: DelayMode::Manual,
            auto_delay_target: default_auto_delay_target(),
            restore_point_interval_secs: default_restore_point_interval(),
            remote_update_skip: 0,
            script_queue_size: default_script_queue_size(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            watchdog: WatchdogConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load and validate the configuration file at `path`
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!("Loading controller configuration: {:?}", path);

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: ControllerConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Malformed {
                path: path.to_path_buf(),
                source: e,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        // an empty document means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: ControllerConfig = serde_yaml::from_str(content)?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges serde cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.event_loop_delay_ms == 0 {
            return Err(ConfigError::below_minimum("event_loop_delay_ms", 1));
        }

        if !(self.auto_delay_target > 0.0 && self.auto_delay_target <= 1.0) {
            return Err(ConfigError::out_of_range(
                "auto_delay_target",
                format!("{} is not a ratio in (0, 1]", self.auto_delay_target),
            ));
        }

        let watchdog = &self.watchdog;
        if watchdog.enabled
            && watchdog.timeout_secs > 0
            && watchdog.interval_secs >= watchdog.timeout_secs
        {
            return Err(ConfigError::out_of_range(
                "watchdog.interval_secs",
                format!(
                    "{} s keep-alive interval would let the {} s watchdog expire",
                    watchdog.interval_secs, watchdog.timeout_secs
                ),
            ));
        }

        Ok(())
    }

    /// Period of the restore-point save, if enabled
    pub fn restore_point_interval(&self) -> Option<Duration> {
        (self.restore_point_interval_secs > 0)
            .then(|| Duration::from_secs(self.restore_point_interval_secs))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// File the `w` shell command writes the expanded script to
    pub fn expanded_script_file(&self) -> PathBuf {
        let name = self
            .script_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.script_file.with_file_name(format!("expanded_{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.event_loop_delay_ms, 20);
        assert_eq!(config.delay_mode, DelayMode::Manual);
        assert_eq!(config.stores.timer_file, PathBuf::from("timers.save"));
        assert_eq!(config.watchdog.device, PathBuf::from("/dev/watchdog"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_from_yaml() {
        let config = ControllerConfig::from_yaml_str(
            r#"
script_file: /etc/hasi/home.txt
event_loop_delay_ms: 50
delay_mode: based_on_overload
auto_delay_target: 0.1
stores:
  state_file: /var/lib/hasi/states.save
watchdog:
  timeout_secs: 30
  interval_secs: 10
report:
  system_name: Cellar
  from_address: hasi@example.org
  to_address: admin@example.org
"#,
        )
        .unwrap();

        assert_eq!(config.event_loop_delay_ms, 50);
        assert_eq!(config.delay_mode, DelayMode::BasedOnOverload);
        assert_eq!(config.auto_delay_target, 0.1);
        assert_eq!(
            config.stores.state_file,
            PathBuf::from("/var/lib/hasi/states.save")
        );
        // unspecified store files keep their defaults
        assert_eq!(config.stores.pulse_file, PathBuf::from("pulses.save"));
        assert_eq!(
            config.watchdog.keepalive_interval(30),
            Some(Duration::from_secs(10))
        );
        assert!(config.report.can_mail());
        assert_eq!(config.report.subject(), "HAS Cellar Debug Event");
        assert_eq!(
            config.expanded_script_file(),
            PathBuf::from("/etc/hasi/expanded_home.txt")
        );
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(
            ControllerConfig::from_yaml_str("").unwrap(),
            ControllerConfig::default()
        );
    }

    #[test]
    fn test_keepalive_follows_the_device_timeout() {
        let watchdog = WatchdogConfig {
            timeout_secs: 15,
            ..Default::default()
        };
        // the device reported 60 s although 15 s were requested
        assert_eq!(watchdog.keepalive_interval(60), Some(Duration::from_secs(40)));
        assert_eq!(watchdog.keepalive_interval(15), Some(Duration::from_secs(10)));
        assert_eq!(watchdog.keepalive_interval(0), None);

        let fixed = WatchdogConfig {
            interval_secs: 5,
            ..Default::default()
        };
        assert_eq!(fixed.keepalive_interval(0), Some(Duration::from_secs(5)));
        assert_eq!(WatchdogConfig::save_interval(9), Duration::from_secs(6));
    }

    #[test]
    fn test_validation_errors() {
        let err = ControllerConfig::from_yaml_str("event_loop_delay_ms: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field: "event_loop_delay_ms", .. }));

        let err = ControllerConfig::from_yaml_str("auto_delay_target: 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field: "auto_delay_target", .. }));

        let err = ControllerConfig::from_yaml_str("watchdog:\n  timeout_secs: 10\n  interval_secs: 10")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field: "watchdog.interval_secs", .. }));

        // 0 keeps the hardware timeout, so any interval is accepted here
        assert!(ControllerConfig::from_yaml_str("watchdog:\n  timeout_secs: 0\n  interval_secs: 20").is_ok());
        assert!(ControllerConfig::from_yaml_str("watchdog:\n  enabled: false\n  timeout_secs: 5\n  interval_secs: 9").is_ok());

        let err = ControllerConfig::from_yaml_str("event_loop_delay_ms: [1").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax(_)));
    }

    #[test]
    fn test_unknown_delay_mode() {
        assert!(ControllerConfig::from_yaml_str("delay_mode: sometimes").is_err());
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "restore_point_interval_secs: 0").unwrap();

        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.restore_point_interval(), None);
    }

    #[test]
    fn test_load_errors() {
        let err = ControllerConfig::load("/nonexistent/hasi.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "event_loop_delay_ms: [1, 2").unwrap();
        let err = ControllerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }
}
