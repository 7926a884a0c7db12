//! HASI controller runtime
//!
//! Wires the [`CommandLooper`](hasi_looper::CommandLooper) to the device bus
//! and runs it:
//!
//! - [`Controller`] owns the looper, the bus wiring and the remote command
//!   sources behind a single lock and runs one tick at a time
//! - [`run_event_loop`] paces the ticks and adapts the delay to the load
//! - the watchdog pinger resets the machine when ticks stop making progress
//! - [`run_shell`] executes single-letter control commands
//! - [`Controller::run`] ties it together and shuts down on a signal

mod control;
mod controller;
mod error;
mod pacing;
mod shell;
mod shutdown;
mod supervisor;
mod watchdog;

pub use control::{ControlCommand, ControlOutcome};
pub use controller::{Connection, Controller, TickStep};
pub use error::{ControllerError, ControllerResult};
pub use pacing::{LoadWindow, Pacing, WindowStats, WINDOW_TICKS};
pub use shell::run_shell;
pub use shutdown::wait_for_shutdown_signal;
pub use supervisor::run_event_loop;
pub use watchdog::{
    spawn_pinger, Heartbeat, LinuxWatchdog, StallDetector, Verdict, WatchdogDevice,
};
