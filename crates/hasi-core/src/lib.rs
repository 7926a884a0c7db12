//! Core types for the HASI controller
//!
//! This crate provides the fundamental types shared by the rule engine,
//! the persistent stores and the supervisor: [`Variable`], [`Command`],
//! the variable assignment vector ([`Vas`]), the error taxonomy, and the
//! traits behind which the external collaborators live (script engine,
//! device bus, script runner, notifier, remote command sources).

mod assignment;
mod command;
mod device;
mod engine;
mod error;
mod variable;

pub use assignment::{VarAssignment, VarStrAssignment, Vas};
pub use command::{ActivationAction, Command, StopWatchAction, TimerAction};
pub use device::{lock_bus, parse_device_id, Device, DeviceBus, DeviceId, SharedBus};
pub use engine::{CommandSource, Notifier, ScriptEngine, ScriptRunner};
pub use error::{
    DeviceError, DeviceResult, ExecuteError, ExecuteResult, ParseError, ParseResult,
};
pub use variable::{Special, Variable, VariableType};

/// System variables the supervisor feeds into every cycle (`[sys_<name>]`)
pub mod syscalls {
    /// 1 on the first cycle after a (re)parse, 0 afterwards
    pub const INIT: &str = "init";

    /// Mean fraction of the event-loop delay spent processing
    pub const LOAD: &str = "load";

    /// Ratio of overloaded ticks to normal ticks
    pub const OVERLOAD: &str = "overload";

    /// Current event-loop delay in milliseconds
    pub const DELAY: &str = "delay";

    /// All system variables in layout order
    pub const ALL: [&str; 4] = [INIT, LOAD, OVERLOAD, DELAY];

    /// Check whether `name` is a known system variable
    pub fn is_valid(name: &str) -> bool {
        ALL.contains(&name)
    }
}
