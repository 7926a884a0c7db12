//! Commands emitted by the script engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a timer command does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    /// Restart with the given duration
    Set,
    /// Restart only if the remaining time is shorter than the duration
    SetMax,
    /// Restart only if the remaining time is longer than the duration
    SetMin,
    /// Deactivate
    Stop,
}

/// What a stopwatch command does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopWatchAction {
    Reset,
    Start,
    Stop,
}

/// Whether an activation command enables or disables a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationAction {
    Activate,
    Deactivate,
}

/// A single effect requested by the script for the current cycle
///
/// Commands are immutable once built; the looper dispatches them in
/// emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    /// Drive an output channel
    Output { name: String, value: f64 },
    /// Set a persistent state
    State { name: String, value: f64 },
    /// Set a read-once pulse
    Pulse { name: String, value: f64 },
    /// Manipulate a countdown timer (value in milliseconds)
    Timer {
        action: TimerAction,
        name: String,
        value: f64,
    },
    /// Manipulate a stopwatch
    StopWatch {
        action: StopWatchAction,
        name: String,
    },
    /// Enable or disable a bus device
    Activation {
        action: ActivationAction,
        device: String,
    },
    /// Hand an auxiliary script to the script runner
    ScriptExecute { script: String },
}

impl Command {
    pub fn output(name: impl Into<String>, value: f64) -> Self {
        Self::Output {
            name: name.into(),
            value,
        }
    }

    pub fn state(name: impl Into<String>, value: f64) -> Self {
        Self::State {
            name: name.into(),
            value,
        }
    }

    pub fn pulse(name: impl Into<String>, value: f64) -> Self {
        Self::Pulse {
            name: name.into(),
            value,
        }
    }

    pub fn timer(action: TimerAction, name: impl Into<String>, value: f64) -> Self {
        Self::Timer {
            action,
            name: name.into(),
            value,
        }
    }

    pub fn stopwatch(action: StopWatchAction, name: impl Into<String>) -> Self {
        Self::StopWatch {
            action,
            name: name.into(),
        }
    }

    pub fn activation(action: ActivationAction, device: impl Into<String>) -> Self {
        Self::Activation {
            action,
            device: device.into(),
        }
    }

    pub fn script_execute(script: impl Into<String>) -> Self {
        Self::ScriptExecute {
            script: script.into(),
        }
    }

    /// Short command kind used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Output { .. } => "output",
            Self::State { .. } => "state",
            Self::Pulse { .. } => "pulse",
            Self::Timer { .. } => "timer",
            Self::StopWatch { .. } => "stopWatch",
            Self::Activation { .. } => "activation",
            Self::ScriptExecute { .. } => "scriptExecute",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output { name, value } => write!(f, "[{name}] = {value}"),
            Self::State { name, value } => write!(f, "[state_{name}] = {value}"),
            Self::Pulse { name, value } => write!(f, "[pulse_{name}] = {value}"),
            Self::Timer {
                action,
                name,
                value,
            } => match action {
                TimerAction::Set => write!(f, "[timer_{name}] = {value}"),
                TimerAction::SetMax => write!(f, "[timer_{name}] = max({value})"),
                TimerAction::SetMin => write!(f, "[timer_{name}] = min({value})"),
                TimerAction::Stop => write!(f, "[timer_{name}] = stop"),
            },
            Self::StopWatch { action, name } => {
                let action = match action {
                    StopWatchAction::Reset => "reset",
                    StopWatchAction::Start => "start",
                    StopWatchAction::Stop => "stop",
                };
                write!(f, "[stopWatch_{name}] = {action}")
            }
            Self::Activation { action, device } => match action {
                ActivationAction::Activate => write!(f, "activate {device}"),
                ActivationAction::Deactivate => write!(f, "deactivate {device}"),
            },
            Self::ScriptExecute { script } => write!(f, "execute {script}"),
        }
    }
}
