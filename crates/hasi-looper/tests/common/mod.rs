//! Test doubles for the looper integration tests

#![allow(dead_code)]

use hasi_config::{ControllerConfig, StoreFiles};
use hasi_core::{
    Command, Device, DeviceBus, DeviceError, DeviceResult, ExecuteResult, ParseError,
    ParseResult, ScriptEngine, SharedBus, Variable, Vas,
};
use hasi_looper::CommandLooper;
use hasi_stores::{ManualClock, Stores};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A rule: commands emitted whenever `trigger` is among the triggered variables
#[derive(Debug, Clone)]
pub struct Rule {
    pub trigger: Variable,
    pub commands: Vec<Command>,
}

/// Script engine driven by a fixed rule table
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    pub rules: Vec<Rule>,
    pub variables: Vec<Variable>,
    pub outputs: Vec<String>,
    /// Triggered sets of every engine call
    pub calls: Arc<Mutex<Vec<BTreeSet<Variable>>>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, trigger: &str, commands: Vec<Command>) -> Self {
        self.rules.push(Rule {
            trigger: Variable::parse(trigger).expect("valid trigger"),
            commands,
        });
        self
    }

    pub fn with_variable(mut self, token: &str) -> Self {
        self.variables
            .push(Variable::parse(token).expect("valid variable"));
        self
    }

    pub fn with_output(mut self, name: &str) -> Self {
        self.outputs.push(name.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ScriptEngine for MockEngine {
    fn variables(&self) -> BTreeSet<Variable> {
        self.rules
            .iter()
            .map(|r| r.trigger.clone())
            .chain(self.variables.iter().cloned())
            .collect()
    }

    fn outputs(&self) -> Vec<String> {
        self.outputs.clone()
    }

    fn execute(&mut self, triggered: &BTreeSet<Variable>, _vas: &Vas) -> ExecuteResult<Vec<Command>> {
        self.calls.lock().unwrap().push(triggered.clone());
        Ok(self
            .rules
            .iter()
            .filter(|r| triggered.contains(&r.trigger))
            .flat_map(|r| r.commands.clone())
            .collect())
    }

    /// Accepts `name = value` lines as output commands
    fn parse_commands(&self, line: &str, _vas: &Vas) -> ParseResult<Vec<Command>> {
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| ParseError::Script(format!("expected assignment: {line}")))?;
        let value = value
            .trim()
            .parse::<f64>()
            .map_err(|e| ParseError::Script(e.to_string()))?;
        Ok(vec![Command::output(name.trim(), value)])
    }

    fn reparse(&mut self, _apply: bool) -> ParseResult<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        self.rules
            .iter()
            .map(|r| format!("{} -> {} command(s)", r.trigger, r.commands.len()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A device with fixed channel counts that records its activation
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub id: String,
    pub active: Arc<Mutex<bool>>,
}

impl Device for MockDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_active(&self) -> bool {
        *self.active.lock().unwrap()
    }

    fn set_active(&mut self, active: bool) {
        *self.active.lock().unwrap() = active;
    }
}

#[derive(Debug, Default)]
pub struct MockBus {
    pub devices: Vec<MockDevice>,
}

impl DeviceBus for MockBus {
    fn init(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    fn device_mut(&mut self, id: &str) -> DeviceResult<&mut dyn Device> {
        self.devices
            .iter_mut()
            .find(|d| d.id == id)
            .map(|d| d as &mut dyn Device)
            .ok_or_else(|| DeviceError::NotFound(id.to_string()))
    }

    fn device_ids(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.id.clone()).collect()
    }
}

/// A bus with a single device; returns the bus and the device's activation flag
pub fn single_device_bus(id: &str) -> (SharedBus, Arc<Mutex<bool>>) {
    let active = Arc::new(Mutex::new(true));
    let bus = MockBus {
        devices: vec![MockDevice {
            id: id.to_string(),
            active: active.clone(),
        }],
    };
    (Arc::new(Mutex::new(Box::new(bus))), active)
}

/// A looper over stores in `dir`, driven by `clock`
pub fn looper_in(dir: &Path, clock: &ManualClock, engine: MockEngine) -> CommandLooper {
    let config = ControllerConfig {
        log_file: dir.join("events.log"),
        ..Default::default()
    };
    let stores = Stores::new(StoreFiles::in_dir(dir), clock.shared());
    CommandLooper::new(&config, Box::new(engine), stores).expect("valid layout")
}
