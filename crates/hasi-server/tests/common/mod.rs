//! Test doubles for the controller integration tests

#![allow(dead_code)]

use hasi_config::{ControllerConfig, StoreFiles};
use hasi_core::{
    Command, CommandSource, Device, DeviceBus, DeviceError, DeviceResult, ExecuteResult,
    ParseError, ParseResult, ScriptEngine, VarStrAssignment, Variable, Vas,
};
use hasi_server::Controller;
use hasi_stores::ManualClock;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Script engine emitting fixed commands for each triggered variable
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    pub rules: Vec<(Variable, Vec<Command>)>,
    pub outputs: Vec<String>,
    pub calls: Arc<Mutex<usize>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, trigger: &str, commands: Vec<Command>) -> Self {
        let trigger = Variable::parse(trigger).expect("valid trigger");
        self.rules.push((trigger, commands));
        self
    }

    pub fn with_output(mut self, name: &str) -> Self {
        self.outputs.push(name.to_string());
        self
    }
}

impl ScriptEngine for MockEngine {
    fn variables(&self) -> BTreeSet<Variable> {
        self.rules.iter().map(|(trigger, _)| trigger.clone()).collect()
    }

    fn outputs(&self) -> Vec<String> {
        self.outputs.clone()
    }

    fn execute(&mut self, triggered: &BTreeSet<Variable>, _vas: &Vas) -> ExecuteResult<Vec<Command>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self
            .rules
            .iter()
            .filter(|(trigger, _)| triggered.contains(trigger))
            .flat_map(|(_, commands)| commands.clone())
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
        format!("{} rule(s)", self.rules.len())
    }
}

/// Observable state of a [`MockDevice`]
#[derive(Debug, Default)]
pub struct DeviceState {
    pub active: bool,
    pub inputs: Vec<f64>,
    pub outputs: Vec<f64>,
    /// Output values in write order, as `(channel, value)`
    pub writes: Vec<(usize, f64)>,
    pub applies: usize,
    pub polls: usize,
    pub reads: usize,
    pub poll_delay_ms: u32,
}

#[derive(Debug, Clone)]
pub struct MockDevice {
    pub id: String,
    pub state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    pub fn new(id: &str, inputs: usize, outputs: usize) -> Self {
        Self {
            id: id.to_string(),
            state: Arc::new(Mutex::new(DeviceState {
                active: true,
                inputs: vec![0.0; inputs],
                outputs: vec![0.0; outputs],
                ..Default::default()
            })),
        }
    }

    pub fn set_input(&self, channel: usize, value: f64) {
        self.state.lock().unwrap().inputs[channel] = value;
    }

    pub fn set_poll_delay(&self, delay_ms: u32) {
        self.state.lock().unwrap().poll_delay_ms = delay_ms;
    }

    pub fn writes(&self) -> Vec<(usize, f64)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn applies(&self) -> usize {
        self.state.lock().unwrap().applies
    }

    pub fn polls(&self) -> usize {
        self.state.lock().unwrap().polls
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }
}

impl Device for MockDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    fn set_active(&mut self, active: bool) {
        self.state.lock().unwrap().active = active;
    }

    fn poll(&mut self) -> DeviceResult<u32> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        Ok(state.poll_delay_ms)
    }

    fn input_channels(&self) -> usize {
        self.state.lock().unwrap().inputs.len()
    }

    fn read(&mut self, channel: usize) -> DeviceResult<f64> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        state
            .inputs
            .get(channel)
            .copied()
            .ok_or_else(|| DeviceError::ChannelOutOfRange {
                device: self.id.clone(),
                channel,
                count: state.inputs.len(),
            })
    }

    fn output_channels(&self) -> usize {
        self.state.lock().unwrap().outputs.len()
    }

    fn write(&mut self, channel: usize, value: f64) -> DeviceResult<()> {
        let mut state = self.state.lock().unwrap();
        let count = state.outputs.len();
        let Some(slot) = state.outputs.get_mut(channel) else {
            return Err(DeviceError::ChannelOutOfRange {
                device: self.id.clone(),
                channel,
                count,
            });
        };
        *slot = value;
        state.writes.push((channel, value));
        Ok(())
    }

    fn apply(&mut self) -> DeviceResult<()> {
        self.state.lock().unwrap().applies += 1;
        Ok(())
    }
}

/// A bus over clones of the given devices; the clones share their state
#[derive(Debug, Default)]
pub struct MockBus {
    pub devices: Vec<MockDevice>,
    pub inits: Arc<Mutex<usize>>,
    pub shutdowns: Arc<Mutex<usize>>,
}

impl MockBus {
    pub fn new(devices: &[&MockDevice]) -> Self {
        Self {
            devices: devices.iter().map(|d| (*d).clone()).collect(),
            ..Default::default()
        }
    }
}

impl DeviceBus for MockBus {
    fn init(&mut self) -> DeviceResult<()> {
        *self.inits.lock().unwrap() += 1;
        Ok(())
    }

    fn shutdown(&mut self) {
        *self.shutdowns.lock().unwrap() += 1;
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

/// Remote command source fed and observed through shared vectors
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    pub pending: Arc<Mutex<Vec<String>>>,
    pub published: Arc<Mutex<Vec<Vec<VarStrAssignment>>>>,
}

impl MockSource {
    pub fn push(&self, line: &str) {
        self.pending.lock().unwrap().push(line.to_string());
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

impl CommandSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    fn publish(&mut self, vas: &[VarStrAssignment]) -> ExecuteResult<()> {
        self.published.lock().unwrap().push(vas.to_vec());
        Ok(())
    }
}

/// Controller configuration with every file below `dir` and no watchdog
pub fn test_config(dir: &Path) -> ControllerConfig {
    let mut config = ControllerConfig {
        script_file: dir.join("hasi.txt"),
        log_file: dir.join("events.log"),
        dump_file: dir.join("state_dump.txt"),
        stores: StoreFiles::in_dir(dir),
        event_loop_delay_ms: 5,
        shutdown_timeout_secs: 5,
        ..Default::default()
    };
    config.watchdog.enabled = false;
    config
}

pub fn controller(dir: &Path, engine: MockEngine, bus: MockBus) -> Controller {
    let clock = ManualClock::new();
    Controller::new(test_config(dir), Box::new(engine), Box::new(bus), clock.shared())
        .expect("valid controller")
}
