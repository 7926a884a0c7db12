//! The controller: looper, device wiring and command sources under one lock

use hasi_config::ControllerConfig;
use hasi_core::{
    lock_bus, parse_device_id, CommandSource, DeviceBus, DeviceId, DeviceResult, ExecuteError,
    Notifier, ParseError, ParseResult, ScriptEngine, ScriptRunner, SharedBus, VarStrAssignment,
};
use hasi_looper::{CommandLooper, Phase};
use hasi_stores::{SharedClock, StoreResult, Stores};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ControllerResult;
use crate::pacing::{Pacing, WindowStats};
use crate::watchdog::Heartbeat;

/// Longest poll delay a device may request
const MAX_POLL_DELAY_MS: u32 = 1000;

/// How far the current tick got, as reported by the watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TickStep {
    Idle = 0,
    WaitingForLock = 1,
    Locked = 2,
    SourcesDone = 3,
    Polling = 5,
    ReadingInputs = 6,
    Executing = 7,
    ApplyingOutputs = 8,
    Failed = 9,
    Done = 10,
}

/// A script connection resolved to a device channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Id as written in the script (`relay.2`)
    pub name: String,
    pub device: String,
    /// 0-based channel
    pub channel: usize,
}

/// Everything a tick or an admin command touches
pub(crate) struct Core {
    pub(crate) looper: CommandLooper,
    pub(crate) bus: SharedBus,
    pub(crate) inputs: Vec<Connection>,
    pub(crate) outputs: Vec<Connection>,
    pub(crate) poll_devices: Vec<String>,
    pub(crate) sources: Vec<Box<dyn CommandSource>>,
    pub(crate) pacing: Pacing,
    remote_update_skip: u32,
    update_counter: u32,
}

/// Owns the looper and the bus and runs one tick at a time
pub struct Controller {
    pub(crate) config: ControllerConfig,
    core: AsyncMutex<Core>,
    pub(crate) heartbeat: Arc<Heartbeat>,
    pub(crate) cancel: CancellationToken,
    pub(crate) loop_running: AtomicBool,
    pub(crate) watchdog_running: Arc<AtomicBool>,
}

impl Controller {
    /// Bring up the bus, load the stores, lay out the script and wire it
    /// to the devices
    pub fn new(
        config: ControllerConfig,
        engine: Box<dyn ScriptEngine>,
        mut bus: Box<dyn DeviceBus>,
        clock: SharedClock,
    ) -> ControllerResult<Self> {
        config.validate()?;

        info!("Initializing bus");
        bus.init()?;

        info!("Initializing command script");
        let stores = Stores::new(config.stores.clone(), clock);
        let looper = CommandLooper::new(&config, engine, stores)?;
        info!("Script parsed ok");

        let mut core = Core {
            looper,
            bus: Arc::new(Mutex::new(bus)),
            inputs: Vec::new(),
            outputs: Vec::new(),
            poll_devices: Vec::new(),
            sources: Vec::new(),
            pacing: Pacing::new(
                u64::from(config.event_loop_delay_ms),
                config.delay_mode,
                config.auto_delay_target,
            ),
            remote_update_skip: config.remote_update_skip,
            update_counter: config.remote_update_skip,
        };
        core.connect_devices()?;
        info!(
            inputs = core.inputs.len(),
            outputs = core.outputs.len(),
            devices = core.poll_devices.len(),
            "Script connected ok"
        );

        Ok(Self {
            config,
            core: AsyncMutex::new(core),
            heartbeat: Arc::new(Heartbeat::new()),
            cancel: CancellationToken::new(),
            loop_running: AtomicBool::new(false),
            watchdog_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Hand `ScriptExecute` commands to `runner`
    pub fn with_script_runner(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.core.get_mut().looper.set_script_runner(runner);
        self
    }

    /// Send value-debug reports and status messages through `notifier`
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.core.get_mut().looper.set_notifier(notifier);
        self
    }

    /// Accept command lines from `source` and publish assignments to it
    pub fn with_command_source(mut self, source: Box<dyn CommandSource>) -> Self {
        self.core.get_mut().sources.push(source);
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn heartbeat(&self) -> Arc<Heartbeat> {
        self.heartbeat.clone()
    }

    /// Token cancelled when the controller shuts down
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().await
    }

    /// Current event-loop delay
    pub async fn delay(&self) -> Duration {
        self.lock().await.pacing.delay()
    }

    /// Run one tick; returns the delay to keep until the next one
    ///
    /// Failures are logged and end the tick early.
    pub async fn tick(&self) -> Duration {
        self.heartbeat.beat();
        self.set_step(TickStep::WaitingForLock);

        let mut core = self.lock().await;
        self.set_step(TickStep::Locked);
        let delay = core.pacing.delay();

        if let Err(e) = core.run_sources() {
            error!("Error executing remote command: {}", e);
            self.set_step(TickStep::Idle);
            return delay;
        }
        self.set_step(TickStep::SourcesDone);

        if self.cancel.is_cancelled() {
            self.set_step(TickStep::Idle);
            return delay;
        }

        self.set_step(TickStep::Polling);
        let poll_delay = core.poll_devices();
        if poll_delay > 0 {
            tokio::time::sleep(Duration::from_millis(u64::from(poll_delay))).await;
        }

        self.set_step(TickStep::ReadingInputs);
        let inputs = match core.read_inputs() {
            Ok(inputs) => inputs,
            Err(e) => {
                error!("Failed to read inputs: {}", e);
                self.set_step(TickStep::Failed);
                return delay;
            }
        };
        core.publish();

        self.set_step(TickStep::Executing);
        match core.looper.execute(&inputs) {
            Ok(values) => {
                self.set_step(TickStep::ApplyingOutputs);
                core.apply_outputs(&values);
            }
            Err(e) => {
                self.set_step(TickStep::Failed);
                error!("Error during script execution: {}", e);
            }
        }

        self.set_step(TickStep::Done);
        delay
    }

    /// Feed a finished load window back into the pacing and the script
    pub async fn apply_window(&self, stats: WindowStats) -> u64 {
        let mut core = self.lock().await;
        let delay_ms = core.pacing.apply(stats);
        core.looper
            .set_sys_values(stats.load_ratio, stats.overload_ratio, delay_ms);
        debug!(
            load = stats.load_ratio,
            overload = stats.overload_ratio,
            delay_ms,
            "Load window complete"
        );
        delay_ms
    }

    /// Parse and execute a command line as if a rule had emitted it
    pub async fn execute_line(&self, line: &str) -> Result<(), ExecuteError> {
        self.lock().await.execute_line(line)
    }

    pub async fn save_state(&self) -> StoreResult<()> {
        self.lock().await.looper.save_state()
    }

    /// Input connections in looper order
    pub async fn inputs(&self) -> Vec<Connection> {
        self.lock().await.inputs.clone()
    }

    pub async fn outputs(&self) -> Vec<Connection> {
        self.lock().await.outputs.clone()
    }

    /// Distinct devices polled every tick
    pub async fn poll_devices(&self) -> Vec<String> {
        self.lock().await.poll_devices.clone()
    }

    pub async fn current_vas(&self) -> Vec<VarStrAssignment> {
        self.lock().await.looper.current_str_vas()
    }

    /// The shared bus the looper activates devices on
    pub async fn bus(&self) -> SharedBus {
        self.lock().await.bus.clone()
    }

    fn set_step(&self, step: TickStep) {
        self.heartbeat.set_step(step as u8);
    }
}

impl Core {
    /// Resolve connections and outputs to device channels
    pub(crate) fn connect_devices(&mut self) -> ParseResult<()> {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut poll_devices: Vec<String> = Vec::new();

        {
            let mut bus = lock_bus(&self.bus);
            for id in self.looper.connections() {
                let connection = resolve(&mut **bus, id, Direction::Input)?;
                if !poll_devices.contains(&connection.device) {
                    poll_devices.push(connection.device.clone());
                }
                inputs.push(connection);
            }
            for id in self.looper.outputs() {
                outputs.push(resolve(&mut **bus, &id, Direction::Output)?);
            }
        }

        self.inputs = inputs;
        self.outputs = outputs;
        self.poll_devices = poll_devices;
        self.looper.connect_activations(self.bus.clone());
        Ok(())
    }

    /// Execute every pending line of every command source
    fn run_sources(&mut self) -> Result<(), ExecuteError> {
        for index in 0..self.sources.len() {
            let lines = self.sources[index].drain();
            for line in lines {
                self.execute_line(&line)?;
            }
        }
        Ok(())
    }

    /// Parse errors are logged; execution errors are returned
    pub(crate) fn execute_line(&mut self, line: &str) -> Result<(), ExecuteError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let commands = match self.looper.parse_commands(line) {
            Ok(commands) => commands,
            Err(e) => {
                error!("Error reading command '{}': {}", line, e);
                return Ok(());
            }
        };

        let values = self.looper.evaluate_commands(commands)?;
        self.apply_outputs(&values);
        debug!("Command {} executed", line);
        Ok(())
    }

    /// Poll every device once; returns the delay they asked for
    fn poll_devices(&mut self) -> u32 {
        let mut bus = lock_bus(&self.bus);
        let mut delay_ms = 0;
        for id in &self.poll_devices {
            match bus.device_mut(id).and_then(|device| device.poll()) {
                Ok(ms) => delay_ms = delay_ms.max(ms),
                Err(e) => warn!(device = %id, "Poll failed: {}", e),
            }
        }

        if delay_ms > MAX_POLL_DELAY_MS {
            warn!(
                "Caught large poll delay ({} ms), waiting the maximum time of {} ms",
                delay_ms, MAX_POLL_DELAY_MS
            );
            delay_ms = MAX_POLL_DELAY_MS;
        }
        delay_ms
    }

    /// Read every input connection
    ///
    /// Inactive devices keep their previous value, except on the first
    /// cycle of a layout.
    fn read_inputs(&mut self) -> DeviceResult<Vec<VarStrAssignment>> {
        let first = *self.looper.phase() == Phase::Uninitialized;
        let vas = self.looper.current_vas();
        let mut bus = lock_bus(&self.bus);

        let mut values = Vec::with_capacity(self.inputs.len());
        for (index, connection) in self.inputs.iter().enumerate() {
            let device = bus.device_mut(&connection.device)?;
            let value = if first || device.is_active() {
                device.read(connection.channel)?
            } else {
                vas.get_index(index).map(|(_, v)| v).unwrap_or_default()
            };
            values.push(VarStrAssignment::new(connection.name.clone(), value));
        }
        Ok(values)
    }

    /// Publish the assignments every `remote_update_skip + 1` ticks
    fn publish(&mut self) {
        if self.sources.is_empty() {
            return;
        }

        if self.update_counter < self.remote_update_skip {
            self.update_counter += 1;
            return;
        }
        self.update_counter = 0;

        let vas = self.looper.current_str_vas();
        for source in &mut self.sources {
            if let Err(e) = source.publish(&vas) {
                warn!(source = source.name(), "Failed to publish assignments: {}", e);
            }
        }
    }

    /// Write output values and flush every output device
    pub(crate) fn apply_outputs(&mut self, values: &[VarStrAssignment]) {
        let mut bus = lock_bus(&self.bus);

        for assignment in values {
            let Some(output) = self.outputs.iter().find(|o| o.name == assignment.name) else {
                warn!("Cannot find output {}", assignment.name);
                continue;
            };
            let written = bus
                .device_mut(&output.device)
                .and_then(|device| device.write(output.channel, assignment.value));
            if let Err(e) = written {
                warn!(output = %output.name, "Failed to write output: {}", e);
            }
        }

        let mut applied: Vec<&str> = Vec::new();
        for output in &self.outputs {
            if applied.contains(&output.device.as_str()) {
                continue;
            }
            applied.push(&output.device);
            if let Err(e) = bus.device_mut(&output.device).and_then(|device| device.apply()) {
                warn!(device = %output.device, "Failed to apply outputs: {}", e);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Input,
    Output,
}

/// Resolve `device[.channel]` against the bus
fn resolve(bus: &mut dyn DeviceBus, id: &str, direction: Direction) -> ParseResult<Connection> {
    let DeviceId { device, channel } = parse_device_id(id)?;

    let found = bus.device_mut(&device).map_err(|_| ParseError::InvalidDeviceId {
        id: id.to_string(),
        reason: format!("unknown device {device}"),
    })?;

    let (kind, count) = match direction {
        Direction::Input => ("input", found.input_channels()),
        Direction::Output => ("output", found.output_channels()),
    };
    if channel >= count {
        return Err(ParseError::InvalidDeviceId {
            id: id.to_string(),
            reason: format!("invalid {kind} device channel (min:1, max:{count})"),
        });
    }

    Ok(Connection {
        name: id.to_string(),
        device,
        channel,
    })
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .field("loop_running", &self.loop_running.load(Ordering::Relaxed))
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
