//! The command looper

use hasi_config::ControllerConfig;
use hasi_core::{
    syscalls, Command, ExecuteError, ExecuteResult, Notifier, ParseResult, ScriptEngine,
    ScriptRunner, SharedBus, Special, VarStrAssignment, Variable, VariableType, Vas,
};
use hasi_stores::{StoreResult, Stores};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::activation::ActivationManager;
use crate::events::{EventLog, EventLogging, ValueDebug};
use crate::layout::Layout;
use crate::script_execute::ScriptExecuteManager;

/// Where the looper is in its life since the last (re)parse
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// No cycle has run on the current layout
    Uninitialized,
    /// Basic slot values of the previous cycle
    Running { previous: Vec<f64> },
}

/// Load figures the supervisor feeds into the `sys_` variables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SysValues {
    pub load: f64,
    pub overload: f64,
    pub delay_ms: u64,
}

impl SysValues {
    fn new(delay_ms: u64) -> Self {
        // -1 until the first load window has been measured
        Self {
            load: -1.0,
            overload: -1.0,
            delay_ms,
        }
    }
}

/// Runs one evaluation cycle of the rule script per call to [`execute`]
///
/// [`execute`]: CommandLooper::execute
pub struct CommandLooper {
    engine: Box<dyn ScriptEngine>,
    stores: Stores,
    layout: Layout,
    vas: Vas,
    phase: Phase,
    sys: SysValues,
    activations: ActivationManager,
    scripts: ScriptExecuteManager,
    events: EventLog,
    debug: ValueDebug,
    dump_request: Option<PathBuf>,
}

impl CommandLooper {
    /// Load the stores and lay out the variables of `engine`'s script
    pub fn new(
        config: &ControllerConfig,
        engine: Box<dyn ScriptEngine>,
        mut stores: Stores,
    ) -> ParseResult<Self> {
        stores.load_all();

        let mut looper = Self {
            engine,
            stores,
            layout: Layout::default(),
            vas: Vas::new(),
            phase: Phase::Uninitialized,
            sys: SysValues::new(u64::from(config.event_loop_delay_ms)),
            activations: ActivationManager::new(),
            scripts: ScriptExecuteManager::new(config.script_queue_size),
            events: EventLog::new(config.log_file.clone()),
            debug: ValueDebug::new(config.report.subject()),
            dump_request: None,
        };
        looper.compute_connections()?;
        Ok(looper)
    }

    /// Rebuild the layout from the engine's variables and restart the
    /// phase machine
    pub fn compute_connections(&mut self) -> ParseResult<()> {
        let layout = Layout::compute(&self.engine.variables())?;
        debug!(
            connections = layout.connections().len(),
            basics = layout.basics().len(),
            derived = layout.derived().len(),
            "Computed variable layout"
        );

        self.vas = layout.initial_vas();
        self.layout = layout;
        self.phase = Phase::Uninitialized;
        Ok(())
    }

    /// Run one cycle
    ///
    /// `inputs` must list the connections in order. Returns the output
    /// assignments of the triggered rules.
    pub fn execute(&mut self, inputs: &[VarStrAssignment]) -> ExecuteResult<Vec<VarStrAssignment>> {
        let connections = self.layout.connections();
        if inputs.len() != connections.len()
            || inputs.iter().zip(connections).any(|(a, c)| a.name != *c)
        {
            return Err(ExecuteError::OutOfSync {
                expected: connections.join(","),
                found: inputs
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            });
        }

        let init = self.phase == Phase::Uninitialized;
        let mut current = Vec::with_capacity(self.layout.basics().len());
        for (index, var) in self.layout.basics().iter().enumerate() {
            let value = match inputs.get(index) {
                Some(input) if var.var_type() == VariableType::Input => input.value,
                _ => slot_value(&mut self.stores, &self.sys, init, var),
            };
            self.vas.set_index(index, value);
            current.push(value);
        }

        let timestamp = self.timestamp();
        let offset = self.layout.derived_offset();
        let mut triggered = BTreeSet::new();

        match &self.phase {
            Phase::Uninitialized => {
                triggered.extend(self.layout.basics().iter().cloned());
                for k in 0..self.layout.derived().len() {
                    self.vas.set_index(offset + k, 0.0);
                }
            }
            Phase::Running { previous } => {
                for (index, var) in self.layout.basics().iter().enumerate() {
                    if current[index] != previous[index] {
                        triggered.insert(var.clone());
                        self.debug.report(&timestamp, var, current[index]);
                    }
                }

                for (k, slot) in self.layout.derived().iter().enumerate() {
                    let now = current[slot.watched];
                    let before = previous[slot.watched];
                    let changed = now != before;

                    let (value, fires) = match slot.var.special() {
                        Special::Change if changed => (now - before, true),
                        Special::On if changed && now != 0.0 => (1.0, true),
                        Special::Off if changed && now == 0.0 => (1.0, true),
                        _ => (0.0, false),
                    };

                    self.vas.set_index(offset + k, value);
                    if fires {
                        triggered.insert(slot.var.clone());
                        self.debug.report(&timestamp, &slot.var, value);
                    }
                }
            }
        }

        self.phase = Phase::Running { previous: current };

        if let Some(path) = self.dump_request.take() {
            if let Err(e) = self.write_dump(&path) {
                warn!("Failed to dump states to {:?}: {}", path, e);
            }
        }

        if triggered.is_empty() {
            return Ok(Vec::new());
        }

        self.events.log_triggers(&timestamp, &triggered, &self.vas);
        let commands = self.engine.execute(&triggered, &self.vas)?;
        self.events.log_commands(&timestamp, &commands);
        self.evaluate_commands(commands)
    }

    /// Dispatch commands in emission order; returns the output assignments
    pub fn evaluate_commands(&mut self, commands: Vec<Command>) -> ExecuteResult<Vec<VarStrAssignment>> {
        let mut outputs = Vec::new();

        for cmd in commands {
            let claimed = match &cmd {
                Command::Output { name, value } => {
                    outputs.push(VarStrAssignment::new(name.clone(), *value));
                    true
                }
                Command::State { .. } => self.stores.states.execute(&cmd),
                Command::Pulse { .. } => self.stores.pulses.execute(&cmd),
                Command::Timer { .. } => self.stores.timers.execute(&cmd),
                Command::StopWatch { .. } => self.stores.stopwatches.execute(&cmd),
                Command::Activation { .. } => self.activations.execute(&cmd)?,
                Command::ScriptExecute { .. } => self.scripts.execute(&cmd, &self.vas),
            };

            if !claimed {
                return Err(ExecuteError::UnrecognizedCommand(cmd.to_string()));
            }
        }

        Ok(outputs)
    }

    /// Re-read the script; with `apply` the layout is rebuilt
    pub fn reparse(&mut self, apply: bool) -> ParseResult<()> {
        self.engine.reparse(apply)?;
        if apply {
            self.compute_connections()?;
            info!("Script reloaded");
        }
        Ok(())
    }

    /// Parse a command line against the current assignments
    pub fn parse_commands(&self, line: &str) -> ParseResult<Vec<Command>> {
        self.engine.parse_commands(line, &self.vas)
    }

    /// Input connection ids, in the order `execute` expects them
    pub fn connections(&self) -> &[String] {
        self.layout.connections()
    }

    /// Output connection ids of the script
    pub fn outputs(&self) -> Vec<String> {
        self.engine.outputs()
    }

    pub fn current_vas(&self) -> &Vas {
        &self.vas
    }

    pub fn current_str_vas(&self) -> Vec<VarStrAssignment> {
        self.vas.to_str_assignments()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn set_sys_values(&mut self, load: f64, overload: f64, delay_ms: u64) {
        self.sys = SysValues {
            load,
            overload,
            delay_ms,
        };
    }

    pub fn sys_values(&self) -> SysValues {
        self.sys
    }

    /// Save every persistent store
    pub fn save_state(&self) -> StoreResult<()> {
        self.stores.save_all()
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn stores_mut(&mut self) -> &mut Stores {
        &mut self.stores
    }

    /// Write the script as the engine sees it
    pub fn write_parsed_script(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.engine.describe())
    }

    /// Dump all assignments and store contents on the next cycle
    pub fn dump_states(&mut self, path: impl Into<PathBuf>) {
        self.dump_request = Some(path.into());
    }

    fn write_dump(&self, path: &Path) -> io::Result<()> {
        fs::write(path, format!("{}\n{}\n", self.vas, self.stores))?;
        info!("States dumped to {:?}", path);
        Ok(())
    }

    pub fn event_logging(&self) -> EventLogging {
        self.events.mode()
    }

    pub fn set_event_logging(&mut self, mode: EventLogging) {
        self.events.set_mode(mode);
    }

    /// Toggle a name in the value debug list; returns the new list as text
    pub fn set_value_debug(&mut self, name: &str) -> String {
        self.debug.toggle(name)
    }

    pub fn set_print_value_debug(&mut self, print: bool) {
        self.debug.set_print(print);
    }

    pub fn mail_value_debug(&self) -> bool {
        self.debug.mail()
    }

    pub fn set_mail_value_debug(&mut self, mail: bool) {
        self.debug.set_mail(mail);
    }

    pub fn set_notifier(&mut self, notifier: Arc<dyn Notifier>) {
        self.debug.set_notifier(notifier);
    }

    /// Send a message through the notifier, if one is set
    pub fn notify(&self, body: &str) {
        self.debug.notify(body);
    }

    pub fn connect_activations(&mut self, bus: SharedBus) {
        self.activations.connect(bus);
    }

    pub fn set_script_runner(&mut self, runner: Arc<dyn ScriptRunner>) {
        self.scripts.set_runner(runner);
    }

    pub fn script_status(&self) -> String {
        self.scripts.status()
    }

    /// Stop the script worker, waiting up to `timeout`
    pub fn shutdown_scripts(&mut self, timeout: Duration) {
        self.scripts.shutdown(timeout);
    }

    /// Stop accepting scripts; the caller joins the returned worker
    pub fn close_scripts(&mut self) -> Option<JoinHandle<()>> {
        self.scripts.close()
    }

    /// The script after expansion, for the shell
    pub fn describe_script(&self) -> String {
        self.engine.describe()
    }

    fn timestamp(&self) -> String {
        self.stores
            .clock
            .local_now()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// Current value of a non-input basic slot
fn slot_value(stores: &mut Stores, sys: &SysValues, init: bool, var: &Variable) -> f64 {
    let name = var.name();
    match var.var_type() {
        VariableType::State => stores.states.get_state(name),
        VariableType::Pulse => stores.pulses.get_pulse(name),
        VariableType::Timer => stores.timers.get_timer(name),
        VariableType::StopWatch => stores.stopwatches.get_stopwatch(name),
        VariableType::Clock => stores.calendar.get_clock(name),
        VariableType::Random => stores.random.get_random(name),
        VariableType::System => match name {
            syscalls::INIT => f64::from(u8::from(init)),
            syscalls::LOAD => sys.load,
            syscalls::OVERLOAD => sys.overload,
            syscalls::DELAY => sys.delay_ms as f64,
            _ => 0.0,
        },
        VariableType::Input => 0.0,
    }
}

impl std::fmt::Debug for CommandLooper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandLooper")
            .field("layout", &self.layout)
            .field("phase", &self.phase)
            .field("sys", &self.sys)
            .finish_non_exhaustive()
    }
}
