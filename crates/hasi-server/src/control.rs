//! Single-letter control commands of the operator shell

use hasi_core::{lock_bus, ParseError, ParseResult};
use hasi_looper::EventLogging;
use std::fmt::Write as _;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};

use crate::controller::Controller;

const HELP: &str = "q: quit\n\
h: display has load\n\
l: list bus devices\n\
d: dump states into the dump file\n\
r <name>: report changes of a specific variable (no name clears the list)\n\
o: toggle screen event-logging\n\
e: toggle file event-logging\n\
c <command>: execute a hasi command\n\
i: re-initialize bus\n\
s: update script\n\
w: write expanded script to disk\n\
m: toggle email variable reports\n\
a: list active remotes\n\
x: restart remote listener\n\
t: list thread status\n\
+: increase event delay\n\
-: decrease event delay";

/// An operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Help,
    Quit,
    Load,
    ListBus,
    Dump,
    /// Toggle a variable name in the value debug list
    Report(String),
    ScreenLogging,
    FileLogging,
    /// Execute a command line as if a rule had emitted it
    Execute(String),
    Reinit,
    Reload,
    WriteScript,
    ToggleMail,
    ListRemotes,
    RestartRemotes,
    IncreaseDelay,
    DecreaseDelay,
    ThreadStatus,
}

impl ControlCommand {
    /// Parse a shell line; `None` for a blank line
    ///
    /// The first character selects the command, case-insensitively. `r` and
    /// `c` take the rest of the line as their argument.
    pub fn parse(line: &str) -> ParseResult<Option<Self>> {
        let line = line.trim();
        let mut chars = line.chars();
        let Some(letter) = chars.next() else {
            return Ok(None);
        };
        let argument = chars.as_str().trim().to_string();

        let command = match letter.to_ascii_lowercase() {
            '?' => Self::Help,
            'q' => Self::Quit,
            'h' => Self::Load,
            'l' => Self::ListBus,
            'd' => Self::Dump,
            'r' => Self::Report(argument),
            'o' => Self::ScreenLogging,
            'e' => Self::FileLogging,
            'c' => Self::Execute(argument),
            'i' => Self::Reinit,
            's' => Self::Reload,
            'w' => Self::WriteScript,
            'm' => Self::ToggleMail,
            'a' => Self::ListRemotes,
            'x' => Self::RestartRemotes,
            '+' => Self::IncreaseDelay,
            '-' => Self::DecreaseDelay,
            't' => Self::ThreadStatus,
            _ => return Err(ParseError::UnknownControlCommand(line.to_string())),
        };
        Ok(Some(command))
    }
}

/// Reply to a control command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlOutcome {
    pub reply: String,
    /// The controller is shutting down
    pub terminate: bool,
}

impl ControlOutcome {
    fn reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            terminate: false,
        }
    }

    fn terminate() -> Self {
        Self {
            reply: String::new(),
            terminate: true,
        }
    }
}

impl Controller {
    /// Parse and execute one shell line
    pub async fn execute_control_line(&self, line: &str) -> ParseResult<ControlOutcome> {
        match ControlCommand::parse(line)? {
            Some(command) => Ok(self.execute_control(command).await),
            None => Ok(ControlOutcome::default()),
        }
    }

    /// Execute an operator command
    pub async fn execute_control(&self, command: ControlCommand) -> ControlOutcome {
        match command {
            ControlCommand::Help => ControlOutcome::reply(HELP),
            ControlCommand::Quit => {
                info!("Shutdown requested from the shell");
                self.shutdown();
                ControlOutcome::terminate()
            }
            ControlCommand::Load => ControlOutcome::reply(self.lock().await.pacing.describe()),
            ControlCommand::IncreaseDelay => {
                let delay_ms = self.lock().await.pacing.double();
                ControlOutcome::reply(format!("Event delay set to {delay_ms} ms"))
            }
            ControlCommand::DecreaseDelay => {
                let delay_ms = self.lock().await.pacing.halve();
                ControlOutcome::reply(format!("Event delay set to {delay_ms} ms"))
            }
            ControlCommand::ThreadStatus => ControlOutcome::reply(self.thread_status().await),
            ControlCommand::ScreenLogging => {
                ControlOutcome::reply(self.toggle_event_logging(EventLogging::Screen).await)
            }
            ControlCommand::FileLogging => {
                ControlOutcome::reply(self.toggle_event_logging(EventLogging::File).await)
            }
            ControlCommand::Dump => {
                let path = self.config.dump_file.clone();
                self.lock().await.looper.dump_states(path.clone());
                ControlOutcome::reply(format!("States will be dumped to {}", path.display()))
            }
            ControlCommand::WriteScript => {
                let path = self.config.expanded_script_file();
                match self.lock().await.looper.write_parsed_script(&path) {
                    Ok(()) => ControlOutcome::reply(format!(
                        "Expanded script written to {}",
                        path.display()
                    )),
                    Err(e) => {
                        error!("Failed to write {:?}: {}", path, e);
                        ControlOutcome::reply("Error writing expanded script")
                    }
                }
            }
            ControlCommand::ListBus => {
                let bus = self.lock().await.bus.clone();
                let listing = lock_bus(&bus).describe();
                ControlOutcome::reply(format!("Listing HAS-Bus:\n{listing}"))
            }
            ControlCommand::ListRemotes => {
                let core = self.lock().await;
                let mut reply = "Listing active remotes:".to_string();
                for source in &core.sources {
                    let _ = write!(reply, "\n{}", source.describe());
                }
                ControlOutcome::reply(reply)
            }
            ControlCommand::RestartRemotes => {
                let mut core = self.lock().await;
                for source in &mut core.sources {
                    if let Err(e) = source.restart() {
                        warn!(source = source.name(), "Failed to restart: {}", e);
                    }
                }
                ControlOutcome::reply("Remote listeners restarted")
            }
            ControlCommand::ToggleMail => {
                let mail = {
                    let mut core = self.lock().await;
                    let mail = !core.looper.mail_value_debug();
                    core.looper.set_mail_value_debug(mail);
                    mail
                };
                let reply = if mail {
                    "Reporting via console AND email"
                } else {
                    "Reporting ONLY via console"
                };
                self.mail_debug_message(&format!("status changed: {reply}"))
                    .await;
                ControlOutcome::reply(reply)
            }
            ControlCommand::Report(name) => {
                let (message, mail) = {
                    let mut core = self.lock().await;
                    (
                        core.looper.set_value_debug(&name),
                        core.looper.mail_value_debug(),
                    )
                };
                info!("{}", message);
                if mail {
                    self.mail_debug_message(&message).await;
                }
                ControlOutcome::reply(message)
            }
            ControlCommand::Execute(line) => {
                if line.is_empty() {
                    return ControlOutcome::default();
                }
                match self.execute_line(&line).await {
                    Ok(()) => ControlOutcome::reply(format!("Command {line} executed successfully")),
                    Err(e) => {
                        error!("Error executing command: {}", e);
                        ControlOutcome::reply(format!("Error executing command: {e}"))
                    }
                }
            }
            ControlCommand::Reinit => ControlOutcome::reply(self.reinit().await),
            ControlCommand::Reload => self.reload().await,
        }
    }

    async fn toggle_event_logging(&self, mode: EventLogging) -> String {
        let mut core = self.lock().await;
        let next = if core.looper.event_logging() == EventLogging::Off {
            mode
        } else {
            EventLogging::Off
        };
        core.looper.set_event_logging(next);

        if next == EventLogging::Off {
            "Event logging: disabled".to_string()
        } else {
            "Event logging: enabled".to_string()
        }
    }

    async fn thread_status(&self) -> String {
        let mut lines = Vec::new();

        if self.loop_running.load(Ordering::Relaxed) {
            lines.push("event loop is running".to_string());
        } else {
            lines.push("event loop is NOT running".to_string());
        }

        if !self.config.watchdog.enabled {
            lines.push("watchdog pinger is disabled".to_string());
        } else if self.watchdog_running.load(Ordering::Relaxed) {
            lines.push("watchdog pinger is running".to_string());
        } else {
            lines.push("watchdog pinger is NOT running".to_string());
        }

        let core = self.lock().await;
        lines.push(core.looper.script_status());
        lines.push(format!("{} command source(s) connected", core.sources.len()));
        lines.join("\n")
    }

    /// Re-initialize the bus and rebuild the script wiring
    async fn reinit(&self) -> String {
        let mut core = self.lock().await;
        self.heartbeat.set_reinit(true);

        let result = {
            let mut bus = lock_bus(&core.bus);
            bus.shutdown();
            bus.init()
        };
        let reply = match result {
            Err(e) => {
                error!("Error during device init: {}", e);
                format!("Bus re-initialization failed: {e}")
            }
            Ok(()) => match core
                .looper
                .reparse(true)
                .and_then(|()| core.connect_devices())
            {
                Ok(()) => "Bus re-initialized".to_string(),
                Err(e) => {
                    error!("Bus re-initialized, but the script could not be connected: {}", e);
                    format!("Bus re-initialized, but the script could not be connected: {e}")
                }
            },
        };

        self.heartbeat.set_reinit(false);
        reply
    }

    /// Test the script, then apply it; a failing apply shuts down
    async fn reload(&self) -> ControlOutcome {
        let mut core = self.lock().await;

        if let Err(e) = core.looper.reparse(false) {
            error!("Error reloading script: {}", e);
            return ControlOutcome::reply(format!("Error reloading script: {e}"));
        }

        match core
            .looper
            .reparse(true)
            .and_then(|()| core.connect_devices())
        {
            Ok(()) => ControlOutcome::reply("Script reload successful"),
            Err(e) => {
                error!("Error reloading script, shutting down: {}", e);
                self.shutdown();
                ControlOutcome {
                    reply: format!("Error reloading script: {e}"),
                    terminate: true,
                }
            }
        }
    }

    async fn mail_debug_message(&self, message: &str) {
        if !self.config.report.can_mail() {
            warn!("no email address specified in config");
            return;
        }
        self.lock().await.looper.notify(message);
    }
}
