//! Event logging and per-variable value debugging

use hasi_core::{Command, Notifier, Variable, Vas};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Where triggers and resulting commands are logged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventLogging {
    #[default]
    Off,
    /// Through `tracing` with target `hasi::events`
    Screen,
    /// Appended to the configured log file
    File,
}

/// Writes trigger and command listings
#[derive(Debug, Clone)]
pub struct EventLog {
    mode: EventLogging,
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: EventLogging::Off,
            path: path.into(),
        }
    }

    pub fn mode(&self) -> EventLogging {
        self.mode
    }

    pub fn set_mode(&mut self, mode: EventLogging) {
        self.mode = mode;
    }

    /// List the triggered variables with their current values
    pub fn log_triggers(&self, timestamp: &str, triggered: &BTreeSet<Variable>, vas: &Vas) {
        if self.mode == EventLogging::Off || triggered.is_empty() {
            return;
        }

        let mut text = format!("{timestamp} Triggers:\n");
        for var in triggered {
            let _ = write!(text, " {}", var.describe());
            if let Some(value) = vas.get(var) {
                let _ = write!(text, " = {value}");
            }
            text.push('\n');
        }
        self.emit(text);
    }

    /// List the commands the script produced
    pub fn log_commands(&self, timestamp: &str, commands: &[Command]) {
        if self.mode == EventLogging::Off || commands.is_empty() {
            return;
        }

        let mut text = format!("{timestamp} Resulting internal Commands:\n");
        for cmd in commands {
            let _ = writeln!(text, " {cmd}");
        }
        self.emit(text);
    }

    fn emit(&self, text: String) {
        match self.mode {
            EventLogging::Off => {}
            EventLogging::Screen => info!(target: "hasi::events", "{}", text.trim_end()),
            EventLogging::File => {
                let result = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .and_then(|mut file| writeln!(file, "{text}"));
                if let Err(e) = result {
                    warn!("Failed to write event log {:?}: {}", self.path, e);
                }
            }
        }
    }
}

/// Names whose value changes are reported
#[derive(Default)]
pub struct ValueDebug {
    names: Vec<String>,
    print: bool,
    mail: bool,
    subject: String,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ValueDebug {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            print: true,
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Toggle `name` in the watch list; an empty name clears the list
    pub fn toggle(&mut self, name: &str) -> String {
        if name.is_empty() {
            self.names.clear();
            return "cleared debug list".to_string();
        }

        let mut msg = match self.names.iter().position(|n| n == name) {
            Some(pos) => {
                self.names.remove(pos);
                format!("Removed {name} from debug list. ")
            }
            None => {
                self.names.push(name.to_string());
                format!("Added {name} to debug list. ")
            }
        };

        if self.names.is_empty() {
            msg.push_str("The list is now empty.");
        } else {
            msg.push_str("The list now contains: ");
            msg.push_str(&self.names.join(" "));
        }
        msg
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Pause or resume reporting
    pub fn set_print(&mut self, print: bool) {
        self.print = print;
    }

    pub fn mail(&self) -> bool {
        self.mail
    }

    /// Also send reports through the notifier
    pub fn set_mail(&mut self, mail: bool) {
        self.mail = mail;
    }

    pub fn set_notifier(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifier = Some(notifier);
    }

    /// Send a free-form message through the notifier, if mailing is set up
    pub fn notify(&self, body: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(&self.subject, body);
        }
    }

    /// Whether changes of `var` are being watched
    pub fn watches(&self, var: &Variable) -> bool {
        self.print && self.names.iter().any(|n| n == var.name())
    }

    /// Report a changed value of a watched variable
    pub fn report(&self, timestamp: &str, var: &Variable, value: f64) {
        if !self.watches(var) {
            return;
        }

        let line = format!("{timestamp} {} : {value}", var.describe());
        info!(target: "hasi::debug", "{}", line);

        if self.mail {
            let kind = match var.special() {
                hasi_core::Special::Basic => "variable",
                hasi_core::Special::Change => "change variable",
                hasi_core::Special::On => "on variable",
                hasi_core::Special::Off => "off variable",
            };
            self.notify(&format!("{kind} changed: {line}"));
        }
    }
}

impl std::fmt::Debug for ValueDebug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueDebug")
            .field("names", &self.names)
            .field("print", &self.print)
            .field("mail", &self.mail)
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Outbox(Mutex<Vec<(String, String)>>);

    impl Notifier for Outbox {
        fn notify(&self, subject: &str, body: &str) {
            self.0
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
        }
    }

    #[test]
    fn test_toggle_messages() {
        let mut debug = ValueDebug::new("HAS Debug Event");
        assert_eq!(
            debug.toggle("door"),
            "Added door to debug list. The list now contains: door"
        );
        assert_eq!(
            debug.toggle("x"),
            "Added x to debug list. The list now contains: door x"
        );
        assert_eq!(
            debug.toggle("door"),
            "Removed door from debug list. The list now contains: x"
        );
        assert_eq!(debug.toggle(""), "cleared debug list");
        assert!(debug.names().is_empty());
    }

    #[test]
    fn test_report_mails_watched_changes() {
        let outbox = Arc::new(Outbox::default());
        let mut debug = ValueDebug::new("HAS Debug Event");
        debug.set_notifier(outbox.clone());
        debug.toggle("door");

        let door = Variable::parse("[on_door]").unwrap();
        let other = Variable::parse("[window]").unwrap();

        debug.report("now", &door, 1.0);
        assert!(outbox.0.lock().unwrap().is_empty());

        debug.set_mail(true);
        debug.report("now", &door, 1.0);
        debug.report("now", &other, 1.0);

        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "HAS Debug Event");
        assert_eq!(sent[0].1, "on variable changed: now [door (on_input)] : 1");
    }

    #[test]
    fn test_paused_reporting() {
        let mut debug = ValueDebug::new("s");
        debug.toggle("door");
        debug.set_print(false);
        assert!(!debug.watches(&Variable::parse("[door]").unwrap()));
    }

    #[test]
    fn test_file_event_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");
        let mut log = EventLog::new(&path);

        let door = Variable::parse("[door]").unwrap();
        let triggered: BTreeSet<Variable> = [door.clone()].into_iter().collect();
        let vas: Vas = vec![(door, 1.0)].into_iter().collect();

        // off: nothing written
        log.log_triggers("t0", &triggered, &vas);
        assert!(!path.exists());

        log.set_mode(EventLogging::File);
        log.log_triggers("t1", &triggered, &vas);
        log.log_commands("t1", &[Command::output("lamp", 1.0)]);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("t1 Triggers:\n [door (input)] = 1\n"));
        assert!(content.contains("t1 Resulting internal Commands:\n [lamp] = 1\n"));
    }
}
