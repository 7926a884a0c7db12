//! Collaborator traits for the script engine and the side channels

use crate::assignment::{VarStrAssignment, Vas};
use crate::command::Command;
use crate::error::{ExecuteResult, ParseResult};
use crate::variable::Variable;
use std::collections::BTreeSet;

/// The rule script: knows its variables and turns triggers into commands
///
/// Parsing the script language is the engine's business; the looper only
/// needs the variable set to lay out the assignment vector and a way to
/// evaluate the rules that react to the triggered variables.
pub trait ScriptEngine: Send {
    /// Every variable the script references, derived ones included
    fn variables(&self) -> BTreeSet<Variable>;

    /// Output connection ids the script writes to
    fn outputs(&self) -> Vec<String>;

    /// Evaluate all rules triggered by `triggered`, in script order
    fn execute(&mut self, triggered: &BTreeSet<Variable>, vas: &Vas) -> ExecuteResult<Vec<Command>>;

    /// Parse a single right-hand side entered at the shell or received
    /// from a remote, evaluated against the current assignments
    fn parse_commands(&self, line: &str, vas: &Vas) -> ParseResult<Vec<Command>>;

    /// Re-read the script; with `apply == false` only validate it
    fn reparse(&mut self, apply: bool) -> ParseResult<()>;

    /// The script after template and alias expansion
    fn describe(&self) -> String;
}

/// Runs auxiliary scripts requested by `ScriptExecute` commands
pub trait ScriptRunner: Send + Sync {
    fn run(&self, script: &str, vas: &[VarStrAssignment]) -> ExecuteResult<()>;
}

/// Delivers debug reports (mail in the field)
pub trait Notifier: Send + Sync {
    fn notify(&self, subject: &str, body: &str);
}

/// A remote endpoint that sends command lines and receives assignments
pub trait CommandSource: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Take all command lines received since the last call
    fn drain(&mut self) -> Vec<String>;

    /// Push the current assignments to the remote side
    fn publish(&mut self, vas: &[VarStrAssignment]) -> ExecuteResult<()>;

    /// Description of connected peers
    fn describe(&self) -> String {
        self.name().to_string()
    }

    /// Tear down and re-establish the listener
    fn restart(&mut self) -> ExecuteResult<()> {
        Ok(())
    }
}
