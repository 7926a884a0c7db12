//! Persistent scalar states

use hasi_core::Command;
use indexmap::IndexMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::persistence::{read_records, write_records, StoreResult};

/// A named value that survives restarts
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    name: String,
    value: f64,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> f64 {
        self.value
    }

    pub fn set(&mut self, value: f64) {
        self.value = value;
    }
}

/// Owns every state, keyed by name
#[derive(Debug, Default)]
pub struct StateManager {
    states: IndexMap<String, State>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a state, creating it at 0 on first use
    pub fn find_or_create(&mut self, name: &str) -> &mut State {
        self.states
            .entry(name.to_string())
            .or_insert_with(|| State::new(name))
    }

    /// Value of `[state_<name>]`
    pub fn get_state(&mut self, name: &str) -> f64 {
        self.find_or_create(name).get()
    }

    /// Apply a state command; returns false for any other command
    pub fn execute(&mut self, cmd: &Command) -> bool {
        let Command::State { name, value } = cmd else {
            return false;
        };
        self.find_or_create(name).set(*value);
        true
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Replace all states with the file's content
    ///
    /// On error the store is left empty.
    pub fn load(&mut self, path: &Path) -> StoreResult<()> {
        self.states.clear();

        let mut loaded = IndexMap::new();
        for record in read_records(path, "state", 2)? {
            let mut state = State::new(record.name());
            state.set(record.field(1)?);
            loaded.insert(state.name.clone(), state);
        }

        debug!("Restored {} state(s)", loaded.len());
        self.states = loaded;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> StoreResult<()> {
        write_records(
            path,
            self.states
                .values()
                .map(|s| format!("{} {}", s.name, s.value)),
        )
    }
}

impl fmt::Display for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for state in self.states.values() {
            writeln!(f, "{} is set to {}", state.name, state.value)?;
        }
        Ok(())
    }
}
