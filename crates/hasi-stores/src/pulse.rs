//! Read-once pulses

use hasi_core::Command;
use indexmap::IndexMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::persistence::{read_records, write_records, StoreResult};

/// A value that resets to 0 when read
#[derive(Debug, Clone, PartialEq)]
pub struct Pulse {
    name: String,
    value: f64,
}

impl Pulse {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the pending value and clear it
    pub fn get(&mut self) -> f64 {
        std::mem::take(&mut self.value)
    }

    /// Overwrite the pending value
    pub fn set(&mut self, value: f64) {
        self.value = value;
    }
}

/// Owns every pulse, keyed by name
#[derive(Debug, Default)]
pub struct PulseManager {
    pulses: IndexMap<String, Pulse>,
}

impl PulseManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a pulse, creating it at 0 on first use
    pub fn find_or_create(&mut self, name: &str) -> &mut Pulse {
        self.pulses
            .entry(name.to_string())
            .or_insert_with(|| Pulse::new(name))
    }

    /// Value of `[pulse_<name>]`; consumes it
    pub fn get_pulse(&mut self, name: &str) -> f64 {
        self.find_or_create(name).get()
    }

    /// Apply a pulse command; returns false for any other command
    pub fn execute(&mut self, cmd: &Command) -> bool {
        let Command::Pulse { name, value } = cmd else {
            return false;
        };
        self.find_or_create(name).set(*value);
        true
    }

    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    /// Replace all pulses with the file's content
    ///
    /// On error the store is left empty.
    pub fn load(&mut self, path: &Path) -> StoreResult<()> {
        self.pulses.clear();

        let mut loaded = IndexMap::new();
        for record in read_records(path, "pulse", 2)? {
            let mut pulse = Pulse::new(record.name());
            pulse.set(record.field(1)?);
            loaded.insert(pulse.name.clone(), pulse);
        }

        debug!("Restored {} pulse(s)", loaded.len());
        self.pulses = loaded;
        Ok(())
    }

    /// Persist pending values without consuming them
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        write_records(
            path,
            self.pulses
                .values()
                .map(|p| format!("{} {}", p.name, p.value)),
        )
    }
}

impl fmt::Display for PulseManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pulse in self.pulses.values() {
            writeln!(f, "{} is set to {}", pulse.name, pulse.value)?;
        }
        Ok(())
    }
}
