//! All stores bundled together

use hasi_config::StoreFiles;
use std::fmt;
use tracing::{error, info};

use crate::calendar::ClockManager;
use crate::clock::SharedClock;
use crate::persistence::{StoreError, StoreResult};
use crate::pulse::PulseManager;
use crate::random::RandomManager;
use crate::state::StateManager;
use crate::stopwatch::StopWatchManager;
use crate::timer::TimerManager;

/// Every value source the looper reads from, with the files backing the
/// persistent ones
#[derive(Debug)]
pub struct Stores {
    pub files: StoreFiles,
    pub clock: SharedClock,
    pub timers: TimerManager,
    pub stopwatches: StopWatchManager,
    pub states: StateManager,
    pub pulses: PulseManager,
    pub calendar: ClockManager,
    pub random: RandomManager,
}

impl Stores {
    /// Empty stores backed by `files`
    pub fn new(files: StoreFiles, clock: SharedClock) -> Self {
        Self {
            files,
            timers: TimerManager::new(clock.clone()),
            stopwatches: StopWatchManager::new(clock.clone()),
            states: StateManager::new(),
            pulses: PulseManager::new(),
            calendar: ClockManager::new(clock.clone()),
            random: RandomManager::new(),
            clock,
        }
    }

    /// Replace the random source, e.g. with a seeded one
    pub fn with_random(mut self, random: RandomManager) -> Self {
        self.random = random;
        self
    }

    /// Load all persistent stores
    ///
    /// A store that fails to load is left empty; the failure is logged and
    /// does not prevent the others from loading. Returns the failures.
    pub fn load_all(&mut self) -> Vec<StoreError> {
        let results = [
            self.timers.load(&self.files.timer_file),
            self.stopwatches.load(&self.files.stopwatch_file),
            self.states.load(&self.files.state_file),
            self.pulses.load(&self.files.pulse_file),
        ];

        let failures: Vec<StoreError> = results.into_iter().filter_map(Result::err).collect();
        for e in &failures {
            error!("Failed to load store, starting empty: {}", e);
        }

        info!(
            timers = self.timers.len(),
            stopwatches = self.stopwatches.len(),
            states = self.states.len(),
            pulses = self.pulses.len(),
            "Stores loaded"
        );
        failures
    }

    /// Save all persistent stores
    ///
    /// Every store is attempted; the first failure is returned.
    pub fn save_all(&self) -> StoreResult<()> {
        let results = [
            self.timers.save(&self.files.timer_file),
            self.stopwatches.save(&self.files.stopwatch_file),
            self.states.save(&self.files.state_file),
            self.pulses.save(&self.files.pulse_file),
        ];

        let mut first = None;
        for result in results {
            if let Err(e) = result {
                error!("Failed to save store: {}", e);
                first.get_or_insert(e);
            }
        }

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Stores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Timers:\n{}", self.timers)?;
        writeln!(f, "StopWatches:\n{}", self.stopwatches)?;
        writeln!(f, "States:\n{}", self.states)?;
        writeln!(f, "Pulses:\n{}", self.pulses)?;
        write!(f, "Clock: {}", self.calendar)
    }
}
