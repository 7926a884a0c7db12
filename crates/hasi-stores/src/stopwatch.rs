//! Stopwatches measuring accumulated run time in milliseconds

use chrono::{DateTime, Utc};
use hasi_core::{Command, StopWatchAction};
use indexmap::IndexMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::clock::SharedClock;
use crate::persistence::{read_records, write_records, StoreResult};

/// A single stopwatch
#[derive(Debug, Clone, PartialEq)]
pub struct StopWatch {
    name: String,
    active: bool,
    started_at: DateTime<Utc>,
    accumulated_ms: u64,
}

impl StopWatch {
    /// A stopped stopwatch at zero
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            active: false,
            started_at: now,
            accumulated_ms: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Accumulated time plus the current run, if any
    pub fn elapsed(&self, now: DateTime<Utc>) -> u64 {
        if !self.active {
            return self.accumulated_ms;
        }
        let running = (now - self.started_at).num_milliseconds().max(0).unsigned_abs();
        self.accumulated_ms.saturating_add(running)
    }

    /// Start counting; a running stopwatch keeps its current run
    pub fn start(&mut self, now: DateTime<Utc>) {
        if !self.active {
            self.started_at = now;
            self.active = true;
        }
    }

    /// Freeze the accumulated time
    pub fn stop(&mut self, now: DateTime<Utc>) {
        if self.active {
            self.accumulated_ms = self.elapsed(now);
            self.active = false;
        }
    }

    /// Stop and clear
    pub fn reset(&mut self) {
        self.active = false;
        self.accumulated_ms = 0;
    }
}

/// Owns every stopwatch, keyed by name
#[derive(Debug)]
pub struct StopWatchManager {
    clock: SharedClock,
    stopwatches: IndexMap<String, StopWatch>,
}

impl StopWatchManager {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            stopwatches: IndexMap::new(),
        }
    }

    /// Get a stopwatch, creating a stopped one on first use
    pub fn find_or_create(&mut self, name: &str) -> &mut StopWatch {
        let now = self.clock.now();
        self.stopwatches
            .entry(name.to_string())
            .or_insert_with(|| StopWatch::new(name, now))
    }

    /// Value of `[stopWatch_<name>]` in milliseconds
    pub fn get_stopwatch(&mut self, name: &str) -> f64 {
        let now = self.clock.now();
        self.find_or_create(name).elapsed(now) as f64
    }

    /// Apply a stopwatch command; returns false for any other command
    pub fn execute(&mut self, cmd: &Command) -> bool {
        let Command::StopWatch { action, name } = cmd else {
            return false;
        };

        let now = self.clock.now();
        let stopwatch = self.find_or_create(name);
        match action {
            StopWatchAction::Reset => stopwatch.reset(),
            StopWatchAction::Start => stopwatch.start(now),
            StopWatchAction::Stop => stopwatch.stop(now),
        }
        true
    }

    pub fn len(&self) -> usize {
        self.stopwatches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stopwatches.is_empty()
    }

    /// Replace all stopwatches with the file's content
    ///
    /// Running stopwatches resume from their saved elapsed time. On error
    /// the store is left empty.
    pub fn load(&mut self, path: &Path) -> StoreResult<()> {
        self.stopwatches.clear();
        let now = self.clock.now();

        let mut loaded = IndexMap::new();
        for record in read_records(path, "stopWatch", 3)? {
            let mut stopwatch = StopWatch::new(record.name(), now);
            stopwatch.accumulated_ms = record.field(1)?;
            if record.flag(2)? {
                stopwatch.start(now);
            }
            loaded.insert(stopwatch.name.clone(), stopwatch);
        }

        debug!("Restored {} stopwatch(es)", loaded.len());
        self.stopwatches = loaded;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let now = self.clock.now();
        write_records(
            path,
            self.stopwatches
                .values()
                .map(|s| format!("{} {} {}", s.name, s.elapsed(now), u8::from(s.active))),
        )
    }
}

impl fmt::Display for StopWatchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let now = self.clock.now();
        for stopwatch in self.stopwatches.values() {
            writeln!(
                f,
                "{} elapsed: {} ({})",
                stopwatch.name,
                stopwatch.elapsed(now),
                if stopwatch.active { "active" } else { "inactive" }
            )?;
        }
        Ok(())
    }
}
