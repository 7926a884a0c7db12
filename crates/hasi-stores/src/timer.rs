//! Countdown timers
//!
//! A timer reads as `1` exactly once, on the first read after it ran out,
//! and `0` otherwise. `[timer_remaining_<t>]` and `[timer_active_<t>]`
//! expose the remaining milliseconds and the running flag of timer `<t>`.

use chrono::{DateTime, Utc};
use hasi_core::{Command, TimerAction};
use indexmap::IndexMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::clock::SharedClock;
use crate::persistence::{read_records, write_records, StoreResult};

/// An expired timer nobody reads for this long stops counting as active
const STALE_EXPIRY_MS: i64 = 100_000;

/// A single countdown timer
#[derive(Debug, Clone, PartialEq)]
pub struct Timer {
    name: String,
    active: bool,
    started_at: DateTime<Utc>,
    duration_ms: u64,
}

impl Timer {
    /// An inactive timer
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            active: false,
            started_at: now,
            duration_ms: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signed remaining time, negative once expired
    fn raw_leftover(&self, now: DateTime<Utc>) -> i64 {
        let elapsed = (now - self.started_at).num_milliseconds();
        i64::try_from(self.duration_ms)
            .unwrap_or(i64::MAX)
            .saturating_sub(elapsed)
    }

    /// Restart with `duration_ms`
    pub fn set(&mut self, duration_ms: u64, now: DateTime<Utc>) {
        self.started_at = now;
        self.duration_ms = duration_ms;
        self.active = true;
    }

    /// Restart only if less than `duration_ms` remains
    pub fn set_max(&mut self, duration_ms: u64, now: DateTime<Utc>) {
        if self.leftover(now) < duration_ms {
            self.set(duration_ms, now);
        }
    }

    /// Restart only if the timer runs and more than `duration_ms` remains
    pub fn set_min(&mut self, duration_ms: u64, now: DateTime<Utc>) {
        if self.active && self.leftover(now) > duration_ms {
            self.set(duration_ms, now);
        }
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Remaining milliseconds, 0 when inactive or expired
    pub fn leftover(&mut self, now: DateTime<Utc>) -> u64 {
        if !self.active {
            return 0;
        }

        let leftover = self.raw_leftover(now);
        if leftover < 0 {
            if leftover < -STALE_EXPIRY_MS {
                self.active = false;
            }
            return 0;
        }
        leftover.unsigned_abs()
    }

    /// `1` on the first read after expiry, `0` otherwise
    pub fn get(&mut self, now: DateTime<Utc>) -> u64 {
        if self.active && self.leftover(now) == 0 {
            self.active = false;
            1
        } else {
            0
        }
    }

    /// Whether the timer is still counting down
    pub fn is_active(&mut self, now: DateTime<Utc>) -> bool {
        self.active && self.leftover(now) > 0
    }

    /// Line in the store file
    ///
    /// Running and expired-but-unread timers keep their active flag so the
    /// pending expiry survives a restart.
    fn to_line(&self, now: DateTime<Utc>) -> String {
        if self.active {
            format!("{} {} 1", self.name, self.raw_leftover(now).max(0))
        } else {
            format!("{} 0 0", self.name)
        }
    }
}

/// Owns every timer, keyed by name
#[derive(Debug)]
pub struct TimerManager {
    clock: SharedClock,
    timers: IndexMap<String, Timer>,
}

impl TimerManager {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            timers: IndexMap::new(),
        }
    }

    /// Get a timer, creating an inactive one on first use
    pub fn find_or_create(&mut self, name: &str) -> &mut Timer {
        let now = self.clock.now();
        self.timers
            .entry(name.to_string())
            .or_insert_with(|| Timer::new(name, now))
    }

    /// Value of `[timer_<name>]`, honoring the `remaining_`/`active_` prefixes
    pub fn get_timer(&mut self, name: &str) -> f64 {
        let now = self.clock.now();
        if let Some(timer) = name.strip_prefix("remaining_") {
            self.find_or_create(timer).leftover(now) as f64
        } else if let Some(timer) = name.strip_prefix("active_") {
            u8::from(self.find_or_create(timer).is_active(now)).into()
        } else {
            self.find_or_create(name).get(now) as f64
        }
    }

    /// Apply a timer command; returns false for any other command
    pub fn execute(&mut self, cmd: &Command) -> bool {
        let Command::Timer {
            action,
            name,
            value,
        } = cmd
        else {
            return false;
        };

        let now = self.clock.now();
        let duration = round_duration(*value);
        let timer = self.find_or_create(name);
        match action {
            TimerAction::Set => timer.set(duration, now),
            TimerAction::SetMax => timer.set_max(duration, now),
            TimerAction::SetMin => timer.set_min(duration, now),
            TimerAction::Stop => timer.stop(),
        }
        true
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Replace all timers with the file's content
    ///
    /// On error the store is left empty.
    pub fn load(&mut self, path: &Path) -> StoreResult<()> {
        self.timers.clear();
        let now = self.clock.now();

        let mut loaded = IndexMap::new();
        for record in read_records(path, "timer", 3)? {
            let leftover: u64 = record.field(1)?;
            let mut timer = Timer::new(record.name(), now);
            if record.flag(2)? {
                timer.set(leftover, now);
            }
            loaded.insert(timer.name.clone(), timer);
        }

        debug!("Restored {} timer(s)", loaded.len());
        self.timers = loaded;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let now = self.clock.now();
        write_records(path, self.timers.values().map(|t| t.to_line(now)))
    }
}

/// Command values are milliseconds, rounded half up; negatives clamp to 0
fn round_duration(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        (value + 0.5) as u64
    } else {
        0
    }
}

impl fmt::Display for TimerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let now = self.clock.now();
        for timer in self.timers.values() {
            writeln!(
                f,
                "{} remaining runtime: {} ({})",
                timer.name,
                timer.raw_leftover(now),
                if timer.active { "active" } else { "inactive" }
            )?;
        }
        Ok(())
    }
}
