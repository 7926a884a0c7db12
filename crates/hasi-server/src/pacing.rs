//! Event-loop pacing
//!
//! Every tick is followed by a sleep for the rest of the delay. A tick
//! that takes longer than the delay is an overload tick and is followed
//! immediately by the next. Over a window of ticks the mean load and the
//! overload ratio are measured, fed back into the script as system
//! variables, and used to nudge the delay in the automatic modes.

use hasi_config::DelayMode;
use std::time::Duration;

/// Ticks per measurement window
pub const WINDOW_TICKS: u32 = 5000;

/// Figures of one measurement window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    /// Mean fraction of the delay spent processing
    pub load_ratio: f64,
    /// Overload ticks per normal tick
    pub overload_ratio: f64,
}

/// Accumulates tick timings until a window is complete
#[derive(Debug, Clone, Default)]
pub struct LoadWindow {
    slack_ms: i64,
    normal: u32,
    overload: u32,
}

impl LoadWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tick of `elapsed` fits into `delay`
    pub fn is_normal(delay: Duration, elapsed: Duration) -> bool {
        delay > elapsed
    }

    /// Record one tick; returns the stats once the window is complete
    pub fn record(&mut self, delay: Duration, elapsed: Duration) -> Option<WindowStats> {
        let delay_ms = delay.as_millis() as i64;
        let elapsed_ms = elapsed.as_millis() as i64;

        if Self::is_normal(delay, elapsed) {
            self.normal += 1;
        } else {
            self.overload += 1;
        }
        self.slack_ms += delay_ms - elapsed_ms;

        if self.normal + self.overload <= WINDOW_TICKS {
            return None;
        }

        if self.normal == 0 {
            self.normal = 1;
            self.overload -= 1;
        }

        let ticks = f64::from(self.normal + self.overload);
        let delay_ms = delay_ms.max(1) as f64;
        let stats = WindowStats {
            load_ratio: (delay_ms - self.slack_ms as f64 / ticks) / delay_ms,
            overload_ratio: f64::from(self.overload) / f64::from(self.normal),
        };

        *self = Self::default();
        Some(stats)
    }

    /// Ticks recorded in the current window
    pub fn ticks(&self) -> u32 {
        self.normal + self.overload
    }
}

/// The current delay and the figures it was last adapted to
#[derive(Debug, Clone)]
pub struct Pacing {
    delay_ms: u64,
    mode: DelayMode,
    target: f64,
    load_ratio: f64,
    overload_ratio: f64,
}

impl Pacing {
    pub fn new(delay_ms: u64, mode: DelayMode, target: f64) -> Self {
        Self {
            delay_ms: delay_ms.max(1),
            mode,
            target,
            load_ratio: 0.0,
            overload_ratio: 0.0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn mode(&self) -> DelayMode {
        self.mode
    }

    pub fn load_ratio(&self) -> f64 {
        self.load_ratio
    }

    pub fn overload_ratio(&self) -> f64 {
        self.overload_ratio
    }

    /// Take the figures of a finished window and adapt the delay by 1 ms
    pub fn apply(&mut self, stats: WindowStats) -> u64 {
        self.load_ratio = stats.load_ratio;
        self.overload_ratio = stats.overload_ratio;

        let measured = match self.mode {
            DelayMode::Manual => return self.delay_ms,
            DelayMode::BasedOnLoad => self.load_ratio,
            DelayMode::BasedOnOverload => self.overload_ratio,
        };

        if self.delay_ms > 1 && measured < self.target {
            self.delay_ms -= 1;
        }
        if measured > self.target {
            self.delay_ms += 1;
        }
        self.delay_ms
    }

    pub fn double(&mut self) -> u64 {
        self.delay_ms = self.delay_ms.saturating_mul(2);
        self.delay_ms
    }

    pub fn halve(&mut self) -> u64 {
        self.delay_ms = (self.delay_ms / 2).max(1);
        self.delay_ms
    }

    /// Status line for the shell
    pub fn describe(&self) -> String {
        format!(
            "Has load is {} %, overload ratio {} %, event delay is set to {} ms{}",
            self.load_ratio * 100.0,
            self.overload_ratio * 100.0,
            self.delay_ms,
            if self.mode == DelayMode::Manual {
                ""
            } else {
                " automatically"
            }
        )
    }
}
