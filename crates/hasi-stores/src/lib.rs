//! Persistent stores manipulated by script commands
//!
//! Four stores survive restarts, each as a plain text file with one entity
//! per line:
//!
//! | store      | line format              |
//! |------------|--------------------------|
//! | timers     | `name leftover_ms active` |
//! | stopwatches| `name elapsed_ms active`  |
//! | states     | `name value`              |
//! | pulses     | `name value`              |
//!
//! Two more value sources are computed on demand and never persisted:
//! calendar fields (`[clock_*]`) and random numbers (`[random_*]`).

mod calendar;
mod clock;
mod persistence;
mod pulse;
mod random;
mod state;
mod stopwatch;
mod stores;
mod timer;

pub use calendar::{CalendarField, ClockManager};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use persistence::{StoreError, StoreResult};
pub use pulse::{Pulse, PulseManager};
pub use random::RandomManager;
pub use state::{State, StateManager};
pub use stopwatch::{StopWatch, StopWatchManager};
pub use stores::Stores;
pub use timer::{Timer, TimerManager};
