//! The command looper: one evaluation cycle of the rule script
//!
//! Each cycle the looper
//! 1. folds the raw input values and the store values into the assignment
//!    vector ([`Vas`](hasi_core::Vas)),
//! 2. compares it with the previous cycle to find the triggered variables
//!    and to derive the `change_`/`on_`/`off_` values,
//! 3. asks the script engine for the commands of the triggered rules, and
//! 4. dispatches those commands to the stores, the activation manager and
//!    the script runner, returning the output assignments for the bus.

mod activation;
mod events;
mod layout;
mod looper;
mod script_execute;

pub use activation::ActivationManager;
pub use events::{EventLog, EventLogging, ValueDebug};
pub use layout::Layout;
pub use looper::{CommandLooper, Phase, SysValues};
pub use script_execute::ScriptExecuteManager;
