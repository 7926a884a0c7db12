//! Device activation commands

use hasi_core::{lock_bus, ActivationAction, Command, ExecuteResult, SharedBus};
use tracing::{debug, warn};

/// Enables and disables bus devices on behalf of the script
#[derive(Default)]
pub struct ActivationManager {
    bus: Option<SharedBus>,
}

impl ActivationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the bus the devices live on
    pub fn connect(&mut self, bus: SharedBus) {
        self.bus = Some(bus);
    }

    /// Apply an activation command; returns false for any other command
    ///
    /// An unknown device is an error. Without a bus the command is claimed
    /// and dropped with a warning.
    pub fn execute(&self, cmd: &Command) -> ExecuteResult<bool> {
        let Command::Activation { action, device } = cmd else {
            return Ok(false);
        };

        let Some(bus) = &self.bus else {
            warn!(device = %device, "No bus connected, ignoring activation command");
            return Ok(true);
        };

        let active = *action == ActivationAction::Activate;
        let mut bus = lock_bus(bus);
        bus.device_mut(device)?.set_active(active);
        debug!(device = %device, active, "Device activation changed");
        Ok(true)
    }
}

impl std::fmt::Debug for ActivationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationManager")
            .field("connected", &self.bus.is_some())
            .finish()
    }
}
