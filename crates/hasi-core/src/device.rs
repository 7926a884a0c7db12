//! Device bus abstraction
//!
//! Concrete hardware drivers live outside this workspace. The controller
//! only needs to look devices up by id, poll them, read input channels,
//! write output channels and flush pending output.

use crate::error::{DeviceError, DeviceResult, ParseError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A device on the bus
///
/// Digital channels carry 0/1, analog channels arbitrary values.
pub trait Device: Send {
    /// Bus-unique id, the first part of a connection id (`relay` in `relay.2`)
    fn id(&self) -> &str;

    /// Inactive devices are not read after the first cycle
    fn is_active(&self) -> bool;

    fn set_active(&mut self, active: bool);

    /// Refresh cached values; returns the delay in milliseconds the device
    /// needs before it can be read
    fn poll(&mut self) -> DeviceResult<u32> {
        Ok(0)
    }

    /// Number of readable channels
    fn input_channels(&self) -> usize {
        0
    }

    /// Read a channel (0-based)
    fn read(&mut self, channel: usize) -> DeviceResult<f64> {
        Err(DeviceError::ChannelOutOfRange {
            device: self.id().to_string(),
            channel,
            count: self.input_channels(),
        })
    }

    /// Number of writable channels
    fn output_channels(&self) -> usize {
        0
    }

    /// Set a channel (0-based); takes effect on [`Device::apply`]
    fn write(&mut self, channel: usize, value: f64) -> DeviceResult<()> {
        let _ = value;
        Err(DeviceError::ChannelOutOfRange {
            device: self.id().to_string(),
            channel,
            count: self.output_channels(),
        })
    }

    /// Push pending output values to the hardware
    fn apply(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    /// One-line description for bus listings
    fn describe(&self) -> String {
        format!(
            "{} ({} in, {} out, {})",
            self.id(),
            self.input_channels(),
            self.output_channels(),
            if self.is_active() { "active" } else { "inactive" }
        )
    }
}

/// The bus holding every device
pub trait DeviceBus: Send {
    /// Bring up the bus and its devices
    fn init(&mut self) -> DeviceResult<()>;

    /// Release the hardware
    fn shutdown(&mut self) {}

    /// Look up a device by id
    fn device_mut(&mut self, id: &str) -> DeviceResult<&mut dyn Device>;

    /// Ids of all devices in bus order
    fn device_ids(&self) -> Vec<String>;

    /// Multi-line listing of the bus
    fn describe(&self) -> String {
        self.device_ids().join("\n")
    }
}

/// The bus as shared between the controller and the activation manager
pub type SharedBus = Arc<Mutex<Box<dyn DeviceBus>>>;

/// Lock the shared bus, recovering the guard if a previous holder panicked
pub fn lock_bus(bus: &SharedBus) -> MutexGuard<'_, Box<dyn DeviceBus>> {
    bus.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A resolved `device[.channel]` id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub device: String,
    /// 0-based channel
    pub channel: usize,
}

/// Split `device[.channel]` where the channel is 1-based and defaults to 1
pub fn parse_device_id(id: &str) -> Result<DeviceId, ParseError> {
    let invalid = |reason: &str| ParseError::InvalidDeviceId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    if id.is_empty() {
        return Err(invalid("empty id"));
    }

    let mut parts = id.split('.');
    let device = parts.next().unwrap_or_default();
    let channel = parts.next();
    if parts.next().is_some() {
        return Err(invalid("too many dots"));
    }
    if device.is_empty() {
        return Err(invalid("empty device name"));
    }

    let channel = match channel {
        None => 0,
        Some(c) => match c.parse::<usize>() {
            Ok(n) if n >= 1 => n - 1,
            _ => return Err(invalid("channel must be a number starting at 1")),
        },
    };

    Ok(DeviceId {
        device: device.to_string(),
        channel,
    })
}
