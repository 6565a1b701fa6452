//! Modbus slave addressing

use crate::error::{PzemError, PzemResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest address a device may be configured with
pub const MIN_SLAVE_ADDRESS: u8 = 0x01;
/// Highest address a device may be configured with
pub const MAX_SLAVE_ADDRESS: u8 = 0xF7;

/// Slave address byte on the bus
///
/// Any byte can be targeted (0xF8 reaches a lone device whatever its
/// configured address), but only 1..=247 can be written to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    /// General address answered by a single device on the link
    pub const DEFAULT: DeviceAddress = DeviceAddress(0xF8);
    /// Broadcast address, never answered
    pub const BROADCAST: DeviceAddress = DeviceAddress(0x00);
    /// Address the factory calibration command must be sent to
    pub const CALIBRATION: DeviceAddress = DeviceAddress(0xF8);

    /// Wrap a raw address byte without range checks
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Create an address that may be assigned to a device (1..=247)
    pub fn slave(value: u8) -> PzemResult<Self> {
        if (MIN_SLAVE_ADDRESS..=MAX_SLAVE_ADDRESS).contains(&value) {
            Ok(Self(value))
        } else {
            Err(PzemError::Validation(format!(
                "Address must be between {} and {}, got {}",
                MIN_SLAVE_ADDRESS, MAX_SLAVE_ADDRESS, value
            )))
        }
    }

    pub const fn value(&self) -> u8 {
        self.0
    }

    pub fn is_assignable(&self) -> bool {
        (MIN_SLAVE_ADDRESS..=MAX_SLAVE_ADDRESS).contains(&self.0)
    }
}

impl Default for DeviceAddress {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for DeviceAddress {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}
