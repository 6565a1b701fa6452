//! Raw register block to engineering units

use crate::measurement::MeasurementSnapshot;
use pzem_core::register::*;
use pzem_core::{FrameError, PzemResult};

/// Volts per LSB is 0.1
pub const VOLTAGE_DIVISOR: f64 = 10.0;
/// Amperes per LSB is 0.001
pub const CURRENT_DIVISOR: f64 = 1000.0;
/// Watts per LSB is 0.1
pub const POWER_DIVISOR: f64 = 10.0;
/// Hertz per LSB is 0.1
pub const FREQUENCY_DIVISOR: f64 = 10.0;
/// Power factor per LSB is 0.01
pub const POWER_FACTOR_DIVISOR: f64 = 100.0;

/// Join a 32-bit quantity stored low word first
pub fn combine(low: u16, high: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

/// Decode the ten input registers starting at `REG_VOLTAGE`
///
/// Energy stays in watt-hours, see [`MeasurementSnapshot::energy_kwh`].
pub fn decode_measurements(registers: &[u16]) -> PzemResult<MeasurementSnapshot> {
    let expected = MEASUREMENT_REGISTER_COUNT as usize;
    if registers.len() != expected {
        return Err(FrameError::LengthMismatch {
            announced: expected * 2,
            actual: registers.len() * 2,
        }
        .into());
    }
    let reg = |r: u16| registers[r as usize];

    Ok(MeasurementSnapshot {
        voltage: f64::from(reg(REG_VOLTAGE)) / VOLTAGE_DIVISOR,
        current: f64::from(combine(reg(REG_CURRENT_L), reg(REG_CURRENT_H))) / CURRENT_DIVISOR,
        power: f64::from(combine(reg(REG_POWER_L), reg(REG_POWER_H))) / POWER_DIVISOR,
        energy: f64::from(combine(reg(REG_ENERGY_L), reg(REG_ENERGY_H))),
        frequency: f64::from(reg(REG_FREQUENCY)) / FREQUENCY_DIVISOR,
        power_factor: f64::from(reg(REG_POWER_FACTOR)) / POWER_FACTOR_DIVISOR,
        alarm_active: reg(REG_ALARM_STATUS) != 0,
    })
}
