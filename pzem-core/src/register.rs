//! PZEM-004T register map and protocol constants

/// Input register: voltage, 0.1 V per LSB
pub const REG_VOLTAGE: u16 = 0x0000;
/// Input register: current low word, 0.001 A per LSB
pub const REG_CURRENT_L: u16 = 0x0001;
/// Input register: current high word
pub const REG_CURRENT_H: u16 = 0x0002;
/// Input register: active power low word, 0.1 W per LSB
pub const REG_POWER_L: u16 = 0x0003;
/// Input register: active power high word
pub const REG_POWER_H: u16 = 0x0004;
/// Input register: energy low word, 1 Wh per LSB
pub const REG_ENERGY_L: u16 = 0x0005;
/// Input register: energy high word
pub const REG_ENERGY_H: u16 = 0x0006;
/// Input register: frequency, 0.1 Hz per LSB
pub const REG_FREQUENCY: u16 = 0x0007;
/// Input register: power factor, 0.01 per LSB
pub const REG_POWER_FACTOR: u16 = 0x0008;
/// Input register: power alarm status, non-zero while the alarm is active
pub const REG_ALARM_STATUS: u16 = 0x0009;

/// Number of input registers in one measurement block
pub const MEASUREMENT_REGISTER_COUNT: u16 = 10;

/// Holding register: power alarm threshold in watts
pub const REG_ALARM_THRESHOLD: u16 = 0x0001;
/// Holding register: slave address
pub const REG_DEVICE_ADDRESS: u16 = 0x0002;

/// Valid alarm threshold range in watts
pub const ALARM_THRESHOLD_MIN: u16 = 1;
pub const ALARM_THRESHOLD_MAX: u16 = 25_000;

/// Password carried by the factory calibration command
pub const CALIBRATION_PASSWORD: u16 = 0x3721;

/// Register count limits of a single read request
pub const MIN_READ_COUNT: u16 = 1;
pub const MAX_READ_COUNT: u16 = 125;

/// Fixed link parameters of the device
pub const BAUD_RATE: u32 = 9600;
