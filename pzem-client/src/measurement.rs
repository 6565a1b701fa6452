//! Measurement snapshot, display formatting and datasheet range checks

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// One decoded measurement block
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasurementSnapshot {
    /// Volts
    pub voltage: f64,
    /// Amperes
    pub current: f64,
    /// Watts
    pub power: f64,
    /// Watt-hours accumulated since the last reset
    pub energy: f64,
    /// Hertz
    pub frequency: f64,
    /// 0.00 to 1.00
    pub power_factor: f64,
    pub alarm_active: bool,
}

impl MeasurementSnapshot {
    pub fn energy_kwh(&self) -> f64 {
        self.energy / 1000.0
    }

    /// Human readable strings with units
    pub fn format(&self) -> FormattedMeasurements {
        let power = if self.power < 1000.0 {
            format!("{:.1}W", self.power)
        } else {
            format!("{:.0}W", self.power)
        };
        let energy = if self.energy_kwh() < 10.0 {
            format!("{:.0}Wh", self.energy)
        } else {
            format!("{:.2}kWh", self.energy_kwh())
        };

        FormattedMeasurements {
            voltage: format!("{:.1}V", self.voltage),
            current: format!("{:.3}A", self.current),
            power,
            energy,
            frequency: format!("{:.1}Hz", self.frequency),
            power_factor: format!("{:.2}", self.power_factor),
            alarm: if self.alarm_active { "ON" } else { "OFF" }.to_string(),
        }
    }

    /// Values outside the datasheet ranges of `model`
    pub fn range_violations(&self, model: MeterModel) -> Vec<RangeViolation> {
        let limits = model.limits();
        [
            ("voltage", self.voltage, limits.voltage),
            ("current", self.current, limits.current),
            ("power", self.power, limits.power),
            ("energy", self.energy, limits.energy),
            ("frequency", self.frequency, limits.frequency),
            ("power_factor", self.power_factor, limits.power_factor),
        ]
        .into_iter()
        .filter(|(_, value, range)| !range.contains(value))
        .map(|(field, value, range)| RangeViolation {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
        .collect()
    }
}

impl fmt::Display for MeasurementSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.format();
        writeln!(f, "Voltage:      {}", s.voltage)?;
        writeln!(f, "Current:      {}", s.current)?;
        writeln!(f, "Power:        {}", s.power)?;
        writeln!(f, "Energy:       {}", s.energy)?;
        writeln!(f, "Frequency:    {}", s.frequency)?;
        writeln!(f, "Power factor: {}", s.power_factor)?;
        write!(f, "Alarm:        {}", s.alarm)
    }
}

/// Display strings for every measured quantity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedMeasurements {
    pub voltage: String,
    pub current: String,
    pub power: String,
    pub energy: String,
    pub frequency: String,
    pub power_factor: String,
    pub alarm: String,
}

/// Hardware variant, which decides the current and power ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterModel {
    /// Built-in shunt
    #[default]
    Range10A,
    /// External current transformer
    Range100A,
}

/// Inclusive measurement ranges of one [`MeterModel`]
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementLimits {
    pub voltage: RangeInclusive<f64>,
    pub current: RangeInclusive<f64>,
    pub power: RangeInclusive<f64>,
    pub energy: RangeInclusive<f64>,
    pub frequency: RangeInclusive<f64>,
    pub power_factor: RangeInclusive<f64>,
}

impl MeterModel {
    pub fn limits(&self) -> MeasurementLimits {
        let (current, power) = match self {
            MeterModel::Range10A => (0.0..=10.0, 0.0..=2_300.0),
            MeterModel::Range100A => (0.0..=100.0, 0.0..=23_000.0),
        };
        MeasurementLimits {
            voltage: 80.0..=260.0,
            current,
            power,
            energy: 0.0..=9_999_990.0,
            frequency: 45.0..=65.0,
            power_factor: 0.0..=1.0,
        }
    }
}

/// A measured value outside its datasheet range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeViolation {
    pub field: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl fmt::Display for RangeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} outside {}..={}",
            self.field, self.value, self.min, self.max
        )
    }
}
