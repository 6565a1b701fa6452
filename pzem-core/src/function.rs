//! Modbus function codes and exception codes understood by the PZEM-004T

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bit set in the function byte of an exception reply
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Function codes supported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionCode {
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleRegister,
    Calibration,
    ResetEnergy,
}

impl FunctionCode {
    pub fn as_u8(&self) -> u8 {
        match self {
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::ReadInputRegisters => 0x04,
            FunctionCode::WriteSingleRegister => 0x06,
            FunctionCode::Calibration => 0x41,
            FunctionCode::ResetEnergy => 0x42,
        }
    }

    /// Parse a function byte, ignoring the exception flag
    pub fn from_u8(value: u8) -> Option<Self> {
        match value & !EXCEPTION_FLAG {
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x04 => Some(FunctionCode::ReadInputRegisters),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            0x41 => Some(FunctionCode::Calibration),
            0x42 => Some(FunctionCode::ResetEnergy),
            _ => None,
        }
    }

    /// Function byte the device uses when rejecting this request
    pub fn exception_byte(&self) -> u8 {
        self.as_u8() | EXCEPTION_FLAG
    }

    /// Whether replies carry a byte count followed by register words
    pub fn is_register_read(&self) -> bool {
        matches!(
            self,
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters
        )
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionCode::ReadHoldingRegisters => "read holding registers",
            FunctionCode::ReadInputRegisters => "read input registers",
            FunctionCode::WriteSingleRegister => "write single register",
            FunctionCode::Calibration => "calibration",
            FunctionCode::ResetEnergy => "reset energy",
        };
        write!(f, "{} (0x{:02X})", name, self.as_u8())
    }
}

/// Exception codes carried by error replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Unknown(u8),
}

impl ExceptionCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::SlaveDeviceFailure,
            other => ExceptionCode::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::SlaveDeviceFailure => 0x04,
            ExceptionCode::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionCode::IllegalFunction => write!(f, "Illegal function"),
            ExceptionCode::IllegalAddress => write!(f, "Illegal data address"),
            ExceptionCode::IllegalDataValue => write!(f, "Illegal data value"),
            ExceptionCode::SlaveDeviceFailure => write!(f, "Slave device failure"),
            ExceptionCode::Unknown(code) => write!(f, "Unknown error 0x{:02X}", code),
        }
    }
}
