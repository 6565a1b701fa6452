//! Core types and utilities for the PZEM-004T Modbus-RTU protocol
//!
//! This crate provides the error taxonomy, function codes, slave addressing
//! and the register map shared by every layer of the stack.

pub mod address;
pub mod error;
pub mod function;
pub mod register;

pub use address::DeviceAddress;
pub use error::{FrameError, PzemError, PzemResult};
pub use function::{ExceptionCode, FunctionCode};
