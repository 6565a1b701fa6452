//! Session layer module for the PZEM-004T protocol
//!
//! This crate provides Modbus-RTU framing on top of the transport layer:
//! CRC computation, request encoding, reply validation and the
//! request/response exchange over one serial session.

pub mod error;
pub mod rtu;

pub use error::{PzemError, PzemResult};
pub use rtu::*;
