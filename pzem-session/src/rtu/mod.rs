//! Modbus-RTU session layer module

pub mod connection;
pub mod crc;
pub mod frame;
pub mod state;
pub mod statistics;

pub use connection::{FrameExchange, ResponseLength, RtuConnection};
pub use crc::{crc16, validate, Crc16};
pub use frame::{
    decode_echo_response, decode_read_response, decode_write_response, encode_calibration,
    encode_no_body, encode_read, encode_write_single, to_hex, RegisterValues, RtuFrame,
};
pub use state::SessionState;
pub use statistics::RtuStatistics;
