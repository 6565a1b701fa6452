//! Modbus-RTU frame structure and encoding/decoding
//!
//! Frame layout: `address (1) | function (1) | body (n) | crc (2, little-endian)`.
//! Register and value fields inside the body are big-endian.

use crate::error::{FrameError, PzemError, PzemResult};
use crate::rtu::crc::{crc16, split_crc};
use bytes::{BufMut, Bytes, BytesMut};
use pzem_core::register::{CALIBRATION_PASSWORD, MAX_READ_COUNT, MIN_READ_COUNT};
use pzem_core::{DeviceAddress, ExceptionCode, FunctionCode};
use std::fmt;

/// Address and function bytes
const HEADER_LEN: usize = 2;
const CRC_LEN: usize = 2;
/// Address, function, byte count
const READ_HEADER_LEN: usize = 3;
/// Address, function|0x80, exception code, crc
const EXCEPTION_FRAME_LEN: usize = 5;

/// Register words carried by a read reply, in wire order
pub type RegisterValues = Vec<u16>;

/// Request or reply frame without its CRC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtuFrame {
    address: DeviceAddress,
    function: FunctionCode,
    body: Bytes,
}

impl RtuFrame {
    pub fn new(address: DeviceAddress, function: FunctionCode, body: impl Into<Bytes>) -> Self {
        Self {
            address,
            function,
            body: body.into(),
        }
    }

    /// Parse a complete frame, checking its CRC
    pub fn decode(frame: &[u8]) -> PzemResult<Self> {
        if frame.len() < HEADER_LEN + CRC_LEN {
            return Err(FrameError::Truncated {
                len: frame.len(),
                min: HEADER_LEN + CRC_LEN,
            }
            .into());
        }
        check_crc(frame)?;

        let function = FunctionCode::from_u8(frame[1])
            .ok_or(FrameError::UnknownFunction { received: frame[1] })?;

        Ok(Self {
            address: DeviceAddress::new(frame[0]),
            function,
            body: Bytes::copy_from_slice(&frame[HEADER_LEN..frame.len() - CRC_LEN]),
        })
    }

    /// Encode frame to bytes, CRC appended
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.address.value());
        buf.put_u8(self.function.as_u8());
        buf.put_slice(&self.body);
        let crc = crc16(&buf);
        buf.put_u16_le(crc);
        buf.freeze()
    }

    /// Length of the encoded frame including CRC
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.body.len() + CRC_LEN
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn function(&self) -> FunctionCode {
        self.function
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// First body word: the register of read and write requests
    pub fn register(&self) -> Option<u16> {
        self.word(0)
    }

    /// Second body word: register count of reads, value of writes
    pub fn value(&self) -> Option<u16> {
        self.word(1)
    }

    fn word(&self, index: usize) -> Option<u16> {
        let at = index * 2;
        self.body
            .get(at..at + 2)
            .map(|w| u16::from_be_bytes([w[0], w[1]]))
    }
}

impl fmt::Display for RtuFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTU Frame: addr={}, function={}, body=[{}]",
            self.address,
            self.function,
            to_hex(&self.body)
        )
    }
}

/// Build a read request (holding or input registers)
///
/// `count` must be within 1..=125.
pub fn encode_read(
    address: DeviceAddress,
    function: FunctionCode,
    start_register: u16,
    count: u16,
) -> PzemResult<RtuFrame> {
    if !function.is_register_read() {
        return Err(PzemError::Validation(format!(
            "{} is not a register read",
            function
        )));
    }
    if !(MIN_READ_COUNT..=MAX_READ_COUNT).contains(&count) {
        return Err(PzemError::Validation(format!(
            "Register count must be between {} and {}, got {}",
            MIN_READ_COUNT, MAX_READ_COUNT, count
        )));
    }

    let mut body = BytesMut::with_capacity(4);
    body.put_u16(start_register);
    body.put_u16(count);
    Ok(RtuFrame::new(address, function, body.freeze()))
}

/// Build a write-single-register request
pub fn encode_write_single(address: DeviceAddress, register: u16, value: u16) -> RtuFrame {
    let mut body = BytesMut::with_capacity(4);
    body.put_u16(register);
    body.put_u16(value);
    RtuFrame::new(address, FunctionCode::WriteSingleRegister, body.freeze())
}

/// Build a request that is only address, function and CRC (reset energy)
pub fn encode_no_body(address: DeviceAddress, function: FunctionCode) -> RtuFrame {
    RtuFrame::new(address, function, Bytes::new())
}

/// Build the factory calibration request, always sent to the calibration address
pub fn encode_calibration() -> RtuFrame {
    RtuFrame::new(
        DeviceAddress::CALIBRATION,
        FunctionCode::Calibration,
        Bytes::copy_from_slice(&CALIBRATION_PASSWORD.to_be_bytes()),
    )
}

/// Validate a read reply and extract its register words
///
/// # Error Handling
/// - shorter than the 3 byte header: `FrameError::Truncated`
/// - byte count disagreeing with the received payload: `FrameError::LengthMismatch`
/// - bad CRC: `FrameError::CrcMismatch`
/// - exception reply: `PzemError::Protocol`
pub fn decode_read_response(frame: &[u8], function: FunctionCode) -> PzemResult<RegisterValues> {
    if frame.len() < READ_HEADER_LEN {
        return Err(FrameError::Truncated {
            len: frame.len(),
            min: READ_HEADER_LEN,
        }
        .into());
    }
    check_exception(frame, function)?;

    let announced = frame[2] as usize;
    let actual = frame.len().saturating_sub(READ_HEADER_LEN + CRC_LEN);
    if announced != actual {
        return Err(FrameError::LengthMismatch { announced, actual }.into());
    }
    check_crc(frame)?;
    check_function(frame, function)?;
    if announced % 2 != 0 {
        return Err(FrameError::LengthMismatch {
            announced,
            actual: announced - 1,
        }
        .into());
    }

    Ok(frame[READ_HEADER_LEN..READ_HEADER_LEN + announced]
        .chunks_exact(2)
        .map(|w| u16::from_be_bytes([w[0], w[1]]))
        .collect())
}

/// Validate a reply that must echo the request body (write, reset, calibration)
pub fn decode_echo_response(frame: &[u8], request: &RtuFrame) -> PzemResult<()> {
    let function = request.function();
    if frame.len() < READ_HEADER_LEN {
        return Err(FrameError::Truncated {
            len: frame.len(),
            min: READ_HEADER_LEN,
        }
        .into());
    }
    check_exception(frame, function)?;

    if frame.len() != request.encoded_len() {
        return Err(FrameError::FrameLength {
            expected: request.encoded_len(),
            actual: frame.len(),
        }
        .into());
    }
    check_crc(frame)?;
    check_function(frame, function)?;

    let echoed = &frame[HEADER_LEN..frame.len() - CRC_LEN];
    if echoed != request.body() {
        return Err(FrameError::EchoMismatch {
            sent: request.body().to_vec(),
            echoed: echoed.to_vec(),
        }
        .into());
    }
    Ok(())
}

/// Same contract as [`decode_echo_response`], named for write replies
pub fn decode_write_response(frame: &[u8], request: &RtuFrame) -> PzemResult<()> {
    decode_echo_response(frame, request)
}

/// Uppercase hex dump for logs, bytes separated by spaces
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn check_crc(frame: &[u8]) -> PzemResult<()> {
    match split_crc(frame) {
        Some((body, received)) => {
            let computed = crc16(body);
            if computed == received {
                Ok(())
            } else {
                Err(FrameError::CrcMismatch { received, computed }.into())
            }
        }
        None => Err(FrameError::Truncated {
            len: frame.len(),
            min: CRC_LEN,
        }
        .into()),
    }
}

fn check_function(frame: &[u8], function: FunctionCode) -> PzemResult<()> {
    if frame[1] != function.as_u8() {
        return Err(FrameError::UnexpectedFunction {
            expected: function.as_u8(),
            received: frame[1],
        }
        .into());
    }
    Ok(())
}

/// Exception replies are only trusted once their CRC checks out
fn check_exception(frame: &[u8], function: FunctionCode) -> PzemResult<()> {
    if frame[1] != function.exception_byte() {
        return Ok(());
    }
    if frame.len() != EXCEPTION_FRAME_LEN {
        return Err(FrameError::FrameLength {
            expected: EXCEPTION_FRAME_LEN,
            actual: frame.len(),
        }
        .into());
    }
    check_crc(frame)?;
    Err(PzemError::Protocol {
        function,
        code: ExceptionCode::from_u8(frame[2]),
    })
}
