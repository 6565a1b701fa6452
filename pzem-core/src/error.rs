use crate::function::{ExceptionCode, FunctionCode};
use thiserror::Error;

/// Reasons a received frame is rejected before its payload is trusted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame truncated: {len} bytes, need at least {min}")]
    Truncated { len: usize, min: usize },

    #[error("Length mismatch: header announces {announced} payload bytes, frame carries {actual}")]
    LengthMismatch { announced: usize, actual: usize },

    #[error("CRC mismatch: frame carries 0x{received:04X}, computed 0x{computed:04X}")]
    CrcMismatch { received: u16, computed: u16 },

    #[error("Unexpected function code 0x{received:02X} in reply to 0x{expected:02X}")]
    UnexpectedFunction { expected: u8, received: u8 },

    #[error("Unknown function code 0x{received:02X}")]
    UnknownFunction { received: u8 },

    #[error("Frame is {actual} bytes, expected {expected}")]
    FrameLength { expected: usize, actual: usize },

    #[error("Echo mismatch: sent {sent:02X?}, device echoed {echoed:02X?}")]
    EchoMismatch { sent: Vec<u8>, echoed: Vec<u8> },

    #[error("Register 0x{register:04X} holds out-of-range value {value}")]
    ValueOutOfRange { register: u16, value: u16 },
}

/// Main error type for PZEM operations
#[derive(Error, Debug)]
pub enum PzemError {
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: received {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },

    #[error("Corrupt frame: {0}")]
    CorruptFrame(#[from] FrameError),

    #[error("Device rejected function 0x{:02X}: {code}", .function.as_u8())]
    Protocol {
        function: FunctionCode,
        code: ExceptionCode,
    },

    #[error("Invalid argument: {0}")]
    Validation(String),

    #[error("Session is not connected")]
    NotConnected,
}

impl PzemError {
    /// Transient failures worth another attempt: no reply or a damaged reply
    pub fn is_retryable(&self) -> bool {
        matches!(self, PzemError::Timeout { .. } | PzemError::CorruptFrame(_))
    }

    /// The device stayed silent (or went silent mid-frame)
    pub fn is_no_response(&self) -> bool {
        matches!(self, PzemError::Timeout { .. })
    }

    /// Exception code reported by the device, if this is a protocol error
    pub fn exception_code(&self) -> Option<ExceptionCode> {
        match self {
            PzemError::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias for PZEM operations
pub type PzemResult<T> = Result<T, PzemError>;
