//! Transport layer module for the PZEM-004T protocol
//!
//! This crate owns the byte pipe to the meter: the serial link used in the
//! field, and a generic stream transport for anything else that speaks
//! `AsyncRead + AsyncWrite`.

pub mod error;
pub mod io_stream;
pub mod serial;
pub mod stream;

pub use error::{PzemError, PzemResult};
pub use io_stream::StreamTransport;
pub use serial::{Parity, SerialSettings, SerialTransport};
pub use stream::{StreamAccessor, TransportLayer};
