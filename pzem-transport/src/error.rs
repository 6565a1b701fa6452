//! Error types used by the transport layer

pub use pzem_core::error::{FrameError, PzemError, PzemResult};
