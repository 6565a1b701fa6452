//! Error types used by the session layer

pub use pzem_core::error::{FrameError, PzemError, PzemResult};
