//! PZEM-004T energy meter access over Modbus-RTU
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `pzem-core`: error types, function and exception codes, addresses, register map
//! - `pzem-transport`: serial link and the transport traits
//! - `pzem-session`: CRC, frame codec and the request/response session
//! - `pzem-client`: retrying Modbus client, device operations and the per-port worker
//!
//! # Usage
//!
//! ```no_run
//! use pzem::PzemBuilder;
//!
//! # async fn run() -> pzem::PzemResult<()> {
//! let mut meter = PzemBuilder::new().serial("/dev/ttyUSB0").open().await?;
//! let reading = meter.read_measurements().await?;
//! println!("{:.1} V, {:.1} W", reading.voltage, reading.power);
//!
//! meter.set_alarm_threshold(2000).await?;
//! let outcome = meter.reset_energy().await?;
//! println!("reset verified: {}", outcome.is_verified());
//! meter.close().await?;
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use pzem_core::{DeviceAddress, ExceptionCode, FrameError, FunctionCode, PzemError, PzemResult};

// Re-export the device API
pub use pzem_client::{
    ClientConfig, FormattedMeasurements, MeasurementSnapshot, MeterModel, Pzem, PzemBuilder,
    PzemHandle, ResetOutcome, TransactionEvent,
};

pub mod client {
    pub use pzem_client::*;
}

pub mod session {
    pub use pzem_session::*;
}

pub mod transport {
    pub use pzem_transport::*;
}

pub mod register {
    pub use pzem_core::register::*;
}
