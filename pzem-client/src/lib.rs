//! PZEM-004T client implementation
//!
//! This crate turns the framing layer into typed meter operations:
//!
//! - [`client::ModbusClient`]: one request/response transaction per call,
//!   with bounded retries for timeouts and damaged replies
//! - [`device::Pzem`]: measurements, alarm threshold, address, energy reset
//!   and calibration
//! - [`worker`]: a per-port task that serializes requests from many callers
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use pzem_client::PzemBuilder;
//!
//! # async fn run() -> pzem_core::PzemResult<()> {
//! let mut meter = PzemBuilder::new().serial("/dev/ttyUSB0").open().await?;
//! let snapshot = meter.read_measurements().await?;
//! println!("{}", snapshot);
//! meter.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod device;
pub mod events;
pub mod measurement;
pub mod registers;
pub mod reset;
pub mod worker;

#[cfg(test)]
mod testing;

pub use builder::PzemBuilder;
pub use client::{Command, ModbusClient, Response};
pub use config::ClientConfig;
pub use device::Pzem;
pub use events::{EventSink, TransactionEvent};
pub use measurement::{FormattedMeasurements, MeasurementSnapshot, MeterModel, RangeViolation};
pub use reset::{ResetOutcome, ResetPhase};
pub use worker::PzemHandle;
