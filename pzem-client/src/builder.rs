//! Builder for a ready-to-use [`Pzem`]
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use pzem_client::PzemBuilder;
//! use std::time::Duration;
//!
//! # async fn run() -> pzem_core::PzemResult<()> {
//! let mut meter = PzemBuilder::new()
//!     .serial("/dev/ttyUSB0")
//!     .address(0x01)
//!     .timeout(Duration::from_millis(500))
//!     .open()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::client::ModbusClient;
use crate::config::ClientConfig;
use crate::device::Pzem;
use crate::events::{EventSink, TransactionEvent};
use pzem_core::{DeviceAddress, PzemResult};
use pzem_session::RtuConnection;
use pzem_transport::{SerialSettings, SerialTransport, TransportLayer};
use std::time::Duration;
use tokio::sync::mpsc;

/// Builder for [`Pzem`] instances
///
/// # Default Settings
/// - Port: `/dev/ttyUSB0`, 9600 baud, 8N1, 1 s read timeout
/// - Address: 0xF8, accepted by any single meter on the bus
/// - Retries: 3 attempts, 100 ms apart
#[derive(Debug, Clone, Default)]
pub struct PzemBuilder {
    settings: SerialSettings,
    address: DeviceAddress,
    config: ClientConfig,
    events: EventSink,
}

impl PzemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serial port device name, e.g. `/dev/ttyUSB0` or `COM3`
    pub fn serial(mut self, port_name: impl Into<String>) -> Self {
        self.settings.port_name = port_name.into();
        self
    }

    /// Replace all link parameters
    pub fn settings(mut self, settings: SerialSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Slave address of the meter
    ///
    /// Not validated here: 0xF8 and any other byte are accepted for talking
    /// to an existing device. Only `Pzem::set_address` enforces 1..=247.
    pub fn address(mut self, address: u8) -> Self {
        self.address = DeviceAddress::new(address);
        self
    }

    /// Read timeout per reply
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Report transaction events on `sender`
    pub fn events(mut self, sender: mpsc::UnboundedSender<TransactionEvent>) -> Self {
        self.events = EventSink::new(sender);
        self
    }

    /// Open the configured serial port
    pub async fn open(self) -> PzemResult<Pzem<RtuConnection<SerialTransport>>> {
        self.settings.validate()?;
        let transport = SerialTransport::new(self.settings.clone());
        self.build_with(transport).await
    }

    /// Open a meter session over any transport
    pub async fn build_with<T: TransportLayer>(
        self,
        transport: T,
    ) -> PzemResult<Pzem<RtuConnection<T>>> {
        self.config.validate()?;
        let mut connection = RtuConnection::new(transport);
        connection.open().await?;
        log::info!("PZEM session opened for {}", self.address);

        let client =
            ModbusClient::new(connection, self.address, self.config).with_event_sink(self.events);
        Ok(Pzem::new(client))
    }
}
