//! Serial port transport implementation

use crate::error::{PzemError, PzemResult};
use crate::stream::{not_connected, StreamAccessor, TransportLayer};
use async_trait::async_trait;
use pzem_core::register::BAUD_RATE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialStream};

/// Wrapper for SerialStream that implements Debug
struct DebugSerialStream(SerialStream);

impl fmt::Debug for DebugSerialStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialStream").finish()
    }
}

impl Deref for DebugSerialStream {
    type Target = SerialStream;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DebugSerialStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Parity checking mode of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Serial port transport layer settings
///
/// Defaults match the PZEM-004T: 9600 baud, 8 data bits, no parity,
/// 1 stop bit, 1 second read timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub timeout: Duration,
}

impl SerialSettings {
    /// Create new serial settings with default parameters
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// Create serial settings with timeout
    pub fn with_timeout(port_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            timeout,
            ..Self::default()
        }
    }

    fn data_bits(&self) -> PzemResult<tokio_serial::DataBits> {
        match self.data_bits {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            other => Err(PzemError::Validation(format!(
                "Unsupported data bits: {}",
                other
            ))),
        }
    }

    fn stop_bits(&self) -> PzemResult<tokio_serial::StopBits> {
        match self.stop_bits {
            1 => Ok(tokio_serial::StopBits::One),
            2 => Ok(tokio_serial::StopBits::Two),
            other => Err(PzemError::Validation(format!(
                "Unsupported stop bits: {}",
                other
            ))),
        }
    }

    /// Check the settings before touching the port
    pub fn validate(&self) -> PzemResult<()> {
        if self.port_name.is_empty() {
            return Err(PzemError::Validation("Serial port name is empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(PzemError::Validation("Baud rate must be positive".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(PzemError::Validation("Read timeout must be positive".to_string()));
        }
        self.data_bits()?;
        self.stop_bits()?;
        Ok(())
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port_name: String::from("/dev/ttyUSB0"),
            baud_rate: BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            timeout: Duration::from_secs(1),
        }
    }
}

/// Serial port transport layer implementation
#[derive(Debug)]
pub struct SerialTransport {
    stream: Option<DebugSerialStream>,
    settings: SerialSettings,
    closed: bool,
}

impl SerialTransport {
    /// Create a new serial transport layer
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    /// Create serial transport with the device's default link parameters
    pub fn new_simple(port_name: impl Into<String>) -> Self {
        Self::new(SerialSettings::new(port_name))
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn stream_mut(&mut self) -> PzemResult<&mut DebugSerialStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| not_connected("Serial stream"))
    }
}

#[async_trait]
impl TransportLayer for SerialTransport {
    async fn open(&mut self) -> PzemResult<()> {
        if !self.closed {
            return Err(PzemError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }
        self.settings.validate()?;

        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits()?)
            .stop_bits(self.settings.stop_bits()?)
            .parity(self.settings.parity.into())
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(self.settings.timeout);

        let stream = SerialStream::open(&builder).map_err(|e| {
            PzemError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open serial port {}: {}", self.settings.port_name, e),
            ))
        })?;

        log::info!(
            "Opened {} at {} baud",
            self.settings.port_name,
            self.settings.baud_rate
        );
        self.stream = Some(DebugSerialStream(stream));
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for SerialTransport {
    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    async fn set_timeout(&mut self, timeout: Duration) -> PzemResult<()> {
        if !self.closed {
            return Err(PzemError::Validation(
                "Link settings are fixed while the port is open".to_string(),
            ));
        }
        self.settings.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> PzemResult<usize> {
        let timeout = self.settings.timeout;
        let expected = buf.len();
        let stream = self.stream_mut()?;

        let result = match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(result) => result.map_err(PzemError::Io),
            Err(_) => return Err(PzemError::Timeout { expected, received: 0 }),
        };

        match result {
            Ok(0) => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> PzemResult<usize> {
        let timeout = self.settings.timeout;
        let expected = buf.len();
        let stream = self.stream_mut()?;

        tokio::time::timeout(timeout, stream.write(buf))
            .await
            .map_err(|_| PzemError::Timeout { expected, received: 0 })?
            .map_err(PzemError::Io)
    }

    async fn flush(&mut self) -> PzemResult<()> {
        let stream = self.stream_mut()?;
        stream.flush().await.map_err(PzemError::Io)
    }

    async fn discard_input(&mut self) -> PzemResult<usize> {
        let stream = self.stream_mut()?;
        let pending = stream
            .bytes_to_read()
            .map_err(|e| PzemError::Io(e.into()))?;
        stream
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| PzemError::Io(e.into()))?;
        Ok(pending as usize)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> PzemResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.flush().await;
            log::info!("Closed {}", self.settings.port_name);
        }
        self.closed = true;
        Ok(())
    }
}
