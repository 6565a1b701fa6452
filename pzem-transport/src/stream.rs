//! Stream accessor trait for transport layer

use crate::error::{PzemError, PzemResult};
use async_trait::async_trait;
use std::time::Duration;

/// Stream accessor interface to access a physical stream to a meter
#[async_trait]
pub trait StreamAccessor: Send {
    /// Read timeout applied to every read call
    fn timeout(&self) -> Duration;

    /// Set the read timeout
    ///
    /// Transports with a fixed link configuration refuse this while open.
    async fn set_timeout(&mut self, timeout: Duration) -> PzemResult<()>;

    /// Read available data from the stream
    ///
    /// # Returns
    ///
    /// Number of bytes read, or 0 if EOF. Fails with `PzemError::Timeout`
    /// when nothing arrives within the read timeout.
    async fn read(&mut self, buf: &mut [u8]) -> PzemResult<usize>;

    /// Read exact number of bytes from the stream
    ///
    /// The whole buffer must be filled within one read timeout. A short read
    /// fails with `PzemError::Timeout` carrying how many bytes did arrive.
    async fn read_exact(&mut self, buf: &mut [u8]) -> PzemResult<()> {
        let expected = buf.len();
        let deadline = tokio::time::Instant::now() + self.timeout();
        let mut received = 0;

        while received < expected {
            let n = match tokio::time::timeout_at(deadline, self.read(&mut buf[received..])).await {
                Err(_) | Ok(Err(PzemError::Timeout { .. })) => {
                    return Err(PzemError::Timeout { expected, received });
                }
                Ok(result) => result?,
            };
            if n == 0 {
                return Err(PzemError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Failed to read exact number of bytes",
                )));
            }
            received += n;
        }
        Ok(())
    }

    /// Write data to the stream
    ///
    /// # Returns
    ///
    /// Number of bytes written
    async fn write(&mut self, buf: &[u8]) -> PzemResult<usize>;

    /// Write all data to the stream
    async fn write_all(&mut self, buf: &[u8]) -> PzemResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(PzemError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "Failed to write all data",
                )));
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any buffered outgoing data
    async fn flush(&mut self) -> PzemResult<()>;

    /// Drop every byte already waiting in the input buffer
    ///
    /// # Returns
    ///
    /// Number of stale bytes discarded, when the transport can tell
    async fn discard_input(&mut self) -> PzemResult<usize>;

    /// Check if the stream is closed
    fn is_closed(&self) -> bool;

    /// Close the stream
    async fn close(&mut self) -> PzemResult<()>;
}

/// Transport layer trait that extends StreamAccessor
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the physical layer connection
    async fn open(&mut self) -> PzemResult<()>;
}

pub(crate) fn not_connected(what: &str) -> PzemError {
    PzemError::Io(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        format!("{} not connected", what),
    ))
}
