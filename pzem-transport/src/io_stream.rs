//! Transport over any async byte stream
//!
//! Used for serial-over-network bridges, pseudo terminals and test doubles.

use crate::error::{PzemError, PzemResult};
use crate::stream::{not_connected, StreamAccessor, TransportLayer};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const DRAIN_CHUNK: usize = 64;

/// Transport layer over an already connected `AsyncRead + AsyncWrite` stream
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: Option<S>,
    timeout: Duration,
    closed: bool,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream with a one second read timeout
    pub fn new(stream: S) -> Self {
        Self::with_timeout(stream, Duration::from_secs(1))
    }

    pub fn with_timeout(stream: S, timeout: Duration) -> Self {
        Self {
            stream: Some(stream),
            timeout,
            closed: false,
        }
    }

    /// Give the underlying stream back, closing the transport
    pub fn into_inner(mut self) -> Option<S> {
        self.closed = true;
        self.stream.take()
    }

    fn stream_mut(&mut self) -> PzemResult<&mut S> {
        if self.closed {
            return Err(not_connected("Stream"));
        }
        self.stream.as_mut().ok_or_else(|| not_connected("Stream"))
    }
}

#[async_trait]
impl<S> TransportLayer for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn open(&mut self) -> PzemResult<()> {
        if self.stream.is_none() {
            return Err(not_connected("Stream"));
        }
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl<S> StreamAccessor for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn set_timeout(&mut self, timeout: Duration) -> PzemResult<()> {
        if timeout.is_zero() {
            return Err(PzemError::Validation("Read timeout must be positive".to_string()));
        }
        self.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> PzemResult<usize> {
        let timeout = self.timeout;
        let expected = buf.len();
        let stream = self.stream_mut()?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => {
                self.closed = true;
                Err(PzemError::Io(e))
            }
            Err(_) => Err(PzemError::Timeout { expected, received: 0 }),
        }
    }

    async fn write(&mut self, buf: &[u8]) -> PzemResult<usize> {
        let stream = self.stream_mut()?;
        stream.write(buf).await.map_err(PzemError::Io)
    }

    async fn flush(&mut self) -> PzemResult<()> {
        let stream = self.stream_mut()?;
        stream.flush().await.map_err(PzemError::Io)
    }

    async fn discard_input(&mut self) -> PzemResult<usize> {
        let stream = self.stream_mut()?;
        let mut chunk = [0u8; DRAIN_CHUNK];
        let mut discarded = 0;

        // Only what is already buffered: a zero timeout stops at the first pending read.
        loop {
            match tokio::time::timeout(Duration::ZERO, stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => return Err(PzemError::Io(e)),
            }
        }
        Ok(discarded)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> PzemResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_exact() {
        let mock = tokio_test::io::Builder::new()
            .write(&[0xF8, 0x42, 0xC2, 0x41])
            .read(&[0xF8, 0x42])
            .read(&[0xC2, 0x41])
            .build();
        let mut transport = StreamTransport::with_timeout(mock, Duration::from_millis(50));

        transport.write_all(&[0xF8, 0x42, 0xC2, 0x41]).await.unwrap();
        let mut reply = [0u8; 4];
        transport.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0xF8, 0x42, 0xC2, 0x41]);
    }

    #[tokio::test]
    async fn test_discard_stale_input() {
        let mock = tokio_test::io::Builder::new()
            .read(&[0xAA, 0xBB, 0xCC])
            .write(&[0x01])
            .build();
        let mut transport = StreamTransport::new(mock);

        assert_eq!(transport.discard_input().await.unwrap(), 3);
        transport.write_all(&[0x01]).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_rejects_io() {
        let mock = tokio_test::io::Builder::new().build();
        let mut transport = StreamTransport::new(mock);
        transport.close().await.unwrap();
        assert!(transport.is_closed());

        let mut buf = [0u8; 1];
        assert!(matches!(transport.read(&mut buf).await, Err(PzemError::Io(_))));
        assert!(transport.open().await.is_err());
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let mock = tokio_test::io::Builder::new().build();
        let mut transport = StreamTransport::new(mock);
        assert!(transport.set_timeout(Duration::ZERO).await.is_err());
        assert_eq!(transport.timeout(), Duration::from_secs(1));
    }
}
