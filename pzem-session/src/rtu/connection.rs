//! Modbus-RTU session over one transport
//!
//! One request/response exchange at a time: stale input is discarded, the
//! request is written in one piece, and the reply is read back according
//! to the request's [`ResponseLength`].

use crate::error::{PzemError, PzemResult};
use crate::rtu::frame::{to_hex, RtuFrame};
use crate::rtu::state::SessionState;
use async_trait::async_trait;
use pzem_core::function::EXCEPTION_FLAG;
use pzem_transport::TransportLayer;

/// Address, function, byte count (or exception code, or first body byte)
const REPLY_HEADER_LEN: usize = 3;
/// Remaining bytes of an exception reply after its header
const EXCEPTION_TAIL_LEN: usize = 2;

/// How much of a reply to read after its 3 byte header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLength {
    /// Third byte announces the payload length; payload and CRC follow
    ByteCount,
    /// Reply has a known total length including CRC
    Fixed(usize),
}

impl ResponseLength {
    /// Reply length the device uses for `request`
    ///
    /// Register reads announce their byte count; every other function
    /// echoes the request.
    pub fn for_request(request: &RtuFrame) -> Self {
        if request.function().is_register_read() {
            ResponseLength::ByteCount
        } else {
            ResponseLength::Fixed(request.encoded_len())
        }
    }

    /// Bytes still to read once the header is in
    fn remaining(&self, header: &[u8; REPLY_HEADER_LEN]) -> usize {
        if header[1] & EXCEPTION_FLAG != 0 {
            return EXCEPTION_TAIL_LEN;
        }
        match self {
            ResponseLength::ByteCount => header[2] as usize + 2,
            ResponseLength::Fixed(total) => total.saturating_sub(REPLY_HEADER_LEN),
        }
    }
}

/// One request/response round trip on an exclusive link
///
/// This is the seam between the Modbus client and the wire; tests replace
/// it with scripted doubles.
#[async_trait]
pub trait FrameExchange: Send {
    /// Write `request` and return the raw reply bytes, unvalidated
    ///
    /// # Error Handling
    /// - No complete reply within the read timeout: `PzemError::Timeout`
    /// - OS-level failure: `PzemError::Io`
    /// - Session not open: `PzemError::NotConnected`
    async fn exchange(&mut self, request: &RtuFrame, expect: ResponseLength) -> PzemResult<Vec<u8>>;

    /// Drop any bytes waiting in the input buffer
    async fn discard_input(&mut self) -> PzemResult<()>;

    /// Whether exchanges can currently run
    fn is_open(&self) -> bool;

    /// Release the link; later exchanges fail with `NotConnected`
    async fn close(&mut self) -> PzemResult<()>;
}

/// Modbus-RTU session owning exactly one transport
pub struct RtuConnection<T: TransportLayer> {
    transport: T,
    state: SessionState,
}

impl<T: TransportLayer> RtuConnection<T> {
    /// Create a session over `transport`; call [`open`](Self::open) before exchanging
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: SessionState::Closed,
        }
    }

    /// Open the transport if needed and mark the session ready
    pub async fn open(&mut self) -> PzemResult<()> {
        if self.state == SessionState::Faulted {
            self.close().await?;
        }
        self.state.validate_transition(SessionState::Open)?;
        if self.transport.is_closed() {
            self.transport.open().await?;
        }
        self.state = SessionState::Open;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn ensure_open(&self) -> PzemResult<()> {
        if self.state.can_exchange() && !self.transport.is_closed() {
            Ok(())
        } else {
            Err(PzemError::NotConnected)
        }
    }

    /// An I/O failure leaves the handle in an unknown state
    fn track<R>(&mut self, result: PzemResult<R>) -> PzemResult<R> {
        if let Err(PzemError::Io(e)) = &result {
            log::error!("Serial session faulted: {}", e);
            self.state = SessionState::Faulted;
        }
        result
    }

    async fn transmit(&mut self, request: &RtuFrame) -> PzemResult<()> {
        let stale = self.transport.discard_input().await?;
        if stale > 0 {
            log::debug!("Discarded {} stale bytes before request", stale);
        }

        let encoded = request.encode();
        log::debug!("TX {}", to_hex(&encoded));
        self.transport.write_all(&encoded).await?;
        self.transport.flush().await
    }

    async fn receive(&mut self, expect: ResponseLength) -> PzemResult<Vec<u8>> {
        let mut header = [0u8; REPLY_HEADER_LEN];
        self.transport.read_exact(&mut header).await?;

        let remaining = expect.remaining(&header);
        let mut reply = Vec::with_capacity(REPLY_HEADER_LEN + remaining);
        reply.extend_from_slice(&header);
        reply.resize(REPLY_HEADER_LEN + remaining, 0);

        match self.transport.read_exact(&mut reply[REPLY_HEADER_LEN..]).await {
            Ok(()) => {}
            Err(PzemError::Timeout { received, .. }) => {
                log::debug!("RX partial {}", to_hex(&reply[..REPLY_HEADER_LEN + received]));
                return Err(PzemError::Timeout {
                    expected: REPLY_HEADER_LEN + remaining,
                    received: REPLY_HEADER_LEN + received,
                });
            }
            Err(e) => return Err(e),
        }

        log::debug!("RX {}", to_hex(&reply));
        Ok(reply)
    }
}

#[async_trait]
impl<T: TransportLayer> FrameExchange for RtuConnection<T> {
    async fn exchange(&mut self, request: &RtuFrame, expect: ResponseLength) -> PzemResult<Vec<u8>> {
        self.ensure_open()?;

        let sent = self.transmit(request).await;
        self.track(sent)?;

        let reply = self.receive(expect).await;
        self.track(reply)
    }

    async fn discard_input(&mut self) -> PzemResult<()> {
        self.ensure_open()?;
        let result = self.transport.discard_input().await.map(|_| ());
        self.track(result)
    }

    fn is_open(&self) -> bool {
        self.ensure_open().is_ok()
    }

    async fn close(&mut self) -> PzemResult<()> {
        self.transport.close().await?;
        self.state.validate_transition(SessionState::Closed)?;
        self.state = SessionState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtu::crc::crc16;
    use crate::rtu::frame::{encode_no_body, encode_read, encode_write_single};
    use pzem_core::{DeviceAddress, FunctionCode};
    use pzem_transport::StreamTransport;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc16(body).to_le_bytes());
        frame
    }

    async fn open<S>(stream: S) -> RtuConnection<StreamTransport<S>>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
    {
        let transport = StreamTransport::with_timeout(stream, Duration::from_millis(50));
        let mut conn = RtuConnection::new(transport);
        conn.open().await.unwrap();
        conn
    }

    #[tokio::test]
    async fn test_exchange_read_reply() {
        let reply = with_crc(&[0xF8, 0x03, 0x02, 0x03, 0xE8]);
        let mock = tokio_test::io::Builder::new()
            .write(&[0xF8, 0x03, 0x00, 0x01, 0x00, 0x01, 0xC1, 0xA3])
            .read(&reply[..3])
            .read(&reply[3..])
            .build();
        let mut conn = open(mock).await;

        let request = encode_read(DeviceAddress::DEFAULT, FunctionCode::ReadHoldingRegisters, 0x0001, 1).unwrap();
        let bytes = conn.exchange(&request, ResponseLength::for_request(&request)).await.unwrap();
        assert_eq!(bytes, reply);
    }

    #[tokio::test]
    async fn test_exception_reply_to_fixed_request() {
        let request = encode_write_single(DeviceAddress::DEFAULT, 0x0001, 0);
        let reply = with_crc(&[0xF8, 0x86, 0x03]);
        let mock = tokio_test::io::Builder::new()
            .write(&request.encode())
            .read(&reply[..3])
            .read(&reply[3..])
            .build();
        let mut conn = open(mock).await;

        let bytes = conn.exchange(&request, ResponseLength::Fixed(8)).await.unwrap();
        assert_eq!(bytes.len(), 5);
        assert_eq!(bytes, reply);
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let (client, _device) = tokio::io::duplex(64);
        let mut conn = open(client).await;

        let request = encode_no_body(DeviceAddress::DEFAULT, FunctionCode::ResetEnergy);
        let err = conn.exchange(&request, ResponseLength::Fixed(4)).await.unwrap_err();
        assert!(matches!(err, PzemError::Timeout { expected: 3, received: 0 }));
        assert_eq!(conn.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn test_partial_reply_times_out() {
        let (client, mut device) = tokio::io::duplex(64);
        let mut conn = open(client).await;

        let request = encode_read(DeviceAddress::DEFAULT, FunctionCode::ReadInputRegisters, 0, 10).unwrap();
        let responder = tokio::spawn(async move {
            let mut req = [0u8; 8];
            device.read_exact(&mut req).await.unwrap();
            // Header announces 20 bytes; only 5 follow
            device.write_all(&[0xF8, 0x04, 0x14, 0, 0, 0, 0, 0]).await.unwrap();
            device
        });

        let err = conn.exchange(&request, ResponseLength::ByteCount).await.unwrap_err();
        assert!(matches!(err, PzemError::Timeout { expected: 25, received: 8 }));
        drop(responder.await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_bytes_are_discarded() {
        let (client, mut device) = tokio::io::duplex(64);
        let mut conn = open(client).await;
        device.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).await.unwrap();

        let request = encode_no_body(DeviceAddress::DEFAULT, FunctionCode::ResetEnergy);
        let responder = tokio::spawn(async move {
            let mut req = [0u8; 4];
            device.read_exact(&mut req).await.unwrap();
            device.write_all(&req).await.unwrap();
            device
        });

        let bytes = conn.exchange(&request, ResponseLength::Fixed(4)).await.unwrap();
        assert_eq!(bytes, vec![0xF8, 0x42, 0xC2, 0x41]);
        drop(responder.await.unwrap());
    }

    #[tokio::test]
    async fn test_io_error_faults_session() {
        let request = encode_no_body(DeviceAddress::DEFAULT, FunctionCode::ResetEnergy);
        let mock = tokio_test::io::Builder::new()
            .write(&request.encode())
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
            .build();
        let mut conn = open(mock).await;

        let err = conn.exchange(&request, ResponseLength::Fixed(4)).await.unwrap_err();
        assert!(matches!(err, PzemError::Io(_)));
        assert_eq!(conn.state(), SessionState::Faulted);
        assert!(!conn.is_open());

        let err = conn.exchange(&request, ResponseLength::Fixed(4)).await.unwrap_err();
        assert!(matches!(err, PzemError::NotConnected));
    }

    #[tokio::test]
    async fn test_closed_session_refuses_exchange() {
        let mock = tokio_test::io::Builder::new().build();
        let mut conn = open(mock).await;
        conn.close().await.unwrap();
        assert_eq!(conn.state(), SessionState::Closed);

        let request = encode_no_body(DeviceAddress::DEFAULT, FunctionCode::ResetEnergy);
        let err = conn.exchange(&request, ResponseLength::Fixed(4)).await.unwrap_err();
        assert!(matches!(err, PzemError::NotConnected));
        // Closing twice is harmless
        assert!(conn.close().await.is_ok());
    }

    #[test]
    fn test_response_length_for_request() {
        let read = encode_read(DeviceAddress::DEFAULT, FunctionCode::ReadInputRegisters, 0, 10).unwrap();
        assert_eq!(ResponseLength::for_request(&read), ResponseLength::ByteCount);

        let write = encode_write_single(DeviceAddress::DEFAULT, 1, 1);
        assert_eq!(ResponseLength::for_request(&write), ResponseLength::Fixed(8));

        let reset = encode_no_body(DeviceAddress::DEFAULT, FunctionCode::ResetEnergy);
        assert_eq!(ResponseLength::for_request(&reset), ResponseLength::Fixed(4));
    }

    #[test]
    fn test_remaining_after_header() {
        assert_eq!(ResponseLength::ByteCount.remaining(&[0xF8, 0x04, 0x14]), 22);
        assert_eq!(ResponseLength::Fixed(8).remaining(&[0xF8, 0x06, 0x00]), 5);
        assert_eq!(ResponseLength::Fixed(8).remaining(&[0xF8, 0x86, 0x02]), 2);
    }
}
