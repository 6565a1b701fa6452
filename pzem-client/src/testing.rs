//! Test doubles: a mocked frame link and a simulated meter transport

use async_trait::async_trait;
use mockall::mock;
use pzem_core::register::*;
use pzem_core::{ExceptionCode, FunctionCode, PzemError, PzemResult};
use pzem_session::{crc16, FrameExchange, ResponseLength, RtuFrame};
use pzem_transport::{StreamAccessor, TransportLayer};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

mock! {
    pub Link {}

    #[async_trait]
    impl FrameExchange for Link {
        async fn exchange(&mut self, request: &RtuFrame, expect: ResponseLength) -> PzemResult<Vec<u8>>;
        async fn discard_input(&mut self) -> PzemResult<()>;
        fn is_open(&self) -> bool;
        async fn close(&mut self) -> PzemResult<()>;
    }
}

/// Append the Modbus CRC to `body`
pub fn frame_with_crc(body: &[u8]) -> Vec<u8> {
    let mut frame = body.to_vec();
    frame.extend_from_slice(&crc16(body).to_le_bytes());
    frame
}

/// Device-side state of a [`SimulatedMeter`]
#[derive(Debug)]
pub struct MeterState {
    pub address: u8,
    pub input: [u16; 10],
    pub alarm_threshold: u16,
    /// Every request frame received, in order
    pub requests: Vec<Vec<u8>>,
    /// Ignore this many upcoming requests entirely
    pub silent: usize,
    /// Corrupt the CRC of this many upcoming replies
    pub corrupt: usize,
    /// Clear energy on reset but send no reply
    pub reset_without_reply: bool,
    /// Clear energy on reset and send a reply with a broken CRC
    pub corrupt_reset: bool,
    /// Reply to reset but keep the energy counter
    pub ignore_reset: bool,
    /// Answer this function with an exception
    pub reject: Option<(FunctionCode, ExceptionCode)>,
    pub calibrated: bool,
}

impl Default for MeterState {
    fn default() -> Self {
        Self {
            address: 0x01,
            input: [2300, 1500, 0, 20, 0, 1200, 0, 500, 95, 0],
            alarm_threshold: 2300,
            requests: Vec::new(),
            silent: 0,
            corrupt: 0,
            reset_without_reply: false,
            corrupt_reset: false,
            ignore_reset: false,
            reject: None,
            calibrated: false,
        }
    }
}

impl MeterState {
    pub fn energy(&self) -> u32 {
        (u32::from(self.input[REG_ENERGY_H as usize]) << 16)
            | u32::from(self.input[REG_ENERGY_L as usize])
    }

    pub fn set_energy(&mut self, wh: u32) {
        self.input[REG_ENERGY_L as usize] = wh as u16;
        self.input[REG_ENERGY_H as usize] = (wh >> 16) as u16;
    }

    pub fn count(&self, function: FunctionCode) -> usize {
        self.requests
            .iter()
            .filter(|r| r.get(1) == Some(&function.as_u8()))
            .count()
    }

    fn respond(&mut self, raw: &[u8]) -> Option<Vec<u8>> {
        self.requests.push(raw.to_vec());
        if self.silent > 0 {
            self.silent -= 1;
            return None;
        }
        let request = RtuFrame::decode(raw).ok()?;
        let address = request.address().value();
        if address != self.address && address != 0xF8 {
            return None;
        }
        let function = request.function();

        let body = match self.reject {
            Some((rejected, code)) if rejected == function => {
                vec![address, function.exception_byte(), code.as_u8()]
            }
            _ => self.handle(&request)?,
        };

        let mut reply = frame_with_crc(&body);
        let corrupt = if self.corrupt_reset && function == FunctionCode::ResetEnergy {
            true
        } else if self.corrupt > 0 {
            self.corrupt -= 1;
            true
        } else {
            false
        };
        if corrupt {
            if let Some(last) = reply.last_mut() {
                *last ^= 0xFF;
            }
        }
        Some(reply)
    }

    fn handle(&mut self, request: &RtuFrame) -> Option<Vec<u8>> {
        let address = request.address().value();
        let function = request.function();
        let echo = || request.encode()[..request.encoded_len() - 2].to_vec();
        let exception = |code: ExceptionCode| vec![address, function.exception_byte(), code.as_u8()];

        match function {
            FunctionCode::ReadInputRegisters | FunctionCode::ReadHoldingRegisters => {
                let start = request.register()? as usize;
                let count = request.value()? as usize;
                let words: Option<Vec<u16>> = (start..start + count)
                    .map(|r| self.register(function, r as u16))
                    .collect();
                Some(match words {
                    Some(words) => {
                        let mut body = vec![address, function.as_u8(), (count * 2) as u8];
                        for w in words {
                            body.extend_from_slice(&w.to_be_bytes());
                        }
                        body
                    }
                    None => exception(ExceptionCode::IllegalAddress),
                })
            }
            FunctionCode::WriteSingleRegister => {
                let value = request.value()?;
                Some(match request.register()? {
                    REG_ALARM_THRESHOLD
                        if (ALARM_THRESHOLD_MIN..=ALARM_THRESHOLD_MAX).contains(&value) =>
                    {
                        self.alarm_threshold = value;
                        echo()
                    }
                    REG_DEVICE_ADDRESS if (1..=247).contains(&value) => {
                        self.address = value as u8;
                        echo()
                    }
                    REG_ALARM_THRESHOLD | REG_DEVICE_ADDRESS => {
                        exception(ExceptionCode::IllegalDataValue)
                    }
                    _ => exception(ExceptionCode::IllegalAddress),
                })
            }
            FunctionCode::ResetEnergy => {
                if !self.ignore_reset {
                    self.set_energy(0);
                }
                if self.reset_without_reply {
                    None
                } else {
                    Some(echo())
                }
            }
            FunctionCode::Calibration => {
                if request.body() == &CALIBRATION_PASSWORD.to_be_bytes()[..] {
                    self.calibrated = true;
                    Some(echo())
                } else {
                    Some(exception(ExceptionCode::IllegalDataValue))
                }
            }
        }
    }

    fn register(&self, function: FunctionCode, register: u16) -> Option<u16> {
        match function {
            FunctionCode::ReadInputRegisters => self.input.get(register as usize).copied(),
            _ => match register {
                REG_ALARM_THRESHOLD => Some(self.alarm_threshold),
                REG_DEVICE_ADDRESS => Some(u16::from(self.address)),
                _ => None,
            },
        }
    }
}

/// In-memory transport answering requests like a PZEM-004T
#[derive(Debug, Clone)]
pub struct SimulatedMeter {
    state: Arc<Mutex<MeterState>>,
    outbox: VecDeque<u8>,
    timeout: Duration,
    closed: bool,
}

impl SimulatedMeter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MeterState::default())),
            outbox: VecDeque::new(),
            timeout: Duration::from_millis(20),
            closed: true,
        }
    }

    /// Shared handle to the device state
    pub fn handle(&self) -> Arc<Mutex<MeterState>> {
        Arc::clone(&self.state)
    }

    fn state(&self) -> MutexGuard<'_, MeterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StreamAccessor for SimulatedMeter {
    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn set_timeout(&mut self, timeout: Duration) -> PzemResult<()> {
        self.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> PzemResult<usize> {
        if self.closed {
            return Err(PzemError::NotConnected);
        }
        if self.outbox.is_empty() {
            tokio::time::sleep(self.timeout).await;
            return Err(PzemError::Timeout {
                expected: buf.len(),
                received: 0,
            });
        }
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> PzemResult<usize> {
        if self.closed {
            return Err(PzemError::NotConnected);
        }
        let reply = self.state().respond(buf);
        if let Some(reply) = reply {
            self.outbox.extend(reply);
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> PzemResult<()> {
        Ok(())
    }

    async fn discard_input(&mut self) -> PzemResult<usize> {
        let n = self.outbox.len();
        self.outbox.clear();
        Ok(n)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> PzemResult<()> {
        self.closed = true;
        self.outbox.clear();
        Ok(())
    }
}

#[async_trait]
impl TransportLayer for SimulatedMeter {
    async fn open(&mut self) -> PzemResult<()> {
        self.closed = false;
        Ok(())
    }
}
