//! Modbus transaction layer
//!
//! [`ModbusClient`] encodes a [`Command`], runs it through a
//! [`FrameExchange`] and validates the reply. Timeouts and damaged replies
//! are retried up to `ClientConfig::max_retries` attempts in total; device
//! exceptions, I/O failures and invalid arguments are returned at once.
//!
//! # Error Handling
//! - `PzemError::Validation`: raised while encoding, before any I/O
//! - `PzemError::Timeout` / `PzemError::CorruptFrame`: the last attempt's error
//!   once retries are exhausted
//! - `PzemError::Protocol`: exception reply, never retried
//! - `PzemError::Io`: the link failed, never retried

use crate::config::ClientConfig;
use crate::events::{EventSink, TransactionEvent};
use pzem_core::{DeviceAddress, FrameError, FunctionCode, PzemError, PzemResult};
use pzem_session::{
    decode_echo_response, decode_read_response, encode_calibration, encode_no_body, encode_read,
    encode_write_single, FrameExchange, RegisterValues, ResponseLength, RtuFrame, RtuStatistics,
};
use tokio::sync::mpsc;

/// One Modbus operation understood by the meter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReadHoldingRegisters { register: u16, count: u16 },
    ReadInputRegisters { register: u16, count: u16 },
    WriteSingleRegister { register: u16, value: u16 },
    ResetEnergy,
    Calibrate,
}

impl Command {
    pub fn function(&self) -> FunctionCode {
        match self {
            Command::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Command::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Command::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Command::ResetEnergy => FunctionCode::ResetEnergy,
            Command::Calibrate => FunctionCode::Calibration,
        }
    }

    /// Build the request frame for `address`
    ///
    /// Calibration ignores `address` and always targets the calibration address.
    pub fn encode(&self, address: DeviceAddress) -> PzemResult<RtuFrame> {
        match *self {
            Command::ReadHoldingRegisters { register, count }
            | Command::ReadInputRegisters { register, count } => {
                encode_read(address, self.function(), register, count)
            }
            Command::WriteSingleRegister { register, value } => {
                Ok(encode_write_single(address, register, value))
            }
            Command::ResetEnergy => Ok(encode_no_body(address, FunctionCode::ResetEnergy)),
            Command::Calibrate => Ok(encode_calibration()),
        }
    }

    fn register_count(&self) -> Option<u16> {
        match *self {
            Command::ReadHoldingRegisters { count, .. }
            | Command::ReadInputRegisters { count, .. } => Some(count),
            _ => None,
        }
    }
}

/// Validated reply to a [`Command`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Register words of a read, in request order
    Registers(RegisterValues),
    /// Device echoed a write, reset or calibration request
    Acknowledged,
}

/// Transaction engine bound to one device address
pub struct ModbusClient<L: FrameExchange> {
    link: L,
    address: DeviceAddress,
    config: ClientConfig,
    statistics: RtuStatistics,
    events: EventSink,
}

impl<L: FrameExchange> ModbusClient<L> {
    pub fn new(link: L, address: DeviceAddress, config: ClientConfig) -> Self {
        Self {
            link,
            address,
            config,
            statistics: RtuStatistics::new(),
            events: EventSink::disabled(),
        }
    }

    /// Report every transaction step on `sender`
    pub fn with_events(self, sender: mpsc::UnboundedSender<TransactionEvent>) -> Self {
        self.with_event_sink(EventSink::new(sender))
    }

    pub fn with_event_sink(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Direct further requests to `address`
    pub fn set_address(&mut self, address: DeviceAddress) {
        self.address = address;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn statistics(&self) -> &RtuStatistics {
        &self.statistics
    }

    pub fn clear_statistics(&mut self) {
        self.statistics.clear();
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    pub async fn close(&mut self) -> PzemResult<()> {
        self.link.close().await
    }

    /// Run `command` with retries
    pub async fn execute(&mut self, command: Command) -> PzemResult<Response> {
        let request = command.encode(self.address)?;
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(&command, &request, attempt).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    log::warn!(
                        "{} attempt {}/{} failed: {}",
                        command.function(),
                        attempt,
                        attempts,
                        e
                    );
                    self.statistics.increment_retries();
                    self.events.emit(TransactionEvent::Retrying {
                        function: command.function(),
                        attempt,
                        reason: e.to_string(),
                    });
                    let backoff = self.config.retry_backoff;
                    tokio::time::sleep(backoff).await;
                    if let Err(e) = self.link.discard_input().await {
                        return Err(self.fail(&command, e));
                    }
                    attempt += 1;
                }
                Err(e) => return Err(self.fail(&command, e)),
            }
        }
    }

    /// Run `command` exactly once, without retries
    pub async fn execute_once(&mut self, command: Command) -> PzemResult<Response> {
        let request = command.encode(self.address)?;
        match self.attempt(&command, &request, 1).await {
            Ok(response) => Ok(response),
            Err(e) => Err(self.fail(&command, e)),
        }
    }

    pub async fn read_input_registers(
        &mut self,
        register: u16,
        count: u16,
    ) -> PzemResult<RegisterValues> {
        let response = self
            .execute(Command::ReadInputRegisters { register, count })
            .await?;
        expect_registers(response)
    }

    pub async fn read_holding_registers(
        &mut self,
        register: u16,
        count: u16,
    ) -> PzemResult<RegisterValues> {
        let response = self
            .execute(Command::ReadHoldingRegisters { register, count })
            .await?;
        expect_registers(response)
    }

    pub async fn write_single_register(&mut self, register: u16, value: u16) -> PzemResult<()> {
        self.execute(Command::WriteSingleRegister { register, value })
            .await
            .map(|_| ())
    }

    async fn attempt(
        &mut self,
        command: &Command,
        request: &RtuFrame,
        attempt: u8,
    ) -> PzemResult<Response> {
        self.statistics.increment_frames_sent();
        self.events.emit(TransactionEvent::RequestSent {
            address: request.address(),
            function: request.function(),
            attempt,
        });

        let result = match self
            .link
            .exchange(request, ResponseLength::for_request(request))
            .await
        {
            Ok(reply) => {
                self.statistics.increment_frames_received();
                self.events.emit(TransactionEvent::ResponseReceived {
                    function: request.function(),
                    len: reply.len(),
                });
                decode_reply(command, request, &reply)
            }
            Err(e) => Err(e),
        };

        match &result {
            Err(PzemError::Timeout { .. }) => self.statistics.increment_timeouts(),
            Err(PzemError::CorruptFrame(_)) => self.statistics.increment_corrupt_frames(),
            Err(PzemError::Protocol { .. }) => self.statistics.increment_exceptions(),
            _ => {}
        }
        result
    }

    fn fail(&self, command: &Command, error: PzemError) -> PzemError {
        log::error!("{} failed: {}", command.function(), error);
        self.events.emit(TransactionEvent::Failed {
            function: command.function(),
            reason: error.to_string(),
        });
        error
    }
}

fn decode_reply(command: &Command, request: &RtuFrame, reply: &[u8]) -> PzemResult<Response> {
    match command.register_count() {
        Some(count) => {
            let values = decode_read_response(reply, request.function())?;
            if values.len() != count as usize {
                return Err(FrameError::LengthMismatch {
                    announced: count as usize * 2,
                    actual: values.len() * 2,
                }
                .into());
            }
            Ok(Response::Registers(values))
        }
        None => {
            decode_echo_response(reply, request)?;
            Ok(Response::Acknowledged)
        }
    }
}

fn expect_registers(response: Response) -> PzemResult<RegisterValues> {
    match response {
        Response::Registers(values) => Ok(values),
        Response::Acknowledged => Err(FrameError::LengthMismatch {
            announced: 0,
            actual: 0,
        }
        .into()),
    }
}
