//! PZEM-004T device operations
//!
//! [`Pzem`] wraps a [`ModbusClient`] with the meter's register map. Arguments
//! are validated before any byte is sent, measurement reads are cached for
//! `ClientConfig::refresh_interval`, and energy resets are verified by
//! reading the counter back.

use crate::client::{Command, ModbusClient};
use crate::config::ClientConfig;
use crate::measurement::{FormattedMeasurements, MeasurementSnapshot};
use crate::registers::decode_measurements;
use crate::reset::{ResetOutcome, ResetPhase, ResetProcedure};
use pzem_core::register::*;
use pzem_core::{DeviceAddress, FrameError, PzemError, PzemResult};
use pzem_session::{FrameExchange, RtuStatistics};
use tokio::time::Instant;

/// One PZEM-004T on a serial link
pub struct Pzem<L: FrameExchange> {
    client: ModbusClient<L>,
    cache: Option<(Instant, MeasurementSnapshot)>,
    last_reset: ResetPhase,
}

impl<L: FrameExchange> Pzem<L> {
    pub fn new(client: ModbusClient<L>) -> Self {
        Self {
            client,
            cache: None,
            last_reset: ResetPhase::Idle,
        }
    }

    /// Build a facade over an already opened link
    pub fn with_link(link: L, address: DeviceAddress, config: ClientConfig) -> Self {
        Self::new(ModbusClient::new(link, address, config))
    }

    pub fn address(&self) -> DeviceAddress {
        self.client.address()
    }

    pub fn client(&self) -> &ModbusClient<L> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut ModbusClient<L> {
        &mut self.client
    }

    pub fn statistics(&self) -> &RtuStatistics {
        self.client.statistics()
    }

    /// Final phase of the most recent energy reset
    pub fn last_reset_phase(&self) -> ResetPhase {
        self.last_reset
    }

    /// Last decoded measurements, if any were read since the last reset
    pub fn cached_measurements(&self) -> Option<MeasurementSnapshot> {
        self.cache.map(|(_, snapshot)| snapshot)
    }

    /// Read all measurements, served from cache within the refresh interval
    pub async fn read_measurements(&mut self) -> PzemResult<MeasurementSnapshot> {
        if let Some((read_at, snapshot)) = self.cache {
            if read_at.elapsed() < self.client.config().refresh_interval {
                return Ok(snapshot);
            }
        }
        self.refresh_measurements().await
    }

    /// Read all measurements from the device, bypassing the cache
    pub async fn refresh_measurements(&mut self) -> PzemResult<MeasurementSnapshot> {
        let registers = self
            .client
            .read_input_registers(REG_VOLTAGE, MEASUREMENT_REGISTER_COUNT)
            .await?;
        let snapshot = decode_measurements(&registers)?;
        log::debug!(
            "{}: {:.1} V, {:.3} A, {:.1} W, {:.0} Wh",
            self.address(),
            snapshot.voltage,
            snapshot.current,
            snapshot.power,
            snapshot.energy
        );
        self.cache = Some((Instant::now(), snapshot));
        Ok(snapshot)
    }

    /// Read measurements and render them for display
    pub async fn format_measurements(&mut self) -> PzemResult<FormattedMeasurements> {
        Ok(self.read_measurements().await?.format())
    }

    /// Set the power alarm threshold in watts (1..=25000)
    pub async fn set_alarm_threshold(&mut self, watts: u16) -> PzemResult<()> {
        if !(ALARM_THRESHOLD_MIN..=ALARM_THRESHOLD_MAX).contains(&watts) {
            return Err(PzemError::Validation(format!(
                "Alarm threshold must be between {} and {} W, got {}",
                ALARM_THRESHOLD_MIN, ALARM_THRESHOLD_MAX, watts
            )));
        }
        self.client
            .write_single_register(REG_ALARM_THRESHOLD, watts)
            .await?;
        log::info!("{}: alarm threshold set to {} W", self.address(), watts);
        Ok(())
    }

    pub async fn get_alarm_threshold(&mut self) -> PzemResult<u16> {
        self.read_holding(REG_ALARM_THRESHOLD).await
    }

    /// Assign a new slave address (1..=247)
    ///
    /// Later requests go to the new address.
    pub async fn set_address(&mut self, address: u8) -> PzemResult<()> {
        let new_address = DeviceAddress::slave(address)?;
        self.client
            .write_single_register(REG_DEVICE_ADDRESS, u16::from(address))
            .await?;
        log::info!("Device address changed from {} to {}", self.address(), new_address);
        self.client.set_address(new_address);
        self.cache = None;
        Ok(())
    }

    pub async fn get_address(&mut self) -> PzemResult<u8> {
        let value = self.read_holding(REG_DEVICE_ADDRESS).await?;
        u8::try_from(value).map_err(|_| {
            FrameError::ValueOutOfRange {
                register: REG_DEVICE_ADDRESS,
                value,
            }
            .into()
        })
    }

    /// Clear the energy counter
    ///
    /// The reset request is sent once. A missing or damaged reply counts as
    /// success because the device often resets without a clean answer; the
    /// readings taken around the reset decide the outcome. An exception
    /// reply or a link failure is returned as an error.
    pub async fn reset_energy(&mut self) -> PzemResult<ResetOutcome> {
        let mut procedure = ResetProcedure::new();
        let verify = self.client.config().verify_reset;

        if verify {
            procedure.advance(ResetPhase::ReadBefore);
            match self.refresh_measurements().await {
                Ok(snapshot) => procedure.record_before(snapshot.energy),
                Err(e) => log::warn!("Energy before reset unavailable, not verifying: {}", e),
            }
        }

        procedure.advance(ResetPhase::SendReset);
        let reply = self.client.execute_once(Command::ResetEnergy).await;
        procedure.advance(ResetPhase::AwaitResponse);
        self.cache = None;
        match reply {
            Ok(_) => log::info!("{}: energy reset acknowledged", self.address()),
            Err(e) if e.is_retryable() => {
                log::info!("{}: energy reset assumed applied ({})", self.address(), e)
            }
            Err(e) => {
                self.last_reset = procedure.phase();
                return Err(e);
            }
        }

        let outcome = if procedure.before().is_none() {
            procedure.finish(None)
        } else {
            procedure.advance(ResetPhase::Delay);
            let settle = self.client.config().reset_settle;
            tokio::time::sleep(settle).await;
            procedure.advance(ResetPhase::ReadAfter);
            match self.refresh_measurements().await {
                Ok(snapshot) => procedure.finish(Some(snapshot.energy)),
                Err(e) => procedure.fail(e.to_string()),
            }
        };

        match &outcome {
            ResetOutcome::Verified { before, after } => {
                log::info!("Energy reset verified: {:.0} Wh -> {:.0} Wh", before, after)
            }
            ResetOutcome::Unverified { before, after } => {
                log::warn!("Energy reset not verified: {:?} Wh -> {:?} Wh", before, after)
            }
            ResetOutcome::Failed(reason) => {
                log::warn!("Energy after reset unreadable: {}", reason)
            }
        }
        self.last_reset = procedure.phase();
        Ok(outcome)
    }

    /// Send one reset request and report whether the device reacted to it
    ///
    /// An echo or an exception reply means the command is understood, even
    /// when its CRC is damaged. Silence or a reply to another function means
    /// it is not. This clears the energy counter on devices that support it.
    pub async fn probe_reset_support(&mut self) -> PzemResult<bool> {
        self.cache = None;
        match self.client.execute_once(Command::ResetEnergy).await {
            Ok(_) | Err(PzemError::Protocol { .. }) => Ok(true),
            Err(PzemError::CorruptFrame(FrameError::UnexpectedFunction { .. })) => Ok(false),
            Err(PzemError::CorruptFrame(_)) => Ok(true),
            Err(PzemError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Factory calibration, always addressed to 0xF8
    pub async fn calibrate(&mut self) -> PzemResult<()> {
        log::warn!("Sending factory calibration command");
        self.client.execute(Command::Calibrate).await?;
        self.cache = None;
        Ok(())
    }

    pub async fn close(&mut self) -> PzemResult<()> {
        self.cache = None;
        self.client.close().await
    }

    async fn read_holding(&mut self, register: u16) -> PzemResult<u16> {
        let values = self.client.read_holding_registers(register, 1).await?;
        values.first().copied().ok_or_else(|| {
            FrameError::LengthMismatch {
                announced: 2,
                actual: 0,
            }
            .into()
        })
    }
}
