//! Client configuration

use pzem_core::{PzemError, PzemResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transaction and device-operation tuning
///
/// Link parameters (port, baud, read timeout) live in
/// `pzem_transport::SerialSettings`; this covers what happens above the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Total attempts per transaction, first try included
    pub max_retries: u8,
    /// Pause before a repeated attempt
    pub retry_backoff: Duration,
    /// Measurements younger than this are served from cache
    pub refresh_interval: Duration,
    /// Read energy before and after a reset to confirm it
    pub verify_reset: bool,
    /// Time the device needs to persist a reset before it is read back
    pub reset_settle: Duration,
}

impl ClientConfig {
    pub fn validate(&self) -> PzemResult<()> {
        if self.max_retries == 0 {
            return Err(PzemError::Validation(
                "max_retries must allow at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            refresh_interval: Duration::from_millis(100),
            verify_reset: true,
            reset_settle: Duration::from_millis(500),
        }
    }
}
