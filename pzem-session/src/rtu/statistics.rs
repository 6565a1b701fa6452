//! Modbus-RTU transaction statistics

use serde::Serialize;

/// Counters for one serial session
///
/// Updated by the client for every attempt it makes, so retries are
/// counted as separate frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RtuStatistics {
    /// Request frames written to the link
    pub frames_sent: u64,
    /// Complete reply frames read from the link
    pub frames_received: u64,
    /// Attempts that ended without a complete reply
    pub timeouts: u64,
    /// Replies rejected for a bad CRC, length or echo
    pub corrupt_frames: u64,
    /// Exception replies from the device
    pub exceptions: u64,
    /// Attempts repeated after a transient failure
    pub retries: u64,
}

impl RtuStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all statistics counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_frames_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub fn increment_frames_received(&mut self) {
        self.frames_received += 1;
    }

    pub fn increment_timeouts(&mut self) {
        self.timeouts += 1;
    }

    pub fn increment_corrupt_frames(&mut self) {
        self.corrupt_frames += 1;
    }

    pub fn increment_exceptions(&mut self) {
        self.exceptions += 1;
    }

    pub fn increment_retries(&mut self) {
        self.retries += 1;
    }

    /// Percentage of sent requests that did not yield a usable reply
    ///
    /// Returns 0.0 if nothing has been sent.
    pub fn error_rate(&self) -> f64 {
        if self.frames_sent == 0 {
            return 0.0;
        }
        let failures = self.timeouts + self.corrupt_frames;
        (failures as f64 / self.frames_sent as f64) * 100.0
    }
}
