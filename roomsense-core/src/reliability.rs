//! Radio failure counters and heartbeat
//!
//! Joins and uplinks are counted separately. Each consecutive failure adds
//! one, any success clears the count, and reaching the threshold asks for a
//! device restart. There is no backoff: a node that cannot reach the
//! network ten times in a row is restarted from cold.
//!
//! Independently, every Nth uplink requests an acknowledgement so a node
//! configured for unconfirmed traffic still notices a dead link. Only uplinks
//! the radio accepted count; a refused one leaves the heartbeat due.

use crate::constants::{FAILURE_THRESHOLD, HEARTBEAT_PERIOD};

/// What the caller should do after recording a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// Keep retrying
    Continue,
    /// Threshold reached; restart the device
    Reset,
}

/// Consecutive-failure counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCounter {
    count: u8,
    threshold: u8,
}

impl FailureCounter {
    /// Counter that resets at `threshold`
    pub const fn new(threshold: u8) -> Self {
        Self { count: 0, threshold }
    }

    /// Count one failure
    pub fn record_failure(&mut self) -> Verdict {
        self.count = self.count.saturating_add(1);
        if self.count >= self.threshold {
            Verdict::Reset
        } else {
            Verdict::Continue
        }
    }

    /// Clear after a success
    pub fn record_success(&mut self) {
        self.count = 0;
    }

    /// Consecutive failures so far
    pub const fn count(&self) -> u8 {
        self.count
    }
}

/// Forces an acknowledged uplink every `period` uplinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    counter: u8,
    period: u8,
}

impl Heartbeat {
    /// Heartbeat every `period` uplinks
    pub const fn new(period: u8) -> Self {
        Self { counter: 0, period }
    }

    /// Whether the next uplink must be confirmed
    pub const fn due(&self) -> bool {
        self.counter.saturating_add(1) >= self.period
    }

    /// Count one accepted uplink; true when it was the forced one
    pub fn tick(&mut self) -> bool {
        let forced = self.due();
        self.counter = if forced { 0 } else { self.counter + 1 };
        forced
    }

    /// Uplinks since the last forced acknowledgement
    pub const fn counter(&self) -> u8 {
        self.counter
    }
}

/// Join and send counters plus heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReliabilityCounters {
    join: FailureCounter,
    send: FailureCounter,
    heartbeat: Heartbeat,
}

impl ReliabilityCounters {
    /// Counters with custom threshold and heartbeat period
    pub const fn new(threshold: u8, heartbeat_period: u8) -> Self {
        Self {
            join: FailureCounter::new(threshold),
            send: FailureCounter::new(threshold),
            heartbeat: Heartbeat::new(heartbeat_period),
        }
    }

    /// Join attempt failed
    pub fn join_failed(&mut self) -> Verdict {
        let verdict = self.join.record_failure();
        log_warn!("join failed ({} in a row)", self.join.count());
        verdict
    }

    /// Join succeeded
    pub fn join_succeeded(&mut self) {
        self.join.record_success();
    }

    /// Uplink failed or was refused
    pub fn send_failed(&mut self) -> Verdict {
        let verdict = self.send.record_failure();
        log_warn!("send failed ({} in a row)", self.send.count());
        verdict
    }

    /// Uplink succeeded
    pub fn send_succeeded(&mut self) {
        self.send.record_success();
    }

    /// Whether the next uplink requests an acknowledgement
    pub fn confirm_next(&self, default_confirmed: bool) -> bool {
        default_confirmed || self.heartbeat.due()
    }

    /// Radio accepted an uplink; advances the heartbeat
    pub fn uplink_accepted(&mut self) {
        if self.heartbeat.tick() {
            log_info!("heartbeat uplink queued");
        }
    }

    /// Consecutive join failures
    pub const fn join_failures(&self) -> u8 {
        self.join.count()
    }

    /// Consecutive send failures
    pub const fn send_failures(&self) -> u8 {
        self.send.count()
    }
}

impl Default for ReliabilityCounters {
    fn default() -> Self {
        Self::new(FAILURE_THRESHOLD, HEARTBEAT_PERIOD)
    }
}
