//! Board-level node configuration
//!
//! Fixed at build time for a given board. User-adjustable values live in
//! [`crate::settings::Settings`] instead.

use crate::constants::{
    BATTERY_DETECT_MV, BUS_SETTLE_MS, DISPLAY_OFF_DELAY_MS, FAILURE_THRESHOLD, HEARTBEAT_PERIOD,
    INDICATOR_ON_MS, INDICATOR_PERIOD_MS, LOW_BATTERY_MV, MIN_WARM_UP_MS, OCCUPANCY_TIMEOUT_MS,
    PROBE_CEILING_MS, PROBE_INTERVAL_MS, PROBE_TIMEOUT_MS,
};
use crate::time::{millis, Millis};

/// Timing and threshold configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeConfig {
    /// Bus rail settle delay after enable
    pub bus_settle: Millis,
    /// Shortest warm-up regardless of sensor needs
    pub min_warm_up: Millis,
    /// No-motion time before the room counts as empty
    pub occupancy_timeout: Millis,
    /// LED flash length
    pub indicator_on: Millis,
    /// LED flash period
    pub indicator_period: Millis,
    /// Display rail hold after a refresh
    pub display_off: Millis,
    /// Presence probe bound per sensor at boot
    pub probe_timeout: Millis,
    /// Interval between presence probes
    pub probe_interval: Millis,
    /// Below this the node counts as mains powered
    pub battery_detect_mv: u16,
    /// Below this the display is not refreshed
    pub low_battery_mv: u16,
    /// Every n-th uplink is confirmed
    pub heartbeat_period: u8,
    /// Consecutive failures before a restart
    pub failure_threshold: u8,
}

impl NodeConfig {
    /// Reference board values
    pub const fn new() -> Self {
        Self {
            bus_settle: millis(BUS_SETTLE_MS),
            min_warm_up: millis(MIN_WARM_UP_MS),
            occupancy_timeout: millis(OCCUPANCY_TIMEOUT_MS),
            indicator_on: millis(INDICATOR_ON_MS),
            indicator_period: millis(INDICATOR_PERIOD_MS),
            display_off: millis(DISPLAY_OFF_DELAY_MS),
            probe_timeout: millis(PROBE_TIMEOUT_MS),
            probe_interval: millis(PROBE_INTERVAL_MS),
            battery_detect_mv: BATTERY_DETECT_MV,
            low_battery_mv: LOW_BATTERY_MV,
            heartbeat_period: HEARTBEAT_PERIOD,
            failure_threshold: FAILURE_THRESHOLD,
        }
    }

    /// Override the minimum warm-up
    pub const fn with_min_warm_up(mut self, warm_up: Millis) -> Self {
        self.min_warm_up = warm_up;
        self
    }

    /// Override the occupancy timeout
    pub const fn with_occupancy_timeout(mut self, timeout: Millis) -> Self {
        self.occupancy_timeout = timeout;
        self
    }

    /// Override the boot probe bound; capped so a dead bus cannot stall boot
    pub const fn with_probe_timeout(mut self, timeout: Millis) -> Self {
        self.probe_timeout = if timeout.ticks() > PROBE_CEILING_MS {
            millis(PROBE_CEILING_MS)
        } else {
            timeout
        };
        self
    }

    /// Override the display hold
    pub const fn with_display_off(mut self, delay: Millis) -> Self {
        self.display_off = delay;
        self
    }

    /// Override the LED timing
    pub const fn with_indicator(mut self, on: Millis, period: Millis) -> Self {
        self.indicator_on = on;
        self.indicator_period = period;
        self
    }

    /// Override the failure threshold and heartbeat period
    pub const fn with_reliability(mut self, threshold: u8, heartbeat_period: u8) -> Self {
        self.failure_threshold = threshold;
        self.heartbeat_period = heartbeat_period;
        self
    }

    /// Override the battery thresholds
    pub const fn with_battery(mut self, detect_mv: u16, low_mv: u16) -> Self {
        self.battery_detect_mv = detect_mv;
        self.low_battery_mv = low_mv;
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_values() {
        let config = NodeConfig::default();
        assert_eq!(config.bus_settle.ticks(), 100);
        assert_eq!(config.min_warm_up.ticks(), 12_000);
        assert_eq!(config.occupancy_timeout.ticks(), 600_000);
        assert_eq!(config.failure_threshold, 10);
        assert_eq!(config.heartbeat_period, 30);
    }

    #[test]
    fn probe_timeout_is_capped() {
        let config = NodeConfig::new().with_probe_timeout(millis(60_000));
        assert_eq!(config.probe_timeout.ticks(), PROBE_CEILING_MS);
    }
}
