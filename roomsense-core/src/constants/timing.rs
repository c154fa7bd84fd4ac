//! Timing constants
//!
//! All values in milliseconds unless the name says otherwise.

/// Milliseconds per second
pub const MS_PER_SECOND: u32 = 1_000;

/// Milliseconds per minute
pub const MS_PER_MINUTE: u32 = 60 * MS_PER_SECOND;

/// Settle time after the shared bus rail comes up, before the first transaction
pub const BUS_SETTLE_MS: u32 = 100;

/// Shortest warm-up any cycle waits, even if every sensor is instant-on
pub const MIN_WARM_UP_MS: u32 = 12 * MS_PER_SECOND;

/// Particulate fan needs this long before counts settle
pub const PARTICULATE_WARM_UP_MS: u32 = 30 * MS_PER_SECOND;

/// CO2 sensor data-ready bound
pub const CO2_READ_TIMEOUT_MS: u32 = 20 * MS_PER_SECOND;

/// Default bound for a data-ready poll
pub const READ_TIMEOUT_MS: u32 = 2 * MS_PER_SECOND;

/// Interval between data-ready polls
pub const POLL_INTERVAL_MS: u32 = 50;

/// Bus acknowledgement poll window at boot
pub const PROBE_TIMEOUT_MS: u32 = MS_PER_SECOND;

/// Interval between bus acknowledgement polls
pub const PROBE_INTERVAL_MS: u32 = 100;

/// Hard ceiling on any bus presence poll
pub const PROBE_CEILING_MS: u32 = 10 * MS_PER_SECOND;

/// Room counts as empty after this long without motion
pub const OCCUPANCY_TIMEOUT_MS: u32 = 10 * MS_PER_MINUTE;

/// Background VOC algorithm sampling period
pub const VOC_SAMPLE_PERIOD_MS: u32 = 30 * MS_PER_SECOND;

/// Indicator lit time per blink
pub const INDICATOR_ON_MS: u32 = 200;

/// Full indicator blink period
pub const INDICATOR_PERIOD_MS: u32 = 30 * MS_PER_SECOND;

/// E-paper rail is cut this long after a refresh
pub const DISPLAY_OFF_DELAY_MS: u32 = 2 * MS_PER_SECOND;

/// Default uplink interval in seconds
pub const DEFAULT_SEND_INTERVAL_S: u32 = 120;

/// Shortest uplink interval accepted from a user, in seconds
pub const MIN_SEND_INTERVAL_S: u32 = 10;

/// Longest uplink interval accepted from a user, in seconds
pub const MAX_SEND_INTERVAL_S: u32 = 24 * 60 * 60;
