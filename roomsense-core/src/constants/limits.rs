//! Capacities and thresholds

/// Largest uplink the payload buffer will hold
pub const MAX_PAYLOAD: usize = 255;

/// Sensor slots on one node
pub const MAX_SENSORS: usize = 8;

/// Values a single sensor read can return
pub const MAX_SAMPLES_PER_READING: usize = 4;

/// Largest downlink kept by the radio mailbox
pub const MAX_DOWNLINK: usize = 64;

/// Consecutive join or send failures before the node restarts
pub const FAILURE_THRESHOLD: u8 = 10;

/// Every Nth uplink requests an acknowledgement
pub const HEARTBEAT_PERIOD: u8 = 30;

/// A battery reading at or above this means the node runs on battery (mV)
pub const BATTERY_DETECT_MV: u16 = 1_000;

/// Below this the display refresh is skipped (mV)
pub const LOW_BATTERY_MV: u16 = 3_300;

/// CO2 forced recalibration reference range (ppm)
pub const CO2_CALIBRATION_RANGE: (u16, u16) = (400, 2_000);
