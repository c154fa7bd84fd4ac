//! Error types for the node
//!
//! Every fallible call in the node returns one of these. They are small
//! `Copy` enums with no heap data so they can be returned from handlers,
//! stored in cycle reports and logged with `defmt` on target.
//!
//! ## Categories
//!
//! ```text
//! SensorError    transient: omit the channel this cycle
//! PowerError     rail switching failed or a rail was off when needed
//! PayloadError   record did not fit or value not encodable
//! RateError      no rate in the region can carry the uplink
//! RadioError     link not joined or rejected the frame
//! SettingsError  persisted configuration unreadable or out of range
//! CommandError   AT command malformed or not applicable
//! ```
//!
//! `NodeError` wraps all of them for call sites that mix concerns.
//!
//! ## Escalation
//!
//! None of these errors restart the node on their own. Only the reliability
//! counters do that, after repeated radio failures, and an explicit reset
//! request always wins.

use core::fmt;

use thiserror_no_std::Error;

use crate::power::PowerDomain;

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;

/// Sensor driver failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// No data within the configured bound
    #[error("no data within {waited_ms} ms")]
    Timeout {
        /// Bound that elapsed
        waited_ms: u32,
    },

    /// Device did not acknowledge on the bus
    #[error("device did not acknowledge")]
    Nack,

    /// Owning power domain is off
    #[error("power domain {domain} is off")]
    DomainOff {
        /// Domain that was found off
        domain: PowerDomain,
    },

    /// Not detected at boot
    #[error("sensor not present")]
    NotPresent,

    /// Driver does not implement the request
    #[error("operation not supported by this sensor")]
    Unsupported,

    /// Bank has no room for another sensor, or the kind is already registered
    #[error("sensor bank full or kind already registered")]
    BankFull,
}

/// Power rail failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerError {
    /// Rail driver reported an error while switching
    #[error("rail {domain} failed to switch")]
    RailFault {
        /// Rail that failed
        domain: PowerDomain,
    },

    /// Caller needed a rail that is off
    #[error("rail {domain} is not powered")]
    Unpowered {
        /// Rail that is off
        domain: PowerDomain,
    },
}

/// Payload assembly failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadError {
    /// Record would overflow the buffer
    #[error("record needs {needed} bytes, {remaining} left")]
    Full {
        /// Bytes the record needs
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// NaN or infinity cannot be encoded
    #[error("value is not finite")]
    InvalidValue,
}

/// Rate fitting failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RateError {
    /// Payload exceeds every usable ceiling in the region
    #[error("{payload_len} bytes exceed every rate in the region")]
    NoUsableRate {
        /// Uplink length
        payload_len: usize,
    },

    /// Table allowed the rate but the radio rejected it and the retry too
    #[error("radio rejected rate {rate}")]
    Rejected {
        /// Last rate tried
        rate: u8,
    },
}

/// Radio link failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// No network session yet
    #[error("not joined")]
    NotJoined,

    /// Stack is busy with a previous frame
    #[error("radio busy")]
    Busy,

    /// Frame too large for the current rate
    #[error("frame too large for current rate")]
    TooLarge,

    /// Stack refused the request
    #[error("request refused by the radio stack")]
    Refused,
}

/// Persisted settings failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError {
    /// Backing store could not be read or written
    #[error("settings storage I/O failed")]
    Io,

    /// Stored data could not be decoded
    #[error("stored settings are corrupt")]
    Corrupt,

    /// Field outside its accepted range
    #[error("setting {field} out of range")]
    OutOfRange {
        /// Offending field
        field: &'static str,
    },
}

/// AT command failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Not a command this node knows
    #[error("unknown command")]
    Unknown,

    /// Parameter missing, malformed or out of range
    #[error("invalid parameter")]
    Parameter,

    /// Node is mid-cycle and cannot apply the command now
    #[error("busy, retry after the current cycle")]
    Busy,

    /// Required hardware is not fitted
    #[error("required module not present")]
    NotPresent,
}

/// Any node failure
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeError {
    /// Sensor failure
    #[error("sensor: {0}")]
    Sensor(#[from] SensorError),

    /// Power failure
    #[error("power: {0}")]
    Power(#[from] PowerError),

    /// Payload failure
    #[error("payload: {0}")]
    Payload(#[from] PayloadError),

    /// Rate fitting failure
    #[error("rate: {0}")]
    Rate(#[from] RateError),

    /// Radio failure
    #[error("radio: {0}")]
    Radio(#[from] RadioError),

    /// Settings failure
    #[error("settings: {0}")]
    Settings(#[from] SettingsError),

    /// Command failure
    #[error("command: {0}")]
    Command(#[from] CommandError),
}

#[cfg(feature = "defmt")]
impl defmt::Format for NodeError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Sensor(e) => defmt::write!(fmt, "sensor: {}", e),
            Self::Power(e) => defmt::write!(fmt, "power: {}", e),
            Self::Payload(e) => defmt::write!(fmt, "payload: {}", e),
            Self::Rate(e) => defmt::write!(fmt, "rate: {}", e),
            Self::Radio(e) => defmt::write!(fmt, "radio: {}", e),
            Self::Settings(e) => defmt::write!(fmt, "settings: {}", e),
            Self::Command(e) => defmt::write!(fmt, "command: {}", e),
        }
    }
}

/// Outcome of a bounded wait that did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitError<E> {
    /// Bound elapsed without a result
    Timeout {
        /// Bound that elapsed
        waited_ms: u32,
    },
    /// Operation failed outright
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for WaitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { waited_ms } => write!(f, "timed out after {} ms", waited_ms),
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl From<WaitError<SensorError>> for SensorError {
    fn from(err: WaitError<SensorError>) -> Self {
        match err {
            WaitError::Timeout { waited_ms } => SensorError::Timeout { waited_ms },
            WaitError::Failed(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_timeout_becomes_sensor_timeout() {
        let err: SensorError = WaitError::<SensorError>::Timeout { waited_ms: 20_000 }.into();
        assert_eq!(err, SensorError::Timeout { waited_ms: 20_000 });

        let err: SensorError = WaitError::Failed(SensorError::Nack).into();
        assert_eq!(err, SensorError::Nack);
    }

    #[test]
    fn node_error_wraps_sources() {
        let err: NodeError = RadioError::Busy.into();
        assert!(matches!(err, NodeError::Radio(RadioError::Busy)));
    }

    #[cfg(feature = "std")]
    #[test]
    fn messages_name_the_domain() {
        let err = PowerError::Unpowered { domain: PowerDomain::Bus };
        assert_eq!(err.to_string(), "rail bus is not powered");

        let err = SensorError::Timeout { waited_ms: 500 };
        assert_eq!(err.to_string(), "no data within 500 ms");
    }
}
