//! Firmware core for RoomSense occupancy and air-quality nodes
//!
//! A node wakes on a timer, powers the sensor rails it needs, reads each
//! module within a bound, packs the values as Cayenne LPP and hands the
//! frame to a LoRaWAN radio. Everything is driven by event bits posted from
//! interrupts and serviced by a single dispatcher loop.
//!
//! Key constraints:
//! - No heap; every buffer is sized at compile time
//! - Interrupt handlers only store a value and post a bit
//! - A rail is cut only after every sensor on it has been parked
//!
//! ```no_run
//! use roomsense_core::{irq::Shared, node::Node};
//!
//! static SHARED: Shared = Shared::new();
//!
//! fn run(node: &mut Node<'_>) {
//!     node.boot();
//!     loop {
//!         if let Some(_cause) = node.poll() {
//!             break; // board restart
//!         }
//!     }
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod at;
pub mod config;
pub mod constants;
pub mod datarate;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod indicator;
pub mod irq;
pub mod node;
pub mod occupancy;
pub mod payload;
pub mod power;
pub mod radio;
pub mod reliability;
pub mod sensor;
pub mod settings;
pub mod time;
pub mod timer;
pub mod wait;

#[cfg(feature = "sim")]
pub mod sim;

// Public API
pub use config::NodeConfig;
pub use dispatcher::{dispatch, EventHandler, Flow, ResetCause};
pub use errors::{NodeError, NodeResult};
pub use events::{Event, EventFlags, EventMask};
pub use node::{CycleReport, CycleState, Node, Peripherals, PowerSource, TxOutcome};
pub use power::{PowerDomain, PowerSequencer, Requester};
pub use sensor::{SensorBank, SensorConfig, SensorDriver, SensorKind};
pub use time::{Clock, Millis, Timestamp};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
