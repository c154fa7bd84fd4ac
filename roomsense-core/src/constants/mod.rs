//! Fixed values shared across the node
//!
//! Split by concern so board ports can find what they need to tune:
//! - `timing`: delays, periods and timeouts
//! - `lpp`: uplink channel numbers and record type tags
//! - `limits`: capacities and thresholds

pub mod limits;
pub mod lpp;
pub mod timing;

pub use limits::*;
pub use timing::*;
