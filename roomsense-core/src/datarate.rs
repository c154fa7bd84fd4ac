//! Payload-size to data-rate fitting
//!
//! ## Overview
//!
//! Each regional plan limits how many application bytes a frame may carry
//! at each data rate. When the radio lets the caller pick the rate, the node
//! picks the slowest (longest range) rate that still fits the uplink.
//!
//! ## Tables
//!
//! One ceiling per rate index 0..15. A zero ceiling marks a rate the region
//! does not offer; it is skipped explicitly rather than by accident of the
//! comparison.
//!
//! ```text
//! EU868  51  51  51 115 242 242 242 242   0   0   0   0   0   0   0   0
//! US915  11  53 125 242 242   0   0   0  53 129 242 242 242 242   0   0
//! AS923   0   0  19  61 133 250 250 250   0   0   0   0   0   0   0   0
//! ```
//!
//! ## Rule
//!
//! First index, ascending, whose ceiling is non-zero and strictly greater
//! than the payload length. If the radio then rejects that rate (MAC
//! overhead, dwell limits), try the next qualifying index once before
//! giving up.

use crate::errors::RateError;

/// Rate indices per region
pub const RATE_COUNT: usize = 16;

/// Ordinal selecting a data rate
pub type RateIndex = u8;

/// Payload ceiling per rate index; 0 marks an unusable rate
pub type RateTable = [u16; RATE_COUNT];

const EU868_TABLE: RateTable = [51, 51, 51, 115, 242, 242, 242, 242, 0, 0, 0, 0, 0, 0, 0, 0];
const AU915_TABLE: RateTable = [51, 51, 51, 115, 242, 242, 242, 0, 53, 129, 242, 242, 242, 242, 0, 0];
const CN470_TABLE: RateTable = [51, 51, 51, 115, 242, 242, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
const US915_TABLE: RateTable = [11, 53, 125, 242, 242, 0, 0, 0, 53, 129, 242, 242, 242, 242, 0, 0];
const AS923_TABLE: RateTable = [0, 0, 19, 61, 133, 250, 250, 250, 0, 0, 0, 0, 0, 0, 0, 0];

/// Regional frequency plan
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Region {
    /// AS923 group 1
    As923_1 = 0,
    /// Australia 915
    Au915 = 1,
    /// China 470
    Cn470 = 2,
    /// China 779
    Cn779 = 3,
    /// Europe 433
    Eu433 = 4,
    /// Europe 868
    Eu868 = 5,
    /// India 865
    In865 = 6,
    /// Korea 920
    Kr920 = 7,
    /// United States 915
    Us915 = 8,
    /// AS923 group 2
    As923_2 = 9,
    /// AS923 group 3
    As923_3 = 10,
    /// AS923 group 4
    As923_4 = 11,
    /// Russia 864
    Ru864 = 12,
}

impl Region {
    /// Every region in radio-stack index order
    pub const ALL: [Region; 13] = [
        Region::As923_1,
        Region::Au915,
        Region::Cn470,
        Region::Cn779,
        Region::Eu433,
        Region::Eu868,
        Region::In865,
        Region::Kr920,
        Region::Us915,
        Region::As923_2,
        Region::As923_3,
        Region::As923_4,
        Region::Ru864,
    ];

    /// Region for a radio-stack index
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    /// Radio-stack index
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Plan name
    pub const fn name(self) -> &'static str {
        match self {
            Region::As923_1 => "AS923-1",
            Region::Au915 => "AU915",
            Region::Cn470 => "CN470",
            Region::Cn779 => "CN779",
            Region::Eu433 => "EU433",
            Region::Eu868 => "EU868",
            Region::In865 => "IN865",
            Region::Kr920 => "KR920",
            Region::Us915 => "US915",
            Region::As923_2 => "AS923-2",
            Region::As923_3 => "AS923-3",
            Region::As923_4 => "AS923-4",
            Region::Ru864 => "RU864",
        }
    }

    /// Payload ceilings for this plan
    pub const fn table(self) -> &'static RateTable {
        match self {
            Region::Eu868 | Region::Eu433 | Region::In865 | Region::Ru864 => &EU868_TABLE,
            Region::Au915 => &AU915_TABLE,
            Region::Cn470 | Region::Cn779 | Region::Kr920 => &CN470_TABLE,
            Region::Us915 => &US915_TABLE,
            Region::As923_1 | Region::As923_2 | Region::As923_3 | Region::As923_4 => &AS923_TABLE,
        }
    }
}

/// First usable index at or after `start` whose ceiling exceeds `payload_len`
pub fn fit_in_table(table: &RateTable, payload_len: usize, start: usize) -> Option<RateIndex> {
    table
        .iter()
        .enumerate()
        .skip(start)
        .find(|&(_, &ceiling)| ceiling != 0 && usize::from(ceiling) > payload_len)
        .map(|(index, _)| index as RateIndex)
}

/// Slowest rate in `region` that carries `payload_len` bytes
pub fn fit_rate(region: Region, payload_len: usize) -> Option<RateIndex> {
    fit_in_table(region.table(), payload_len, 0)
}

/// Fit, then confirm with the radio, retrying once on the next index
///
/// `feasible` is the radio's own check for the chosen rate and length.
pub fn fit_rate_validated<F>(
    region: Region,
    payload_len: usize,
    mut feasible: F,
) -> Result<RateIndex, RateError>
where
    F: FnMut(RateIndex) -> bool,
{
    let table = region.table();
    let first = fit_in_table(table, payload_len, 0).ok_or(RateError::NoUsableRate { payload_len })?;
    if feasible(first) {
        return Ok(first);
    }

    log_debug!("rate {} rejected for {} bytes, trying next", first, payload_len);
    match fit_in_table(table, payload_len, usize::from(first) + 1) {
        Some(next) if feasible(next) => Ok(next),
        Some(next) => Err(RateError::Rejected { rate: next }),
        None => Err(RateError::Rejected { rate: first }),
    }
}
