//! Persisted user settings
//!
//! Loaded once at boot, written back whenever an AT command or a downlink
//! changes them. Storage is synchronous and behind [`SettingsStore`] so the
//! node does not care whether it is flash, a file on a gateway, or RAM in
//! a test.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::{
    CO2_CALIBRATION_RANGE, DEFAULT_SEND_INTERVAL_S, MAX_SEND_INTERVAL_S, MIN_SEND_INTERVAL_S,
};
use crate::datarate::Region;
use crate::errors::SettingsError;
use crate::time::{secs, Millis};

/// Display layout
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UiMode {
    /// Numbers and units
    #[default]
    Scientific = 0,
    /// Icons
    Iconic = 1,
}

impl UiMode {
    /// Mode for an AT parameter
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Scientific),
            1 => Some(Self::Iconic),
            _ => None,
        }
    }

    /// The other mode
    pub const fn toggled(self) -> Self {
        match self {
            Self::Scientific => Self::Iconic,
            Self::Iconic => Self::Scientific,
        }
    }
}

/// User-visible configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Settings {
    /// Nominal uplink interval in seconds
    pub send_interval_s: u32,
    /// Display layout
    pub ui_mode: UiMode,
    /// Request acknowledgement on every uplink
    pub confirmed: bool,
    /// Regional plan used for rate fitting
    pub region: Region,
    /// Last CO2 recalibration reference, ppm
    pub co2_reference_ppm: Option<u16>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            send_interval_s: DEFAULT_SEND_INTERVAL_S,
            ui_mode: UiMode::Scientific,
            confirmed: false,
            region: Region::Eu868,
            co2_reference_ppm: None,
        }
    }
}

impl Settings {
    /// Nominal uplink interval
    pub fn send_interval(&self) -> Millis {
        secs(self.send_interval_s)
    }

    /// Check every field against its accepted range
    pub fn validate(&self) -> Result<(), SettingsError> {
        validate_send_interval(self.send_interval_s)?;
        if let Some(ppm) = self.co2_reference_ppm {
            validate_co2_reference(ppm)?;
        }
        Ok(())
    }
}

/// Accepted uplink interval range
pub fn validate_send_interval(seconds: u32) -> Result<(), SettingsError> {
    if (MIN_SEND_INTERVAL_S..=MAX_SEND_INTERVAL_S).contains(&seconds) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field: "send_interval_s",
        })
    }
}

/// Accepted CO2 reference range
pub fn validate_co2_reference(ppm: u16) -> Result<(), SettingsError> {
    let (low, high) = CO2_CALIBRATION_RANGE;
    if (low..=high).contains(&ppm) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field: "co2_reference_ppm",
        })
    }
}

/// Synchronous key-value persistence
pub trait SettingsStore {
    /// Read stored settings; defaults when nothing was stored yet
    fn load(&mut self) -> Result<Settings, SettingsError>;

    /// Write settings
    fn save(&mut self, settings: &Settings) -> Result<(), SettingsError>;
}

/// RAM-backed store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    stored: Option<Settings>,
    writes: u32,
}

impl MemoryStore {
    /// Nothing stored
    pub const fn new() -> Self {
        Self {
            stored: None,
            writes: 0,
        }
    }

    /// Store pre-seeded with `settings`
    pub const fn with(settings: Settings) -> Self {
        Self {
            stored: Some(settings),
            writes: 0,
        }
    }

    /// Last saved value
    pub fn stored(&self) -> Option<&Settings> {
        self.stored.as_ref()
    }

    /// Number of saves
    pub fn writes(&self) -> u32 {
        self.writes
    }
}

impl SettingsStore for MemoryStore {
    fn load(&mut self) -> Result<Settings, SettingsError> {
        Ok(self.stored.unwrap_or_default())
    }

    fn save(&mut self, settings: &Settings) -> Result<(), SettingsError> {
        self.stored = Some(*settings);
        self.writes += 1;
        Ok(())
    }
}

/// JSON file store for hosted gateways and simulation
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: std::path::PathBuf,
}

#[cfg(feature = "std")]
impl JsonFileStore {
    /// Store backed by `path`; the file is created on first save
    pub fn new<P: Into<std::path::PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(feature = "std")]
impl SettingsStore for JsonFileStore {
    fn load(&mut self) -> Result<Settings, SettingsError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(_) => return Err(SettingsError::Io),
        };

        let settings: Settings = serde_json::from_slice(&bytes).map_err(|_| SettingsError::Corrupt)?;
        settings.validate()?;
        Ok(settings)
    }

    fn save(&mut self, settings: &Settings) -> Result<(), SettingsError> {
        let json = serde_json::to_vec_pretty(settings).map_err(|_| SettingsError::Corrupt)?;
        std::fs::write(&self.path, json).map_err(|_| SettingsError::Io)
    }
}
