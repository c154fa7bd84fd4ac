//! Status LED and display contracts
//!
//! Both are cosmetic: the node calls them from the dispatcher only, never
//! waits on them, and skips the display entirely when the battery is low.

use crate::datarate::RateIndex;
use crate::sensor::{Quantity, Readings};
use crate::settings::UiMode;
use crate::time::{millis, Millis};

/// Overall air quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AirStatus {
    /// Nothing elevated
    Good,
    /// At least one value elevated
    Moderate,
    /// At least one value high
    Poor,
}

/// Moderate and poor thresholds per quantity; a value above the threshold
/// reaches that level
const THRESHOLDS: [(Quantity, f32, f32); 5] = [
    (Quantity::VocIndex, 250.0, 400.0),
    (Quantity::Co2, 1_000.0, 1_500.0),
    (Quantity::Pm1_0, 35.0, 75.0),
    (Quantity::Pm2_5, 35.0, 75.0),
    (Quantity::Pm10, 150.0, 199.0),
];

impl AirStatus {
    /// Worst level across every known value
    pub fn classify(readings: &Readings) -> Self {
        THRESHOLDS
            .iter()
            .filter_map(|&(quantity, moderate, poor)| {
                readings.get(quantity).map(|value| {
                    if value > poor {
                        AirStatus::Poor
                    } else if value > moderate {
                        AirStatus::Moderate
                    } else {
                        AirStatus::Good
                    }
                })
            })
            .max()
            .unwrap_or(AirStatus::Good)
    }

    /// LED colour for this level
    pub const fn color(self) -> Color {
        match self {
            AirStatus::Good => Color::Blue,
            AirStatus::Moderate => Color::Yellow,
            AirStatus::Poor => Color::Red,
        }
    }
}

/// LED colours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Color {
    /// Dark
    Off,
    /// Good air
    Blue,
    /// Moderate air
    Yellow,
    /// Poor air
    Red,
}

/// Status LED driver
pub trait Indicator {
    /// Show a colour until the next call
    fn show(&mut self, color: Color);
}

/// Blink sequencing for the status LED
///
/// Short flash, long dark gap. Dark while the room is empty.
#[derive(Debug, Clone, Copy)]
pub struct Blinker {
    lit: bool,
    on: Millis,
    period: Millis,
}

impl Blinker {
    /// Flash for `on` once every `period`
    pub const fn new(on: Millis, period: Millis) -> Self {
        Self {
            lit: false,
            on,
            period,
        }
    }

    /// Next blink step; returns what to show and when to step again
    pub fn step(&mut self, status: AirStatus, occupied: bool) -> (Color, Millis) {
        let off_time = millis(self.period.ticks().saturating_sub(self.on.ticks()));
        if self.lit || !occupied {
            self.lit = false;
            (Color::Off, off_time)
        } else {
            self.lit = true;
            (status.color(), self.on)
        }
    }

    /// Whether the LED is lit
    pub const fn is_lit(&self) -> bool {
        self.lit
    }
}

/// Screen to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Screen {
    /// Latest measurements
    Measurements,
    /// Network and battery status
    Status,
    /// Shown right before a restart
    Goodbye,
}

/// Everything the display may draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayState {
    /// Screen selection
    pub screen: Screen,
    /// Layout
    pub ui: UiMode,
    /// Latest values
    pub readings: Readings,
    /// Air quality summary
    pub air: AirStatus,
    /// Battery voltage, mV
    pub battery_mv: u16,
    /// Room occupancy
    pub occupied: bool,
    /// Network session present
    pub joined: bool,
    /// Rate used for the last uplink
    pub last_rate: Option<RateIndex>,
}

/// E-paper driver
pub trait Display {
    /// Draw a full frame
    fn render(&mut self, state: &DisplayState);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_readings_are_good() {
        assert_eq!(AirStatus::classify(&Readings::new()), AirStatus::Good);
    }

    #[test]
    fn worst_value_wins() {
        let mut readings = Readings::new();
        readings.set(Quantity::Co2, 1_200.0);
        readings.set(Quantity::VocIndex, 90.0);
        assert_eq!(AirStatus::classify(&readings), AirStatus::Moderate);

        readings.set(Quantity::Pm2_5, 80.0);
        assert_eq!(AirStatus::classify(&readings), AirStatus::Poor);
    }

    #[test]
    fn thresholds_are_exclusive() {
        let mut readings = Readings::new();
        readings.set(Quantity::Pm10, 150.0);
        assert_eq!(AirStatus::classify(&readings), AirStatus::Good);
        readings.set(Quantity::Pm10, 151.0);
        assert_eq!(AirStatus::classify(&readings), AirStatus::Moderate);
    }

    #[test]
    fn blinker_flashes_then_waits() {
        let mut blinker = Blinker::new(millis(200), millis(30_000));

        let (color, next) = blinker.step(AirStatus::Moderate, true);
        assert_eq!(color, Color::Yellow);
        assert_eq!(next.ticks(), 200);

        let (color, next) = blinker.step(AirStatus::Moderate, true);
        assert_eq!(color, Color::Off);
        assert_eq!(next.ticks(), 29_800);
    }

    #[test]
    fn blinker_dark_when_empty() {
        let mut blinker = Blinker::new(millis(200), millis(30_000));
        let (color, _) = blinker.step(AirStatus::Poor, false);
        assert_eq!(color, Color::Off);
        assert!(!blinker.is_lit());
    }
}
