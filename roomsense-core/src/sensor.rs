//! Sensor contract, per-sensor tuning and the boot-time presence set
//!
//! Drivers are black boxes behind [`SensorDriver`]. The node only ever:
//!
//! ```text
//!  boot:        probe()                       ─▶ SensorPresence (fixed)
//!  cycle start: wake()
//!  warm-up end: read() until ready or timeout ─▶ samples ─▶ payload
//!               sleep()                       (SleepCommand sensors)
//!  background:  sample()                      (AlwaysOn sensors)
//! ```
//!
//! Timing differs per board and per module revision, so warm-up, read
//! timeout and shutdown behaviour are injected through [`SensorConfig`]
//! rather than assumed.

use heapless::Vec;

use crate::constants::{
    CO2_READ_TIMEOUT_MS, MAX_SAMPLES_PER_READING, MAX_SENSORS, PARTICULATE_WARM_UP_MS,
    POLL_INTERVAL_MS, READ_TIMEOUT_MS, VOC_SAMPLE_PERIOD_MS,
};
use crate::errors::SensorError;
use crate::power::PowerDomain;
use crate::time::{millis, Millis};

/// Supported sensor modules, in read order
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorKind {
    /// Temperature and humidity
    TempHumidity = 0,
    /// Barometric pressure
    Pressure = 1,
    /// Ambient light
    Light = 2,
    /// Combined temperature, humidity, pressure and gas resistance
    Environment = 3,
    /// Secondary ambient light
    Light2 = 4,
    /// CO2 concentration
    Co2 = 5,
    /// Particulate matter
    Particulate = 6,
    /// VOC index
    Voc = 7,
}

impl SensorKind {
    /// Number of kinds
    pub const COUNT: usize = 8;

    /// Every kind in read order
    pub const ALL: [SensorKind; SensorKind::COUNT] = [
        SensorKind::TempHumidity,
        SensorKind::Pressure,
        SensorKind::Light,
        SensorKind::Environment,
        SensorKind::Light2,
        SensorKind::Co2,
        SensorKind::Particulate,
        SensorKind::Voc,
    ];

    /// Name used in logs and module listings
    pub const fn name(self) -> &'static str {
        match self {
            SensorKind::TempHumidity => "temp-humidity",
            SensorKind::Pressure => "pressure",
            SensorKind::Light => "light",
            SensorKind::Environment => "environment",
            SensorKind::Light2 => "light-2",
            SensorKind::Co2 => "co2",
            SensorKind::Particulate => "particulate",
            SensorKind::Voc => "voc",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Physical quantity a sensor reports
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Quantity {
    /// Degrees Celsius
    Temperature = 0,
    /// Relative humidity, percent
    Humidity = 1,
    /// Hectopascal
    Pressure = 2,
    /// Lux
    Light = 3,
    /// Gas resistance, kilo-ohm
    GasResistance = 4,
    /// CO2, ppm
    Co2 = 5,
    /// PM1.0, µg/m³
    Pm1_0 = 6,
    /// PM2.5, µg/m³
    Pm2_5 = 7,
    /// PM10, µg/m³
    Pm10 = 8,
    /// VOC index, 0 to 500
    VocIndex = 9,
}

impl Quantity {
    /// Number of quantities
    pub const COUNT: usize = 10;

    /// Every quantity
    pub const ALL: [Quantity; Quantity::COUNT] = [
        Quantity::Temperature,
        Quantity::Humidity,
        Quantity::Pressure,
        Quantity::Light,
        Quantity::GasResistance,
        Quantity::Co2,
        Quantity::Pm1_0,
        Quantity::Pm2_5,
        Quantity::Pm10,
        Quantity::VocIndex,
    ];
}

/// One value from a read
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    /// What was measured
    pub quantity: Quantity,
    /// Value in the quantity's unit
    pub value: f32,
}

impl Sample {
    /// Sample of `quantity`
    pub const fn new(quantity: Quantity, value: f32) -> Self {
        Self { quantity, value }
    }
}

/// Values returned by one read
pub type Reading = Vec<Sample, MAX_SAMPLES_PER_READING>;

/// Driver contract
///
/// Every call is bounded: drivers return `WouldBlock` from `read` instead of
/// spinning, and the node decides how long to keep asking.
pub trait SensorDriver {
    /// Whether the device acknowledges on the bus
    fn probe(&mut self) -> bool;

    /// Start a measurement or leave low-power mode
    fn wake(&mut self) -> Result<(), SensorError>;

    /// Latest reading, `WouldBlock` until data is ready
    fn read(&mut self) -> nb::Result<Reading, SensorError>;

    /// Enter low-power mode; the bus is still up
    fn sleep(&mut self) -> Result<(), SensorError>;

    /// Last value read for `quantity`
    fn value(&self, quantity: Quantity) -> Option<f32>;

    /// One background algorithm step for always-on sensors
    fn sample(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    /// Forced recalibration against a reference
    fn calibrate(&mut self, _reference: u16) -> Result<(), SensorError> {
        Err(SensorError::Unsupported)
    }
}

/// How a sensor stops drawing power after a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShutdownMode {
    /// Software sleep command while the bus is still live
    SleepCommand,
    /// Only cutting its domain stops it
    DomainCut,
    /// Never shut down; sampled in the background
    AlwaysOn,
}

/// Per-sensor tuning
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorConfig {
    /// Module kind
    pub kind: SensorKind,
    /// Rail that powers the module besides the bus
    pub domain: PowerDomain,
    /// Shutdown behaviour
    pub shutdown: ShutdownMode,
    /// Time from wake to first valid reading
    pub warm_up: Millis,
    /// Bound on the data-ready poll
    pub read_timeout: Millis,
    /// Interval between data-ready polls
    pub poll_interval: Millis,
    /// Background sampling period for always-on sensors
    pub background: Option<Millis>,
}

impl SensorConfig {
    /// Defaults for a kind
    ///
    /// ```text
    /// kind          domain          shutdown      warm-up  timeout
    /// temp/hum      bus             sleep         0        2 s
    /// pressure      bus             sleep         0        2 s
    /// light         bus             sleep         0        2 s
    /// environment   bus             sleep         0        2 s
    /// light-2       bus             sleep         0        2 s
    /// co2           gas-particulate sleep         0        20 s
    /// particulate   gas-particulate domain cut    30 s     2 s
    /// voc           voc             always on     0        2 s, sampled every 30 s
    /// ```
    pub const fn new(kind: SensorKind) -> Self {
        let base = Self {
            kind,
            domain: PowerDomain::Bus,
            shutdown: ShutdownMode::SleepCommand,
            warm_up: millis(0),
            read_timeout: millis(READ_TIMEOUT_MS),
            poll_interval: millis(POLL_INTERVAL_MS),
            background: None,
        };

        match kind {
            SensorKind::Co2 => Self {
                domain: PowerDomain::GasParticulate,
                read_timeout: millis(CO2_READ_TIMEOUT_MS),
                ..base
            },
            SensorKind::Particulate => Self {
                domain: PowerDomain::GasParticulate,
                shutdown: ShutdownMode::DomainCut,
                warm_up: millis(PARTICULATE_WARM_UP_MS),
                ..base
            },
            SensorKind::Voc => Self {
                domain: PowerDomain::Voc,
                shutdown: ShutdownMode::AlwaysOn,
                background: Some(millis(VOC_SAMPLE_PERIOD_MS)),
                ..base
            },
            _ => base,
        }
    }

    /// Override the owning domain
    pub const fn with_domain(mut self, domain: PowerDomain) -> Self {
        self.domain = domain;
        self
    }

    /// Override the shutdown behaviour
    pub const fn with_shutdown(mut self, shutdown: ShutdownMode) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Override the warm-up
    pub const fn with_warm_up(mut self, warm_up: Millis) -> Self {
        self.warm_up = warm_up;
        self
    }

    /// Override the read bound
    pub const fn with_read_timeout(mut self, timeout: Millis) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Override the poll interval
    pub const fn with_poll_interval(mut self, interval: Millis) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sample in the background at `period`
    pub const fn with_background(mut self, period: Millis) -> Self {
        self.background = Some(period);
        self.shutdown = ShutdownMode::AlwaysOn;
        self
    }

    /// Whether the module needs `domain` to be on to be accessed
    pub fn depends_on(&self, domain: PowerDomain) -> bool {
        domain == PowerDomain::Bus || domain == self.domain
    }
}

/// Set of sensor kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorSet(u8);

impl SensorSet {
    /// No kinds
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Membership test
    pub const fn contains(self, kind: SensorKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Add a kind
    pub fn insert(&mut self, kind: SensorKind) {
        self.0 |= kind.bit();
    }

    /// Remove a kind
    pub fn remove(&mut self, kind: SensorKind) {
        self.0 &= !kind.bit();
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Number of kinds
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// True when empty
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Kinds in read order
    pub fn iter(self) -> impl Iterator<Item = SensorKind> {
        SensorKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl FromIterator<SensorKind> for SensorSet {
    fn from_iter<I: IntoIterator<Item = SensorKind>>(iter: I) -> Self {
        let mut set = Self::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

/// Sensors detected by the boot scan
///
/// Built once by [`SensorBank::scan`] and never changed afterwards; there is
/// no hot-plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorPresence(SensorSet);

impl SensorPresence {
    /// Whether `kind` was detected
    pub const fn contains(self, kind: SensorKind) -> bool {
        self.0.contains(kind)
    }

    /// Detected kinds in read order
    pub fn iter(self) -> impl Iterator<Item = SensorKind> {
        self.0.iter()
    }

    /// Number of detected sensors
    pub const fn len(self) -> usize {
        self.0.len()
    }

    /// True when nothing was detected
    pub const fn is_empty(self) -> bool {
        self.0.is_empty()
    }

    /// Underlying set
    pub const fn as_set(self) -> SensorSet {
        self.0
    }
}

/// Latest value per quantity, used for the display and air status
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Readings {
    values: [Option<f32>; Quantity::COUNT],
}

impl Readings {
    /// Nothing read yet
    pub const fn new() -> Self {
        Self {
            values: [None; Quantity::COUNT],
        }
    }

    /// Latest value of `quantity`
    pub fn get(&self, quantity: Quantity) -> Option<f32> {
        self.values[quantity as usize]
    }

    /// Store one value
    pub fn set(&mut self, quantity: Quantity, value: f32) {
        self.values[quantity as usize] = Some(value);
    }

    /// Store every sample of a reading
    pub fn update(&mut self, reading: &[Sample]) {
        for sample in reading {
            self.set(sample.quantity, sample.value);
        }
    }
}

pub(crate) struct SensorSlot<'a> {
    pub(crate) config: SensorConfig,
    pub(crate) driver: &'a mut dyn SensorDriver,
}

/// Registered sensors, kept in read order
pub struct SensorBank<'a> {
    slots: Vec<SensorSlot<'a>, MAX_SENSORS>,
    presence: Option<SensorPresence>,
}

impl<'a> SensorBank<'a> {
    /// Empty bank
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            presence: None,
        }
    }

    /// Add a driver; one per kind
    pub fn register(
        &mut self,
        config: SensorConfig,
        driver: &'a mut dyn SensorDriver,
    ) -> Result<(), SensorError> {
        if self.presence.is_some() || self.slots.iter().any(|s| s.config.kind == config.kind) {
            return Err(SensorError::BankFull);
        }

        let position = self
            .slots
            .iter()
            .position(|s| s.config.kind > config.kind)
            .unwrap_or(self.slots.len());
        self.slots
            .insert(position, SensorSlot { config, driver })
            .map_err(|_| SensorError::BankFull)
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, config: SensorConfig, driver: &'a mut dyn SensorDriver) -> Self {
        if let Err(e) = self.register(config, driver) {
            log_warn!("sensor {} not registered: {}", config.kind.name(), e);
        }
        self
    }

    /// Probe every registered sensor once and fix the presence set
    ///
    /// `probe` is called with each driver and returns whether it answered.
    /// A second call returns the set from the first without probing again.
    pub fn scan<F>(&mut self, mut probe: F) -> SensorPresence
    where
        F: FnMut(&SensorConfig, &mut dyn SensorDriver) -> bool,
    {
        if let Some(presence) = self.presence {
            return presence;
        }

        let mut found = SensorSet::empty();
        for slot in self.slots.iter_mut() {
            if probe(&slot.config, &mut *slot.driver) {
                log_info!("found {}", slot.config.kind.name());
                found.insert(slot.config.kind);
            } else {
                log_warn!("{} did not answer, treating as absent", slot.config.kind.name());
            }
        }

        let presence = SensorPresence(found);
        self.presence = Some(presence);
        presence
    }

    /// Presence set; empty before the scan
    pub fn presence(&self) -> SensorPresence {
        self.presence.unwrap_or_default()
    }

    /// Configs of detected sensors in read order
    pub fn present(&self) -> Configs<'_, 'a> {
        Configs {
            slots: self.slots.iter(),
            only: Some(self.presence()),
        }
    }

    /// Configs of every registered sensor, detected or not
    pub fn registered(&self) -> Configs<'_, 'a> {
        Configs {
            slots: self.slots.iter(),
            only: None,
        }
    }

    /// Number of registered slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn slot_mut(&mut self, kind: SensorKind) -> Option<&mut SensorSlot<'a>> {
        let presence = self.presence();
        if !presence.contains(kind) {
            return None;
        }
        self.slots.iter_mut().find(|s| s.config.kind == kind)
    }

    pub(crate) fn config(&self, kind: SensorKind) -> Option<SensorConfig> {
        self.present().find(|c| c.kind == kind).copied()
    }
}

/// Iterator over bank configs, see [`SensorBank::present`]
pub struct Configs<'s, 'a> {
    slots: core::slice::Iter<'s, SensorSlot<'a>>,
    only: Option<SensorPresence>,
}

impl<'s> Iterator for Configs<'s, '_> {
    type Item = &'s SensorConfig;

    fn next(&mut self) -> Option<Self::Item> {
        let only = self.only;
        self.slots
            .by_ref()
            .map(|slot| &slot.config)
            .find(|config| only.map_or(true, |presence| presence.contains(config.kind)))
    }
}

impl Default for SensorBank<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        answers: bool,
    }

    impl SensorDriver for Fixed {
        fn probe(&mut self) -> bool {
            self.answers
        }
        fn wake(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
        fn read(&mut self) -> nb::Result<Reading, SensorError> {
            Err(nb::Error::WouldBlock)
        }
        fn sleep(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
        fn value(&self, _quantity: Quantity) -> Option<f32> {
            None
        }
    }

    #[test]
    fn defaults_follow_module_needs() {
        let co2 = SensorConfig::new(SensorKind::Co2);
        assert_eq!(co2.domain, PowerDomain::GasParticulate);
        assert_eq!(co2.read_timeout.ticks(), 20_000);

        let pm = SensorConfig::new(SensorKind::Particulate);
        assert_eq!(pm.shutdown, ShutdownMode::DomainCut);
        assert_eq!(pm.warm_up.ticks(), 30_000);

        let voc = SensorConfig::new(SensorKind::Voc);
        assert_eq!(voc.shutdown, ShutdownMode::AlwaysOn);
        assert!(voc.background.is_some());

        assert!(pm.depends_on(PowerDomain::Bus));
        assert!(pm.depends_on(PowerDomain::GasParticulate));
        assert!(!pm.depends_on(PowerDomain::Voc));
    }

    #[test]
    fn bank_keeps_read_order_and_rejects_duplicates() {
        let mut voc = Fixed { answers: true };
        let mut temp = Fixed { answers: true };
        let mut temp_again = Fixed { answers: true };

        let mut bank = SensorBank::new();
        bank.register(SensorConfig::new(SensorKind::Voc), &mut voc).unwrap();
        bank.register(SensorConfig::new(SensorKind::TempHumidity), &mut temp).unwrap();
        assert_eq!(
            bank.register(SensorConfig::new(SensorKind::TempHumidity), &mut temp_again),
            Err(SensorError::BankFull)
        );

        let presence = bank.scan(|_, driver| driver.probe());
        let order: Vec<SensorKind, 8> = presence.iter().collect();
        assert_eq!(order.as_slice(), &[SensorKind::TempHumidity, SensorKind::Voc]);
    }

    #[test]
    fn presence_is_fixed_after_scan() {
        let mut light = Fixed { answers: false };
        let mut co2 = Fixed { answers: true };

        let mut bank = SensorBank::new()
            .with(SensorConfig::new(SensorKind::Light), &mut light)
            .with(SensorConfig::new(SensorKind::Co2), &mut co2);

        let first = bank.scan(|_, driver| driver.probe());
        assert!(first.contains(SensorKind::Co2));
        assert!(!first.contains(SensorKind::Light));

        let second = bank.scan(|_, _| true);
        assert_eq!(first, second);
        assert!(bank.slot_mut(SensorKind::Light).is_none());
        assert_eq!(bank.present().count(), 1);
    }

    #[test]
    fn configs_filter_on_presence() {
        let mut light = Fixed { answers: false };
        let mut co2 = Fixed { answers: true };
        let mut voc = Fixed { answers: true };

        let mut bank = SensorBank::new()
            .with(SensorConfig::new(SensorKind::Voc), &mut voc)
            .with(SensorConfig::new(SensorKind::Light), &mut light)
            .with(SensorConfig::new(SensorKind::Co2), &mut co2);
        assert_eq!(bank.present().count(), 0);
        assert_eq!(bank.registered().count(), 3);

        bank.scan(|_, driver| driver.probe());
        let present: Vec<SensorKind, 8> = bank.present().map(|c| c.kind).collect();
        assert_eq!(present.as_slice(), &[SensorKind::Co2, SensorKind::Voc]);
        let registered: Vec<SensorKind, 8> = bank.registered().map(|c| c.kind).collect();
        assert_eq!(
            registered.as_slice(),
            &[SensorKind::Light, SensorKind::Co2, SensorKind::Voc]
        );
        assert_eq!(bank.config(SensorKind::Light), None);
    }

    #[test]
    fn readings_track_latest() {
        let mut readings = Readings::new();
        readings.update(&[Sample::new(Quantity::Co2, 640.0), Sample::new(Quantity::Temperature, 21.5)]);
        readings.set(Quantity::Co2, 700.0);

        assert_eq!(readings.get(Quantity::Co2), Some(700.0));
        assert_eq!(readings.get(Quantity::Temperature), Some(21.5));
        assert_eq!(readings.get(Quantity::Pm10), None);
    }
}
