//! Common test utilities for node integration tests
//!
//! This module provides:
//! - A test rig owning every simulated collaborator
//! - Sensor fleet presets
//! - Payload and rail assertion helpers

#![allow(dead_code)]

use roomsense_core::{
    config::NodeConfig,
    datarate::Region,
    indicator::{Display, Indicator},
    irq::Shared,
    node::{Node, Peripherals},
    payload::{decode, LppType},
    sensor::{SensorBank, SensorConfig},
    settings::MemoryStore,
    sim::{SimBattery, SimBoard, SimClock, SimConsole, SimDisplay, SimIndicator, SimRadio, SimRails, SimSensor},
};

pub mod scenarios;

/// Healthy battery voltage
pub const BATTERY_MV: u16 = 3_700;

/// Simulated board around one node
///
/// Clock and shared state are leaked so the node can borrow them for its
/// whole life while the test keeps poking them.
pub struct Rig {
    pub shared: &'static Shared,
    pub clock: &'static SimClock,
    delay: &'static SimClock,
    pub board: SimBoard,
    rails: SimRails,
    pub radio: SimRadio,
    pub battery: SimBattery,
    pub store: MemoryStore,
    pub console: SimConsole,
    pub indicator: SimIndicator,
    pub display: SimDisplay,
    pub config: NodeConfig,
    sensors: Vec<(SensorConfig, SimSensor)>,
    headless: bool,
}

impl Rig {
    /// Joined EU868 radio, healthy battery, no sensors
    pub fn new() -> Self {
        let clock: &'static SimClock = Box::leak(Box::new(SimClock::new()));
        let board = SimBoard::new();
        Self {
            shared: Box::leak(Box::new(Shared::new())),
            clock,
            delay: clock,
            rails: board.rails(),
            display: SimDisplay::new(&board),
            board,
            radio: SimRadio::new(Region::Eu868).joined(),
            battery: SimBattery::new(BATTERY_MV),
            store: MemoryStore::new(),
            console: SimConsole::new(),
            indicator: SimIndicator::new(),
            config: NodeConfig::default(),
            sensors: Vec::new(),
            headless: false,
        }
    }

    /// Replace the radio
    pub fn with_radio(mut self, radio: SimRadio) -> Self {
        self.radio = radio;
        self
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the settings store
    pub fn with_store(mut self, store: MemoryStore) -> Self {
        self.store = store;
        self
    }

    /// No LED and no display attached
    pub fn headless(mut self) -> Self {
        self.headless = true;
        self
    }

    /// Register a sensor with default config for its kind; returns a handle
    pub fn add(&mut self, config: SensorConfig) -> SimSensor {
        let sensor = SimSensor::new(&self.board, config.domain);
        self.add_sensor(config, sensor)
    }

    /// Register a scripted sensor; returns a handle
    pub fn add_sensor(&mut self, config: SensorConfig, sensor: SimSensor) -> SimSensor {
        self.sensors.push((config, sensor.clone()));
        sensor
    }

    /// Build the node over every collaborator
    pub fn node(&mut self) -> Node<'_> {
        let mut bank = SensorBank::new();
        for (config, sensor) in self.sensors.iter_mut() {
            bank.register(*config, sensor).expect("sensor registration");
        }

        let indicator: Option<&mut dyn Indicator> = if self.headless {
            None
        } else {
            Some(&mut self.indicator)
        };
        let display: Option<&mut dyn Display> = if self.headless {
            None
        } else {
            Some(&mut self.display)
        };

        let peripherals = Peripherals {
            clock: self.clock,
            delay: &mut self.delay,
            rails: &mut self.rails,
            radio: &mut self.radio,
            battery: &mut self.battery,
            store: &mut self.store,
            console: &mut self.console,
            indicator,
            display,
        };

        Node::new(self.shared, self.config, bank, peripherals)
    }
}

/// Decoded records of a raw frame as (channel, type, value)
pub fn records(bytes: &[u8]) -> Vec<(u8, LppType, f32)> {
    decode(bytes).map(|r| (r.channel, r.kind, r.value)).collect()
}

/// Channels present in a raw frame, in order
pub fn channels(bytes: &[u8]) -> Vec<u8> {
    decode(bytes).map(|r| r.channel).collect()
}

/// Rail accesses made while a needed domain was off
pub fn assert_no_violations(board: &SimBoard) {
    let violations = board.violations();
    assert!(violations.is_empty(), "unpowered access: {:?}", violations);
}
