//! Node orchestrator
//!
//! [`Node`] owns every piece of dispatcher-side state and implements
//! [`EventHandler`] for the whole event set. Interrupts only reach it
//! through [`Shared`].
//!
//! ## Measurement cycle
//!
//! ```text
//!          CycleStart                        SendNow
//!  Idle ─────────────▶ Warming ─────────────────────────▶ Reading
//!   ▲                  rails on, wake,                     bounded read per
//!   │                  arm warm-up                         sensor, read order
//!   │                                                        │
//!  CoolingDown ◀─────── Transmitting ◀────────────────── Packing
//!  park, release,       heartbeat, fit rate,               battery, presence
//!  rearm cycle          send (never waits)
//! ```
//!
//! A sensor that times out or fails is left out of this cycle's payload;
//! the cycle always reaches the send. Completion of the send arrives later
//! as [`Event::TxFinished`].
//!
//! ## Main loop
//!
//! ```ignore
//! let presence = node.boot();
//! loop {
//!     if let Some(cause) = node.poll() {
//!         board.restart(cause);
//!     }
//!     if !node.has_pending() {
//!         board.sleep_until(node.next_wake());
//!     }
//! }
//! ```

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::at::{self, Command, Diagnostic, Diagnostics, Response};
use crate::config::NodeConfig;
use crate::constants::{DEFAULT_SEND_INTERVAL_S, MAX_SENSORS, VOC_SAMPLE_PERIOD_MS};
use crate::datarate::{fit_rate_validated, RateIndex};
use crate::dispatcher::{dispatch, EventHandler, Flow, ResetCause};
use crate::errors::{CommandError, NodeError, NodeResult, SensorError, SettingsError};
use crate::events::Event;
use crate::indicator::{AirStatus, Blinker, Color, Display, DisplayState, Indicator, Screen};
use crate::irq::{Gesture, Shared};
use crate::payload::{channel_for, PayloadBuffer};
use crate::power::{BatteryMonitor, PowerDomain, PowerSequencer, RailControl, Requester};
use crate::radio::{DownlinkCommand, RadioLink, SendStatus};
use crate::reliability::{ReliabilityCounters, Verdict};
use crate::sensor::{
    Quantity, Readings, SensorBank, SensorConfig, SensorKind, SensorPresence, SensorSet,
    ShutdownMode,
};
use crate::settings::{
    validate_co2_reference, validate_send_interval, Settings, SettingsStore, UiMode,
};
use crate::time::{millis, secs, Clock, Millis, Timestamp};
use crate::timer::{TimerId, TimerMode, TimerSet};
use crate::wait::{bounded_wait, wait_for};

/// Measurement cycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleState {
    /// Waiting for the next cycle
    Idle,
    /// Sensors woken, warm-up running
    Warming,
    /// Reading sensors
    Reading,
    /// Appending battery and presence
    Packing,
    /// Handing the frame to the radio
    Transmitting,
    /// Parking sensors and cutting rails
    CoolingDown,
}

impl CycleState {
    /// Name for logs
    pub const fn name(self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::Warming => "warming",
            CycleState::Reading => "reading",
            CycleState::Packing => "packing",
            CycleState::Transmitting => "transmitting",
            CycleState::CoolingDown => "cooling-down",
        }
    }
}

/// Supply detected at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerSource {
    /// Rails are cut between cycles
    Battery,
    /// Every rail stays on
    Mains,
}

impl PowerSource {
    /// Name for logs
    pub const fn name(self) -> &'static str {
        match self {
            PowerSource::Battery => "battery",
            PowerSource::Mains => "mains",
        }
    }
}

/// What became of a cycle's uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxOutcome {
    /// Radio took the frame
    Accepted,
    /// Radio still busy with the previous frame
    Busy,
    /// Radio rejected the frame as too large
    TooLarge,
    /// No rate in the region carries the frame
    NoRate,
    /// No network session; nothing sent
    NotJoined,
}

/// Summary of the last completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    /// Cycle start
    pub started: Timestamp,
    /// Sensors whose values made it into the payload
    pub read: SensorSet,
    /// Present sensors left out this cycle
    pub skipped: SensorSet,
    /// Encoded frame length
    pub payload_len: usize,
    /// Rate chosen by the node, when it chooses
    pub rate: Option<RateIndex>,
    /// Acknowledgement requested
    pub confirmed: bool,
    /// Send result
    pub outcome: TxOutcome,
}

impl CycleReport {
    fn new(started: Timestamp) -> Self {
        Self {
            started,
            read: SensorSet::empty(),
            skipped: SensorSet::empty(),
            payload_len: 0,
            rate: None,
            confirmed: false,
            outcome: TxOutcome::NotJoined,
        }
    }
}

/// Board collaborators handed to the node
pub struct Peripherals<'a> {
    /// Monotonic time
    pub clock: &'a dyn Clock,
    /// Blocking delay for settle times and poll intervals
    pub delay: &'a mut dyn DelayNs,
    /// Rail switches
    pub rails: &'a mut dyn RailControl,
    /// Radio MAC
    pub radio: &'a mut dyn RadioLink,
    /// Battery sense
    pub battery: &'a mut dyn BatteryMonitor,
    /// Settings persistence
    pub store: &'a mut dyn SettingsStore,
    /// `+EVT:` sink
    pub console: &'a mut dyn Diagnostics,
    /// Status LED, if fitted
    pub indicator: Option<&'a mut dyn Indicator>,
    /// E-paper, if fitted
    pub display: Option<&'a mut dyn Display>,
}

/// The sensor node
pub struct Node<'a> {
    shared: &'a Shared,
    clock: &'a dyn Clock,
    delay: &'a mut dyn DelayNs,
    power: PowerSequencer<&'a mut dyn RailControl>,
    sensors: SensorBank<'a>,
    radio: &'a mut dyn RadioLink,
    battery: &'a mut dyn BatteryMonitor,
    store: &'a mut dyn SettingsStore,
    console: &'a mut dyn Diagnostics,
    indicator: Option<&'a mut dyn Indicator>,
    display: Option<&'a mut dyn Display>,

    config: NodeConfig,
    settings: Settings,
    timers: TimerSet,
    reliability: ReliabilityCounters,
    payload: PayloadBuffer,
    readings: Readings,
    blinker: Blinker,

    state: CycleState,
    source: PowerSource,
    awake: SensorSet,
    cycle_anchor: Timestamp,
    joined_once: bool,
    join_pending: bool,
    pending_reset: Option<ResetCause>,
    screen: Screen,
    battery_mv: u16,
    last_rate: Option<RateIndex>,
    last_report: Option<CycleReport>,
}

impl<'a> Node<'a> {
    /// Assemble a node; nothing is switched or probed until [`boot`](Self::boot)
    pub fn new(
        shared: &'a Shared,
        config: NodeConfig,
        sensors: SensorBank<'a>,
        peripherals: Peripherals<'a>,
    ) -> Self {
        let mut timers = TimerSet::new();
        timers.configure(TimerId::Cycle, secs(DEFAULT_SEND_INTERVAL_S), TimerMode::Periodic);
        timers.configure(TimerId::WarmUp, config.min_warm_up, TimerMode::OneShot);
        timers.configure(TimerId::Indicator, config.indicator_period, TimerMode::OneShot);
        timers.configure(TimerId::Occupancy, config.occupancy_timeout, TimerMode::OneShot);
        timers.configure(TimerId::DisplayOff, config.display_off, TimerMode::OneShot);
        timers.configure(TimerId::VocSample, millis(VOC_SAMPLE_PERIOD_MS), TimerMode::Periodic);

        Self {
            shared,
            clock: peripherals.clock,
            delay: peripherals.delay,
            power: PowerSequencer::new(peripherals.rails, config.bus_settle),
            sensors,
            radio: peripherals.radio,
            battery: peripherals.battery,
            store: peripherals.store,
            console: peripherals.console,
            indicator: peripherals.indicator,
            display: peripherals.display,
            config,
            settings: Settings::default(),
            timers,
            reliability: ReliabilityCounters::new(config.failure_threshold, config.heartbeat_period),
            payload: PayloadBuffer::new(),
            readings: Readings::new(),
            blinker: Blinker::new(config.indicator_on, config.indicator_period),
            state: CycleState::Idle,
            source: PowerSource::Battery,
            awake: SensorSet::empty(),
            cycle_anchor: 0,
            joined_once: false,
            join_pending: false,
            pending_reset: None,
            screen: Screen::Measurements,
            battery_mv: 0,
            last_rate: None,
            last_report: None,
        }
    }

    /// Load settings, detect the supply, scan sensors, arm timers and join
    pub fn boot(&mut self) -> SensorPresence {
        self.settings = match self.store.load().and_then(|s| s.validate().map(|()| s)) {
            Ok(settings) => settings,
            Err(e) => {
                log_warn!("settings unusable ({}), using defaults", e);
                Settings::default()
            }
        };
        let region = self.radio.region();
        if region != self.settings.region {
            log_info!("radio runs {}, following it", region.name());
            self.settings.region = region;
        }

        self.battery_mv = self.battery.millivolts();
        self.source = if self.battery_mv < self.config.battery_detect_mv {
            PowerSource::Mains
        } else {
            PowerSource::Battery
        };
        log_info!("boot on {} ({} mV)", self.source.name(), self.battery_mv);

        if self.source == PowerSource::Mains {
            for domain in PowerDomain::ALL {
                self.request(domain, Requester::Mains);
            }
        }
        self.request(PowerDomain::Motion, Requester::Background);
        let scan_domains: Vec<PowerDomain, { PowerDomain::COUNT }> = PowerDomain::ALL
            .into_iter()
            .filter(|&d| d == PowerDomain::Bus || self.sensors.registered().any(|c| c.domain == d))
            .collect();
        for domain in scan_domains {
            self.request(domain, Requester::Measurement);
        }

        let presence = self.scan();
        self.start_background_sensors();

        // Probing may have left sensors running
        self.awake = presence
            .iter()
            .filter(|&k| {
                self.sensors
                    .config(k)
                    .is_some_and(|c| c.shutdown != ShutdownMode::AlwaysOn)
            })
            .collect();
        self.release_all(Requester::Measurement);

        let now = self.clock.now();
        self.cycle_anchor = now;
        self.timers.restart(TimerId::Cycle, now, self.cycle_period());
        self.timers.start(TimerId::Occupancy, now);
        if let Some(period) = self.sensors.present().filter_map(|c| c.background).min() {
            self.timers.restart(TimerId::VocSample, now, period);
        }
        if self.indicator.is_some() {
            self.timers.start(TimerId::Indicator, now);
        }

        if self.radio.is_joined() {
            self.joined_once = true;
            self.post(Event::DisplayUpdate);
            self.post(Event::CycleStart);
        } else if let Flow::Reset(cause) = self.request_join() {
            self.pending_reset = Some(cause);
        }

        presence
    }

    fn scan(&mut self) -> SensorPresence {
        let clock = self.clock;
        let delay = &mut *self.delay;
        let power = &self.power;
        let (timeout, interval) = (self.config.probe_timeout, self.config.probe_interval);

        self.sensors.scan(|config, driver| {
            if !(power.is_on(PowerDomain::Bus) && power.is_on(config.domain)) {
                log_warn!("{} unpowered during scan", config.kind.name());
                return false;
            }
            wait_for(clock, &mut *delay, timeout, interval, || driver.probe())
        })
    }

    fn start_background_sensors(&mut self) {
        let background: Vec<SensorConfig, MAX_SENSORS> = self
            .sensors
            .present()
            .filter(|c| c.shutdown == ShutdownMode::AlwaysOn)
            .copied()
            .collect();

        for config in &background {
            self.request(config.domain, Requester::Background);
        }
        // Only keep the VOC rail when something lives on it
        if !background.iter().any(|c| c.domain == PowerDomain::Voc)
            && self.power.is_held_by(PowerDomain::Voc, Requester::Background)
        {
            self.release(PowerDomain::Voc, Requester::Background);
        }

        for config in &background {
            if !self.powered(config) {
                continue;
            }
            if let Some(slot) = self.sensors.slot_mut(config.kind) {
                if let Err(e) = slot.driver.wake() {
                    log_warn!("{} did not start: {}", config.kind.name(), e);
                }
            }
        }
    }

    /// Turn due timers and occupancy activity into event bits
    pub fn tick(&mut self) {
        let now = self.clock.now();
        if self.shared.occupancy.take_activity() {
            self.timers.start(TimerId::Occupancy, now);
        }

        for id in self.timers.expire(now) {
            match id {
                TimerId::Occupancy => {
                    if self.shared.occupancy.on_timeout() {
                        self.post(Event::RoomEmpty);
                    }
                }
                other => self.post(other.event()),
            }
        }
    }

    /// One main-loop iteration: timers, then a dispatch pass
    ///
    /// Returns the cause when a handler asked for a restart.
    pub fn poll(&mut self) -> Option<ResetCause> {
        if let Some(cause) = self.pending_reset.take() {
            return Some(cause);
        }
        self.tick();
        let shared = self.shared;
        dispatch(&shared.flags, self).reset
    }

    /// Earliest timer deadline; the board may sleep until then
    pub fn next_wake(&self) -> Option<Timestamp> {
        self.timers.next_deadline()
    }

    /// Whether events are waiting for the next pass
    pub fn has_pending(&self) -> bool {
        self.pending_reset.is_some() || !self.shared.flags.pending().is_empty()
    }

    /// Change the uplink interval, persist it and restart the cycle timer
    pub fn set_send_interval(&mut self, seconds: u32) -> Result<(), SettingsError> {
        validate_send_interval(seconds)?;
        self.settings.send_interval_s = seconds;
        self.persist();
        log_info!("send interval now {} s", seconds);

        let now = self.clock.now();
        self.cycle_anchor = now;
        self.timers.restart(TimerId::Cycle, now, self.cycle_period());
        Ok(())
    }

    /// Change the display layout
    pub fn set_ui_mode(&mut self, mode: UiMode) {
        self.settings.ui_mode = mode;
        self.persist();
        self.post(Event::DisplayUpdate);
    }

    /// Change the default acknowledgement
    pub fn set_confirmed(&mut self, confirmed: bool) {
        self.settings.confirmed = confirmed;
        self.persist();
    }

    /// Forced CO2 recalibration against `ppm`
    ///
    /// Only between cycles; powers the module just for the command.
    pub fn calibrate_co2(&mut self, ppm: u16) -> NodeResult<()> {
        validate_co2_reference(ppm)?;
        if self.state != CycleState::Idle {
            return Err(CommandError::Busy.into());
        }
        let config = self
            .sensors
            .config(SensorKind::Co2)
            .ok_or(SensorError::NotPresent)?;

        self.request(PowerDomain::Bus, Requester::Command);
        self.request(config.domain, Requester::Command);
        let result = match self
            .power
            .ensure_on(PowerDomain::Bus)
            .and_then(|()| self.power.ensure_on(config.domain))
        {
            Ok(()) => match self.sensors.slot_mut(SensorKind::Co2) {
                Some(slot) => slot.driver.calibrate(ppm).map_err(NodeError::from),
                None => Err(SensorError::NotPresent.into()),
            },
            Err(e) => Err(e.into()),
        };
        self.release_all(Requester::Command);
        result?;

        log_info!("co2 recalibrated to {} ppm", ppm);
        self.settings.co2_reference_ppm = Some(ppm);
        self.persist();
        Ok(())
    }

    /// Ask for a restart on the next pass
    pub fn request_reset(&self) {
        self.post(Event::ResetRequest);
    }

    /// Apply a parsed console command
    pub fn apply_command(&mut self, command: Command) -> Result<Response, CommandError> {
        match command {
            Command::SetSendInterval(seconds) => self
                .set_send_interval(seconds)
                .map(|()| Response::Ok)
                .map_err(|_| CommandError::Parameter),
            Command::QuerySendInterval => Ok(Response::Number(self.settings.send_interval_s)),
            Command::SetUi(mode) => {
                self.set_ui_mode(mode);
                Ok(Response::Ok)
            }
            Command::QueryUi => Ok(Response::Number(self.settings.ui_mode as u32)),
            Command::QueryModules => Ok(Response::Modules(self.presence())),
            Command::CalibrateCo2(ppm) => self
                .calibrate_co2(ppm)
                .map(|()| Response::Ok)
                .map_err(command_error),
            Command::SetConfirmed(confirmed) => {
                self.set_confirmed(confirmed);
                Ok(Response::Ok)
            }
            Command::QueryConfirmed => Ok(Response::Number(u32::from(self.settings.confirmed))),
            Command::Reset => {
                self.request_reset();
                Ok(Response::Ok)
            }
        }
    }

    /// Parse and apply one console line
    pub fn handle_line(&mut self, line: &str) -> Result<Response, CommandError> {
        let command = at::parse(line)?;
        self.apply_command(command)
    }

    /// Current cycle phase
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Supply detected at boot
    pub fn power_source(&self) -> PowerSource {
        self.source
    }

    /// Battery voltage from the last measurement, mV
    pub fn battery_mv(&self) -> u16 {
        self.battery_mv
    }

    /// Sensors found at boot
    pub fn presence(&self) -> SensorPresence {
        self.sensors.presence()
    }

    /// Settings in effect
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Latest value per quantity
    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    /// Air quality from the latest values
    pub fn air_status(&self) -> AirStatus {
        AirStatus::classify(&self.readings)
    }

    /// Frame of the current or last cycle
    pub fn payload(&self) -> &PayloadBuffer {
        &self.payload
    }

    /// Summary of the last completed cycle
    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    /// Failure counters
    pub fn reliability(&self) -> &ReliabilityCounters {
        &self.reliability
    }

    /// Timer state
    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    /// Whether a rail is on
    pub fn is_powered(&self, domain: PowerDomain) -> bool {
        self.power.is_on(domain)
    }

    /// Screen the display shows next
    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// Cycle period for the current occupancy; doubled while the room is empty
    pub fn cycle_period(&self) -> Millis {
        let nominal = self.settings.send_interval();
        if self.shared.occupancy.is_occupied() {
            nominal
        } else {
            millis(nominal.ticks().saturating_mul(2))
        }
    }

    /// What the display would draw now
    pub fn display_state(&self) -> DisplayState {
        DisplayState {
            screen: self.screen,
            ui: self.settings.ui_mode,
            readings: self.readings,
            air: self.air_status(),
            battery_mv: self.battery_mv,
            occupied: self.shared.occupancy.is_occupied(),
            joined: self.radio.is_joined(),
            last_rate: self.last_rate,
        }
    }

    fn post(&self, event: Event) {
        self.shared.flags.post(event);
    }

    fn set_state(&mut self, next: CycleState) {
        log_debug!("cycle {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.settings) {
            log_error!("settings not saved: {}", e);
        }
    }

    fn powered(&self, config: &SensorConfig) -> bool {
        self.power.is_on(PowerDomain::Bus) && self.power.is_on(config.domain)
    }

    /// Hold a rail; false when it could not be switched on
    fn request(&mut self, domain: PowerDomain, who: Requester) -> bool {
        match self.power.request(domain, who, &mut *self.delay) {
            Ok(_) => true,
            Err(e) => {
                log_error!("rail {}: {}", domain.name(), e);
                false
            }
        }
    }

    /// Drop a hold, parking dependent sensors first when the rail goes off
    fn release(&mut self, domain: PowerDomain, who: Requester) {
        if self.power.would_cut(domain, who) {
            self.park(domain);
        }
        if let Err(e) = self.power.release(domain, who) {
            log_error!("rail {}: {}", domain.name(), e);
        }
    }

    /// Drop every hold of `who`, bus last
    fn release_all(&mut self, who: Requester) {
        for domain in PowerDomain::ALL.into_iter().rev() {
            if self.power.is_held_by(domain, who) {
                self.release(domain, who);
            }
        }
    }

    /// Quiesce awake sensors that depend on `domain` before it is cut
    fn park(&mut self, domain: PowerDomain) {
        let bus_up = self.power.is_on(PowerDomain::Bus);
        for kind in self.awake.iter() {
            let Some(slot) = self.sensors.slot_mut(kind) else {
                continue;
            };
            if !slot.config.depends_on(domain) {
                continue;
            }
            if slot.config.shutdown == ShutdownMode::SleepCommand
                && bus_up
                && self.power.is_on(slot.config.domain)
            {
                if let Err(e) = slot.driver.sleep() {
                    log_warn!("{} did not sleep: {}", kind.name(), e);
                }
            }
            self.awake.remove(kind);
        }
    }

    fn measurement_domains(&self) -> Vec<PowerDomain, { PowerDomain::COUNT }> {
        PowerDomain::ALL
            .into_iter()
            .filter(|&d| {
                d == PowerDomain::Bus
                    || self
                        .sensors
                        .present()
                        .any(|c| c.shutdown != ShutdownMode::AlwaysOn && c.domain == d)
            })
            .collect()
    }

    fn rearm_cycle(&mut self) {
        if self.state == CycleState::Idle {
            let period = self.cycle_period();
            self.timers.restart(TimerId::Cycle, self.cycle_anchor, period);
        }
    }

    fn refresh_display(&mut self) {
        if self.display.is_none() {
            return;
        }
        if self.source == PowerSource::Battery && self.battery_mv < self.config.low_battery_mv {
            log_warn!("battery low ({} mV), display not refreshed", self.battery_mv);
            return;
        }

        let frame = self.display_state();
        if !(self.request(PowerDomain::Bus, Requester::Display)
            && self.request(PowerDomain::Display, Requester::Display))
        {
            self.release_all(Requester::Display);
            return;
        }
        if let Some(display) = self.display.as_deref_mut() {
            display.render(&frame);
        }
        let now = self.clock.now();
        self.timers.start(TimerId::DisplayOff, now);
    }

    fn on_reset_request(&mut self) -> Flow {
        log_warn!("restart requested");
        self.screen = Screen::Goodbye;
        self.refresh_display();
        Flow::Reset(ResetCause::UserRequest)
    }

    fn on_display_update(&mut self) {
        match self.shared.take_gesture() {
            Some(Gesture::NextUi) => {
                self.settings.ui_mode = self.settings.ui_mode.toggled();
                self.persist();
                self.screen = Screen::Measurements;
            }
            Some(Gesture::StatusScreen) => self.screen = Screen::Status,
            None => {}
        }
        self.refresh_display();
    }

    fn on_display_off(&mut self) {
        if self.screen == Screen::Status {
            self.screen = Screen::Measurements;
        }
        self.release_all(Requester::Display);
    }

    fn on_indicator_toggle(&mut self) {
        let air = self.air_status();
        let occupied = self.shared.occupancy.is_occupied();
        let (color, next) = self.blinker.step(air, occupied);
        if let Some(indicator) = self.indicator.as_deref_mut() {
            indicator.show(color);
        }
        let now = self.clock.now();
        self.timers.restart(TimerId::Indicator, now, next);
    }

    fn on_motion(&mut self) {
        log_info!("room occupied");
        self.rearm_cycle();
    }

    fn on_room_empty(&mut self) {
        log_info!("room empty, cycle period doubled");
        self.rearm_cycle();
        if let Some(indicator) = self.indicator.as_deref_mut() {
            indicator.show(Color::Off);
        }
    }

    fn on_join_finished(&mut self) -> Flow {
        let Some(joined) = self.shared.radio.take_join() else {
            return Flow::Continue;
        };
        self.join_pending = false;

        if joined {
            log_info!("joined");
            self.reliability.join_succeeded();
            self.console.report(&Diagnostic::Joined);
            if !self.joined_once {
                self.joined_once = true;
                self.post(Event::DisplayUpdate);
                self.post(Event::CycleStart);
            }
            return Flow::Continue;
        }

        self.console.report(&Diagnostic::JoinFailed);
        match self.reliability.join_failed() {
            Verdict::Reset => {
                log_error!("{} join failures in a row", self.reliability.join_failures());
                Flow::Reset(ResetCause::JoinFailures)
            }
            Verdict::Continue => {
                log_warn!("join failed ({} in a row), retrying", self.reliability.join_failures());
                self.request_join()
            }
        }
    }

    /// Start a join; a refusal counts as a failed attempt
    ///
    /// After a refusal nothing is in flight, so the next cycle tries again.
    fn request_join(&mut self) -> Flow {
        match self.radio.join() {
            Ok(()) => {
                self.join_pending = true;
                Flow::Continue
            }
            Err(e) => {
                log_error!("join request refused: {}", e);
                self.join_pending = false;
                self.console.report(&Diagnostic::JoinFailed);
                match self.reliability.join_failed() {
                    Verdict::Reset => {
                        log_error!("{} join failures in a row", self.reliability.join_failures());
                        Flow::Reset(ResetCause::JoinFailures)
                    }
                    Verdict::Continue => Flow::Continue,
                }
            }
        }
    }

    fn on_tx_finished(&mut self) -> Flow {
        let Some(done) = self.shared.radio.take_tx() else {
            return Flow::Continue;
        };

        // Order within a batch is unknown; failures are applied last
        if done.delivered > 0 {
            self.reliability.send_succeeded();
            self.console.report(&Diagnostic::SendOk);
            self.post(Event::DisplayUpdate);
        }
        for _ in 0..done.failed {
            self.console.report(&Diagnostic::SendFailed);
            if let Flow::Reset(cause) = self.send_failed() {
                return Flow::Reset(cause);
            }
        }
        Flow::Continue
    }

    fn on_rx_data(&mut self) {
        let Some(downlink) = self.shared.radio.take_rx() else {
            return;
        };
        log_info!("downlink on port {} ({} bytes)", downlink.port, downlink.data.len());

        if let Some(DownlinkCommand::SendInterval(seconds)) = DownlinkCommand::parse(&downlink) {
            if let Err(e) = self.set_send_interval(seconds) {
                log_warn!("downlink interval {} s rejected: {}", seconds, e);
            }
        }
        self.console.report(&Diagnostic::Rx(downlink));
    }

    fn on_voc_request(&mut self) {
        let background: Vec<SensorConfig, MAX_SENSORS> = self
            .sensors
            .present()
            .filter(|c| c.background.is_some())
            .copied()
            .collect();
        if background.is_empty() {
            return;
        }

        if self.request(PowerDomain::Bus, Requester::Background) {
            for config in &background {
                if !self.powered(config) {
                    log_warn!("{} unpowered, sample skipped", config.kind.name());
                    continue;
                }
                let Some(slot) = self.sensors.slot_mut(config.kind) else {
                    continue;
                };
                match slot.driver.sample() {
                    Ok(()) => {
                        for quantity in Quantity::ALL {
                            if let Some(value) = slot.driver.value(quantity) {
                                self.readings.set(quantity, value);
                            }
                        }
                    }
                    Err(e) => log_warn!("{} sample failed: {}", config.kind.name(), e),
                }
            }
        }
        self.release(PowerDomain::Bus, Requester::Background);
    }

    fn begin_cycle(&mut self) {
        if self.state != CycleState::Idle {
            log_debug!("cycle start ignored while {}", self.state.name());
            return;
        }

        let now = self.clock.now();
        self.cycle_anchor = now;
        self.payload.clear();
        self.set_state(CycleState::Warming);

        // Sensors on a rail that was off come up uninitialised
        let mut cold: Vec<PowerDomain, { PowerDomain::COUNT }> = Vec::new();
        for domain in self.measurement_domains() {
            if !self.power.is_on(domain) {
                let _ = cold.push(domain);
            }
            self.request(domain, Requester::Measurement);
        }

        let clock = self.clock;
        let (timeout, interval) = (self.config.probe_timeout, self.config.probe_interval);
        let mut warm_up = self.config.min_warm_up;

        for kind in self.sensors.presence().iter() {
            let Some(config) = self.sensors.config(kind) else {
                continue;
            };
            if config.shutdown == ShutdownMode::AlwaysOn {
                continue;
            }
            if !self.powered(&config) {
                log_warn!("{} unpowered, left out this cycle", kind.name());
                continue;
            }
            let Some(slot) = self.sensors.slot_mut(kind) else {
                continue;
            };
            let driver = &mut *slot.driver;

            // A power cut loses module state; wait for it to answer again
            if cold.contains(&config.domain)
                && !wait_for(clock, &mut *self.delay, timeout, interval, || driver.probe())
            {
                log_warn!("{} silent after power-up, left out this cycle", kind.name());
                continue;
            }

            match driver.wake() {
                Ok(()) => {
                    self.awake.insert(kind);
                    if config.warm_up > warm_up {
                        warm_up = config.warm_up;
                    }
                }
                Err(e) => log_warn!("{} did not wake: {}", kind.name(), e),
            }
        }

        self.timers.restart(TimerId::WarmUp, now, warm_up);
    }

    fn complete_cycle(&mut self) -> Flow {
        if self.state != CycleState::Warming {
            log_debug!("send ignored while {}", self.state.name());
            return Flow::Continue;
        }

        let mut report = CycleReport::new(self.cycle_anchor);
        self.set_state(CycleState::Reading);
        self.read_sensors(&mut report);

        self.set_state(CycleState::Packing);
        self.battery_mv = self.battery.millivolts();
        let occupied = self.shared.occupancy.is_occupied();
        if let Err(e) = self.payload.push_battery(self.battery_mv) {
            log_error!("battery record dropped: {}", e);
        }
        if let Err(e) = self.payload.push_presence(occupied) {
            log_error!("presence record dropped: {}", e);
        }
        report.payload_len = self.payload.len();

        self.set_state(CycleState::Transmitting);
        let flow = self.transmit(&mut report);

        self.set_state(CycleState::CoolingDown);
        self.release_all(Requester::Measurement);

        self.set_state(CycleState::Idle);
        let period = self.cycle_period();
        self.timers.restart(TimerId::Cycle, self.cycle_anchor, period);
        self.last_report = Some(report);
        flow
    }

    fn read_sensors(&mut self, report: &mut CycleReport) {
        let clock = self.clock;

        for kind in self.sensors.presence().iter() {
            let Some(config) = self.sensors.config(kind) else {
                continue;
            };
            let always_on = config.shutdown == ShutdownMode::AlwaysOn;
            if !self.powered(&config) || !(always_on || self.awake.contains(kind)) {
                log_warn!("{} not ready, left out", kind.name());
                report.skipped.insert(kind);
                continue;
            }
            let Some(slot) = self.sensors.slot_mut(kind) else {
                continue;
            };
            let driver = &mut *slot.driver;

            let result = bounded_wait(
                clock,
                &mut *self.delay,
                config.read_timeout,
                config.poll_interval,
                || driver.read(),
            )
            .map_err(SensorError::from);

            if config.shutdown == ShutdownMode::SleepCommand {
                if let Err(e) = driver.sleep() {
                    log_warn!("{} did not sleep: {}", kind.name(), e);
                }
                self.awake.remove(kind);
            }

            match result {
                Ok(reading) => {
                    self.readings.update(&reading);
                    for sample in &reading {
                        let Some((channel, lpp)) = channel_for(kind, sample.quantity) else {
                            continue;
                        };
                        if let Err(e) = self.payload.push_sensor(channel, lpp, sample.value) {
                            log_warn!("{} record dropped: {}", kind.name(), e);
                        }
                    }
                    report.read.insert(kind);
                }
                Err(e) => {
                    log_warn!("{} left out: {}", kind.name(), e);
                    report.skipped.insert(kind);
                }
            }
        }
    }

    fn transmit(&mut self, report: &mut CycleReport) -> Flow {
        if !self.radio.is_joined() {
            log_warn!("not joined, uplink skipped");
            report.outcome = TxOutcome::NotJoined;
            if self.join_pending {
                return Flow::Continue;
            }
            return self.request_join();
        }

        let confirm = self.reliability.confirm_next(self.settings.confirmed);
        report.confirmed = confirm;
        let len = self.payload.len();

        if self.radio.rate_selectable() {
            let radio: &dyn RadioLink = &*self.radio;
            match fit_rate_validated(self.settings.region, len, |rate| radio.rate_feasible(rate, len)) {
                Ok(rate) => {
                    if let Err(e) = self.radio.set_rate(rate) {
                        log_warn!("rate {} not applied: {}", rate, e);
                    }
                    report.rate = Some(rate);
                    self.last_rate = Some(rate);
                }
                Err(e) => {
                    log_warn!("uplink of {} bytes not sent: {}", len, e);
                    self.console.report(&Diagnostic::SizeError);
                    report.outcome = TxOutcome::NoRate;
                    return Flow::Continue;
                }
            }
        }

        match self.radio.send(self.payload.as_bytes(), confirm) {
            SendStatus::Accepted => {
                log_info!("uplink queued, {} bytes, confirmed {}", len, confirm);
                self.reliability.uplink_accepted();
                report.outcome = TxOutcome::Accepted;
                Flow::Continue
            }
            SendStatus::Busy => {
                log_warn!("radio busy, uplink skipped");
                self.console.report(&Diagnostic::Busy);
                report.outcome = TxOutcome::Busy;
                self.send_failed()
            }
            SendStatus::TooLarge => {
                log_warn!("radio rejected {} bytes as too large", len);
                self.console.report(&Diagnostic::SizeError);
                report.outcome = TxOutcome::TooLarge;
                self.send_failed()
            }
        }
    }

    fn send_failed(&mut self) -> Flow {
        self.post(Event::DisplayUpdate);
        match self.reliability.send_failed() {
            Verdict::Reset => {
                log_error!("{} send failures in a row", self.reliability.send_failures());
                Flow::Reset(ResetCause::SendFailures)
            }
            Verdict::Continue => Flow::Continue,
        }
    }
}

impl EventHandler for Node<'_> {
    fn handle(&mut self, event: Event) -> Flow {
        log_debug!("event {}", event.name());
        match event {
            Event::ResetRequest => return self.on_reset_request(),
            Event::DisplayUpdate => self.on_display_update(),
            Event::DisplayOff => self.on_display_off(),
            Event::IndicatorToggle => self.on_indicator_toggle(),
            Event::Motion => self.on_motion(),
            Event::RoomEmpty => self.on_room_empty(),
            Event::JoinFinished => return self.on_join_finished(),
            Event::TxFinished => return self.on_tx_finished(),
            Event::RxData => self.on_rx_data(),
            Event::VocRequest => self.on_voc_request(),
            Event::CycleStart => self.begin_cycle(),
            Event::SendNow => return self.complete_cycle(),
        }
        Flow::Continue
    }
}

fn command_error(error: NodeError) -> CommandError {
    match error {
        NodeError::Command(e) => e,
        NodeError::Sensor(SensorError::NotPresent) => CommandError::NotPresent,
        NodeError::Settings(SettingsError::OutOfRange { .. }) => CommandError::Parameter,
        other => {
            log_warn!("command failed: {}", other);
            CommandError::Unknown
        }
    }
}
