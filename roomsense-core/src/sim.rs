//! Simulated collaborators for host runs and tests
//!
//! Every simulated part is a cheap handle over shared state, so a test can
//! keep one clone for assertions while the node owns a reference to another.
//! Sensors and the display check the simulated rails on every access and
//! record a violation instead of failing silently, which is how the tests
//! prove that nothing touches an unpowered domain.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;

use crate::at::{Diagnostic, Diagnostics};
use crate::datarate::{RateIndex, Region};
use crate::dispatcher::ResetCause;
use crate::errors::{PowerError, RadioError, SensorError};
use crate::indicator::{Color, Display, DisplayState, Indicator};
use crate::node::Node;
use crate::power::{BatteryMonitor, PowerDomain, RailControl};
use crate::radio::{RadioLink, SendStatus};
use crate::sensor::{Quantity, Reading, Readings, Sample, SensorDriver};
use crate::time::{Clock, Timestamp};

const NANOS_PER_MS: u64 = 1_000_000;

/// Manually advanced clock; delays advance it
#[derive(Debug, Default)]
pub struct SimClock {
    nanos: Cell<u64>,
}

impl SimClock {
    /// Clock at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Milliseconds since start
    pub fn now(&self) -> Timestamp {
        self.nanos.get() / NANOS_PER_MS
    }

    /// Move forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.nanos.set(self.nanos.get().saturating_add(ms * NANOS_PER_MS));
    }

    /// Move forward to `ms`; never goes back
    pub fn advance_to(&self, ms: Timestamp) {
        let target = ms.saturating_mul(NANOS_PER_MS);
        if target > self.nanos.get() {
            self.nanos.set(target);
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        SimClock::now(self)
    }
}

impl DelayNs for &SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.nanos.set(self.nanos.get().saturating_add(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(u64::from(ms));
    }
}

#[derive(Debug, Default)]
struct BoardState {
    rails: [bool; PowerDomain::COUNT],
    failing: [bool; PowerDomain::COUNT],
    trace: Vec<(PowerDomain, bool)>,
    violations: Vec<String>,
}

/// Simulated power rails plus an access-violation log
#[derive(Debug, Clone, Default)]
pub struct SimBoard {
    state: Rc<RefCell<BoardState>>,
}

impl SimBoard {
    /// Every rail off
    pub fn new() -> Self {
        Self::default()
    }

    /// Rail switch handle for a [`crate::power::PowerSequencer`]
    pub fn rails(&self) -> SimRails {
        SimRails { board: self.clone() }
    }

    /// Whether a rail is on
    pub fn rail(&self, domain: PowerDomain) -> bool {
        self.state.borrow().rails[domain as usize]
    }

    /// Make every switch of `domain` fail
    pub fn fail_rail(&self, domain: PowerDomain) {
        self.state.borrow_mut().failing[domain as usize] = true;
    }

    /// Every successful switch in order
    pub fn trace(&self) -> Vec<(PowerDomain, bool)> {
        self.state.borrow().trace.clone()
    }

    /// Number of times `domain` was switched on
    pub fn enables(&self, domain: PowerDomain) -> usize {
        self.state
            .borrow()
            .trace
            .iter()
            .filter(|&&(d, on)| d == domain && on)
            .count()
    }

    /// Accesses made while a needed rail was off
    pub fn violations(&self) -> Vec<String> {
        self.state.borrow().violations.clone()
    }

    fn require(&self, what: &str, domains: &[PowerDomain]) -> Result<(), PowerDomain> {
        let mut state = self.state.borrow_mut();
        let unpowered = domains.iter().copied().find(|d| !state.rails[*d as usize]);
        match unpowered {
            Some(off) => {
                state.violations.push(format!("{} while {} off", what, off.name()));
                Err(off)
            }
            None => Ok(()),
        }
    }
}

/// [`RailControl`] over a [`SimBoard`]
#[derive(Debug, Clone)]
pub struct SimRails {
    board: SimBoard,
}

impl RailControl for SimRails {
    fn set_rail(&mut self, domain: PowerDomain, on: bool) -> Result<(), PowerError> {
        let mut state = self.board.state.borrow_mut();
        if state.failing[domain as usize] {
            return Err(PowerError::RailFault { domain });
        }
        state.rails[domain as usize] = on;
        state.trace.push((domain, on));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SensorState {
    absent: bool,
    /// Polls before data is ready; `None` never becomes ready
    ready_after: Option<u32>,
    polls_since_wake: u32,
    samples: Reading,
    values: Readings,
    probes: u32,
    wakes: u32,
    polls: u32,
    reads: u32,
    sleeps: u32,
    background: u32,
    calibrations: Vec<u16>,
}

/// Scripted sensor
#[derive(Debug, Clone)]
pub struct SimSensor {
    board: SimBoard,
    domain: PowerDomain,
    state: Rc<RefCell<SensorState>>,
}

impl SimSensor {
    /// Present sensor on `domain` (plus the bus), ready on the first poll
    pub fn new(board: &SimBoard, domain: PowerDomain) -> Self {
        Self {
            board: board.clone(),
            domain,
            state: Rc::new(RefCell::new(SensorState {
                ready_after: Some(0),
                ..SensorState::default()
            })),
        }
    }

    /// Never answers the probe
    pub fn absent(self) -> Self {
        self.state.borrow_mut().absent = true;
        self
    }

    /// Data never becomes ready
    pub fn never_ready(self) -> Self {
        self.state.borrow_mut().ready_after = None;
        self
    }

    /// Data ready after `polls` not-ready answers
    pub fn ready_after(self, polls: u32) -> Self {
        self.state.borrow_mut().ready_after = Some(polls);
        self
    }

    /// Add a value to every reading; extras beyond the reading capacity are dropped
    pub fn with_sample(self, quantity: Quantity, value: f32) -> Self {
        self.set_sample(quantity, value);
        self
    }

    /// Change or add a value for later readings
    pub fn set_sample(&self, quantity: Quantity, value: f32) {
        let mut state = self.state.borrow_mut();
        match state.samples.iter().position(|s| s.quantity == quantity) {
            Some(i) => state.samples[i].value = value,
            None => {
                let _ = state.samples.push(Sample::new(quantity, value));
            }
        }
        state.values.set(quantity, value);
    }

    /// Probe calls
    pub fn probes(&self) -> u32 {
        self.state.borrow().probes
    }

    /// Wake calls
    pub fn wakes(&self) -> u32 {
        self.state.borrow().wakes
    }

    /// Read polls, ready or not
    pub fn polls(&self) -> u32 {
        self.state.borrow().polls
    }

    /// Reads that returned data
    pub fn reads(&self) -> u32 {
        self.state.borrow().reads
    }

    /// Sleep calls
    pub fn sleeps(&self) -> u32 {
        self.state.borrow().sleeps
    }

    /// Background sample calls
    pub fn background_samples(&self) -> u32 {
        self.state.borrow().background
    }

    /// Calibration references received
    pub fn calibrations(&self) -> Vec<u16> {
        self.state.borrow().calibrations.clone()
    }

    fn powered(&self, what: &str) -> Result<(), SensorError> {
        self.board
            .require(what, &[PowerDomain::Bus, self.domain])
            .map_err(|domain| SensorError::DomainOff { domain })
    }
}

impl SensorDriver for SimSensor {
    fn probe(&mut self) -> bool {
        self.state.borrow_mut().probes += 1;
        self.powered("probe").is_ok() && !self.state.borrow().absent
    }

    fn wake(&mut self) -> Result<(), SensorError> {
        self.powered("wake")?;
        let mut state = self.state.borrow_mut();
        state.wakes += 1;
        state.polls_since_wake = 0;
        Ok(())
    }

    fn read(&mut self) -> nb::Result<Reading, SensorError> {
        self.powered("read")?;
        let mut state = self.state.borrow_mut();
        state.polls += 1;

        let Some(ready_after) = state.ready_after else {
            return Err(nb::Error::WouldBlock);
        };
        if state.polls_since_wake < ready_after {
            state.polls_since_wake += 1;
            return Err(nb::Error::WouldBlock);
        }

        state.reads += 1;
        let reading = state.samples.clone();
        state.values.update(&reading);
        Ok(reading)
    }

    fn sleep(&mut self) -> Result<(), SensorError> {
        self.powered("sleep")?;
        self.state.borrow_mut().sleeps += 1;
        Ok(())
    }

    fn value(&self, quantity: Quantity) -> Option<f32> {
        self.state.borrow().values.get(quantity)
    }

    fn sample(&mut self) -> Result<(), SensorError> {
        self.powered("sample")?;
        self.state.borrow_mut().background += 1;
        Ok(())
    }

    fn calibrate(&mut self, reference: u16) -> Result<(), SensorError> {
        self.powered("calibrate")?;
        self.state.borrow_mut().calibrations.push(reference);
        Ok(())
    }
}

/// One send request seen by the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// Uplink bytes
    pub payload: Vec<u8>,
    /// Acknowledgement requested
    pub confirm: bool,
    /// Rate selected before the send, if any
    pub rate: Option<RateIndex>,
    /// Immediate answer given
    pub status: SendStatus,
}

#[derive(Debug)]
struct RadioState {
    joined: bool,
    region: Region,
    rate_selectable: bool,
    infeasible: Vec<RateIndex>,
    statuses: VecDeque<SendStatus>,
    rate: Option<RateIndex>,
    frames: Vec<SentFrame>,
    joins: u32,
    refuse_join: bool,
}

/// Scripted radio link
#[derive(Debug, Clone)]
pub struct SimRadio {
    state: Rc<RefCell<RadioState>>,
}

impl SimRadio {
    /// Not joined, rate chosen by the MAC, every send accepted
    pub fn new(region: Region) -> Self {
        Self {
            state: Rc::new(RefCell::new(RadioState {
                joined: false,
                region,
                rate_selectable: false,
                infeasible: Vec::new(),
                statuses: VecDeque::new(),
                rate: None,
                frames: Vec::new(),
                joins: 0,
                refuse_join: false,
            })),
        }
    }

    /// Start with a session
    pub fn joined(self) -> Self {
        self.set_joined(true);
        self
    }

    /// Caller picks the rate
    pub fn rate_selectable(self) -> Self {
        self.state.borrow_mut().rate_selectable = true;
        self
    }

    /// MAC refuses every join request outright
    pub fn refuse_join(self) -> Self {
        self.state.borrow_mut().refuse_join = true;
        self
    }

    /// MAC refuses `rate` in its feasibility check
    pub fn reject_rate(self, rate: RateIndex) -> Self {
        self.state.borrow_mut().infeasible.push(rate);
        self
    }

    /// Gain or lose the session
    pub fn set_joined(&self, joined: bool) {
        self.state.borrow_mut().joined = joined;
    }

    /// Answer the next send with `status`; unqueued sends are accepted
    pub fn queue_status(&self, status: SendStatus) {
        self.state.borrow_mut().statuses.push_back(status);
    }

    /// Every send request so far
    pub fn frames(&self) -> Vec<SentFrame> {
        self.state.borrow().frames.clone()
    }

    /// Accepted sends so far
    pub fn accepted(&self) -> Vec<SentFrame> {
        self.frames()
            .into_iter()
            .filter(|f| f.status == SendStatus::Accepted)
            .collect()
    }

    /// Join requests so far
    pub fn joins(&self) -> u32 {
        self.state.borrow().joins
    }
}

impl RadioLink for SimRadio {
    fn is_joined(&self) -> bool {
        self.state.borrow().joined
    }

    fn join(&mut self) -> Result<(), RadioError> {
        let mut state = self.state.borrow_mut();
        state.joins += 1;
        if state.refuse_join {
            Err(RadioError::Refused)
        } else {
            Ok(())
        }
    }

    fn send(&mut self, payload: &[u8], confirm: bool) -> SendStatus {
        let mut state = self.state.borrow_mut();
        let status = state.statuses.pop_front().unwrap_or(SendStatus::Accepted);
        let rate = state.rate;
        state.frames.push(SentFrame {
            payload: payload.to_vec(),
            confirm,
            rate,
            status,
        });
        status
    }

    fn region(&self) -> Region {
        self.state.borrow().region
    }

    fn rate_selectable(&self) -> bool {
        self.state.borrow().rate_selectable
    }

    fn set_rate(&mut self, rate: RateIndex) -> Result<(), RadioError> {
        self.state.borrow_mut().rate = Some(rate);
        Ok(())
    }

    fn rate_feasible(&self, rate: RateIndex, _len: usize) -> bool {
        !self.state.borrow().infeasible.contains(&rate)
    }
}

/// Battery with a settable voltage
#[derive(Debug, Clone)]
pub struct SimBattery {
    millivolts: Rc<Cell<u16>>,
}

impl SimBattery {
    /// Battery at `millivolts`; 0 means mains powered
    pub fn new(millivolts: u16) -> Self {
        Self {
            millivolts: Rc::new(Cell::new(millivolts)),
        }
    }

    /// Change the voltage
    pub fn set(&self, millivolts: u16) {
        self.millivolts.set(millivolts);
    }
}

impl BatteryMonitor for SimBattery {
    fn millivolts(&mut self) -> u16 {
        self.millivolts.get()
    }
}

/// LED that remembers every colour shown
#[derive(Debug, Clone, Default)]
pub struct SimIndicator {
    shown: Rc<RefCell<Vec<Color>>>,
}

impl SimIndicator {
    /// Nothing shown yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Colours in order
    pub fn shown(&self) -> Vec<Color> {
        self.shown.borrow().clone()
    }

    /// Latest colour
    pub fn last(&self) -> Option<Color> {
        self.shown.borrow().last().copied()
    }
}

impl Indicator for SimIndicator {
    fn show(&mut self, color: Color) {
        self.shown.borrow_mut().push(color);
    }
}

/// Display that keeps every frame
#[derive(Debug, Clone)]
pub struct SimDisplay {
    board: SimBoard,
    frames: Rc<RefCell<Vec<DisplayState>>>,
}

impl SimDisplay {
    /// Panel powered from the board's display rail
    pub fn new(board: &SimBoard) -> Self {
        Self {
            board: board.clone(),
            frames: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Frames in order
    pub fn frames(&self) -> Vec<DisplayState> {
        self.frames.borrow().clone()
    }

    /// Latest frame
    pub fn last(&self) -> Option<DisplayState> {
        self.frames.borrow().last().copied()
    }
}

impl Display for SimDisplay {
    fn render(&mut self, state: &DisplayState) {
        if self.board.require("render", &[PowerDomain::Display]).is_ok() {
            self.frames.borrow_mut().push(*state);
        }
    }
}

/// Console collecting `+EVT:` lines
#[derive(Debug, Clone, Default)]
pub struct SimConsole {
    lines: Rc<RefCell<Vec<String>>>,
}

impl SimConsole {
    /// Nothing reported yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines in order
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    /// Whether `line` was reported
    pub fn saw(&self, line: &str) -> bool {
        self.lines.borrow().iter().any(|l| l == line)
    }
}

impl Diagnostics for SimConsole {
    fn report(&mut self, diagnostic: &Diagnostic) {
        self.lines.borrow_mut().push(diagnostic.to_string());
    }
}

/// Drive `node` until the clock reaches `until` or a reset is requested
///
/// Sleeps by jumping the clock to the next timer deadline, the same way the
/// firmware idles until the next interrupt.
pub fn run_until(node: &mut Node<'_>, clock: &SimClock, until: Timestamp) -> Option<ResetCause> {
    loop {
        if let Some(cause) = node.poll() {
            return Some(cause);
        }
        if node.has_pending() {
            continue;
        }
        match node.next_wake() {
            Some(due) if due <= until => clock.advance_to(due),
            _ => {
                clock.advance_to(until);
                return None;
            }
        }
    }
}
