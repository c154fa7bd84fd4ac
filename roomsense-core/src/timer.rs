//! Countdown timers
//!
//! A fixed set of software timers, one per purpose, driven by
//! [`TimerSet::expire`] from the main loop. Expiry does no work itself; the
//! caller turns each expired id into an event bit, the same thing a
//! hardware timer callback would do.
//!
//! ```text
//!  Cycle ─────── periodic ── CycleStart
//!  WarmUp ────── one-shot ── SendNow
//!  Indicator ─── one-shot ── IndicatorToggle
//!  Occupancy ─── one-shot ── RoomEmpty (via the occupancy state)
//!  DisplayOff ── one-shot ── DisplayOff
//!  VocSample ─── periodic ── VocRequest
//! ```
//!
//! Periodic timers reload from their deadline, not from the time they were
//! noticed, so a late poll does not drift the schedule. If the loop slept
//! through several periods the timer fires once and resynchronises.

use heapless::Vec;

use crate::events::Event;
use crate::time::{deadline, Millis, Timestamp};

/// Timer slots
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    /// Measurement cycle period
    Cycle = 0,
    /// Sensor warm-up before reading
    WarmUp = 1,
    /// Status LED blink step
    Indicator = 2,
    /// No-motion timeout
    Occupancy = 3,
    /// Display rail cut after refresh
    DisplayOff = 4,
    /// Background VOC sampling
    VocSample = 5,
}

impl TimerId {
    /// Number of slots
    pub const COUNT: usize = 6;

    /// Every slot in index order
    pub const ALL: [TimerId; TimerId::COUNT] = [
        TimerId::Cycle,
        TimerId::WarmUp,
        TimerId::Indicator,
        TimerId::Occupancy,
        TimerId::DisplayOff,
        TimerId::VocSample,
    ];

    /// Event this timer raises on expiry
    pub const fn event(self) -> Event {
        match self {
            TimerId::Cycle => Event::CycleStart,
            TimerId::WarmUp => Event::SendNow,
            TimerId::Indicator => Event::IndicatorToggle,
            TimerId::Occupancy => Event::RoomEmpty,
            TimerId::DisplayOff => Event::DisplayOff,
            TimerId::VocSample => Event::VocRequest,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Reload behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerMode {
    /// Fire once, then disarm
    OneShot,
    /// Fire every period until stopped
    Periodic,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    period: Millis,
    mode: TimerMode,
    deadline: Option<Timestamp>,
}

impl Timer {
    const IDLE: Timer = Timer {
        period: Millis::from_ticks(0),
        mode: TimerMode::OneShot,
        deadline: None,
    };
}

/// Expired timers from one [`TimerSet::expire`] call, in id order
pub type Expired = Vec<TimerId, { TimerId::COUNT }>;

/// All node timers
#[derive(Debug, Clone)]
pub struct TimerSet {
    timers: [Timer; TimerId::COUNT],
}

impl TimerSet {
    /// Every timer disarmed, zero period, one-shot
    pub const fn new() -> Self {
        Self {
            timers: [Timer::IDLE; TimerId::COUNT],
        }
    }

    /// Set period and mode without arming
    pub fn configure(&mut self, id: TimerId, period: Millis, mode: TimerMode) {
        let timer = &mut self.timers[id.index()];
        timer.period = period;
        timer.mode = mode;
    }

    /// Arm with the configured period
    pub fn start(&mut self, id: TimerId, now: Timestamp) {
        let timer = &mut self.timers[id.index()];
        timer.deadline = Some(deadline(now, timer.period));
    }

    /// Change the period and re-arm from `now`
    pub fn restart(&mut self, id: TimerId, now: Timestamp, period: Millis) {
        self.timers[id.index()].period = period;
        self.start(id, now);
    }

    /// Change the period used from the next reload on
    pub fn set_period(&mut self, id: TimerId, period: Millis) {
        self.timers[id.index()].period = period;
    }

    /// Disarm
    pub fn stop(&mut self, id: TimerId) {
        self.timers[id.index()].deadline = None;
    }

    /// Whether armed
    pub fn is_running(&self, id: TimerId) -> bool {
        self.timers[id.index()].deadline.is_some()
    }

    /// Configured period
    pub fn period(&self, id: TimerId) -> Millis {
        self.timers[id.index()].period
    }

    /// Next expiry of one timer
    pub fn deadline(&self, id: TimerId) -> Option<Timestamp> {
        self.timers[id.index()].deadline
    }

    /// Earliest expiry across all timers; the loop may sleep until then
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.timers.iter().filter_map(|t| t.deadline).min()
    }

    /// Collect every timer due at `now` and reload or disarm it
    pub fn expire(&mut self, now: Timestamp) -> Expired {
        let mut expired = Expired::new();

        for id in TimerId::ALL {
            let timer = &mut self.timers[id.index()];
            let Some(due) = timer.deadline else { continue };
            if due > now {
                continue;
            }

            timer.deadline = match timer.mode {
                TimerMode::Periodic if timer.period.ticks() > 0 => {
                    let next = deadline(due, timer.period);
                    if next > now {
                        Some(next)
                    } else {
                        Some(deadline(now, timer.period))
                    }
                }
                _ => None,
            };

            // Capacity equals the number of ids
            let _ = expired.push(id);
        }

        expired
    }
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{millis, secs};

    #[test]
    fn one_shot_fires_once() {
        let mut timers = TimerSet::new();
        timers.configure(TimerId::WarmUp, secs(12), TimerMode::OneShot);
        timers.start(TimerId::WarmUp, 1_000);

        assert!(timers.expire(12_999).is_empty());
        assert_eq!(timers.expire(13_000).as_slice(), &[TimerId::WarmUp]);
        assert!(!timers.is_running(TimerId::WarmUp));
        assert!(timers.expire(50_000).is_empty());
    }

    #[test]
    fn periodic_reloads_from_deadline() {
        let mut timers = TimerSet::new();
        timers.configure(TimerId::Cycle, secs(120), TimerMode::Periodic);
        timers.start(TimerId::Cycle, 0);

        assert_eq!(timers.expire(120_050).as_slice(), &[TimerId::Cycle]);
        assert_eq!(timers.deadline(TimerId::Cycle), Some(240_000));
    }

    #[test]
    fn periodic_resyncs_after_long_sleep() {
        let mut timers = TimerSet::new();
        timers.configure(TimerId::VocSample, secs(30), TimerMode::Periodic);
        timers.start(TimerId::VocSample, 0);

        assert_eq!(timers.expire(200_000).len(), 1);
        assert_eq!(timers.deadline(TimerId::VocSample), Some(230_000));
    }

    #[test]
    fn set_period_applies_on_next_reload() {
        let mut timers = TimerSet::new();
        timers.configure(TimerId::Cycle, secs(60), TimerMode::Periodic);
        timers.start(TimerId::Cycle, 0);
        timers.set_period(TimerId::Cycle, secs(120));

        assert_eq!(timers.deadline(TimerId::Cycle), Some(60_000));
        timers.expire(60_000);
        assert_eq!(timers.deadline(TimerId::Cycle), Some(180_000));
    }

    #[test]
    fn zero_period_periodic_disarms() {
        let mut timers = TimerSet::new();
        timers.configure(TimerId::Cycle, millis(0), TimerMode::Periodic);
        timers.start(TimerId::Cycle, 10);

        assert_eq!(timers.expire(10).len(), 1);
        assert!(!timers.is_running(TimerId::Cycle));
    }

    #[test]
    fn next_deadline_is_earliest() {
        let mut timers = TimerSet::new();
        assert_eq!(timers.next_deadline(), None);

        timers.restart(TimerId::Occupancy, 0, secs(600));
        timers.restart(TimerId::Indicator, 0, millis(200));
        assert_eq!(timers.next_deadline(), Some(200));

        timers.stop(TimerId::Indicator);
        assert_eq!(timers.next_deadline(), Some(600_000));
    }

    #[test]
    fn simultaneous_expiry_in_id_order() {
        let mut timers = TimerSet::new();
        timers.restart(TimerId::VocSample, 0, secs(30));
        timers.restart(TimerId::WarmUp, 0, secs(30));

        assert_eq!(
            timers.expire(30_000).as_slice(),
            &[TimerId::WarmUp, TimerId::VocSample]
        );
    }
}
