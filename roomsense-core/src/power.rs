//! Power rail sequencing
//!
//! ## Domains
//!
//! ```text
//!  Bus ──────────── I2C pull-ups and every bus sensor (settle 100 ms)
//!  Display ──────── e-paper panel
//!  GasParticulate ─ CO2 and particulate modules
//!  Voc ──────────── VOC sensor, runs its own background algorithm
//!  Motion ───────── PIR, stays on in every state
//! ```
//!
//! ## Ownership
//!
//! A rail may be wanted by several parts of the node at once: the
//! measurement cycle needs the bus, so does a display refresh, so does an
//! AT-triggered calibration. Each of them requests the rail under its own
//! [`Requester`] bit. The rail goes on with the first request and off with
//! the last release, so one part finishing never pulls power from another.
//!
//! ## Ordering
//!
//! - Switching the bus rail on waits for the settle delay before returning,
//!   so the caller may start a transaction immediately.
//! - The sequencer never talks to sensors. Before the last release of a
//!   rail, the caller parks the sensors that depend on it (sleep command
//!   while the bus is still up, or nothing for sensors that only support a
//!   hard cut). [`PowerSequencer::would_cut`] tells the caller when that is
//!   needed.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::errors::PowerError;
use crate::time::Millis;

/// Switchable power rail
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerDomain {
    /// Shared data bus and its pull-ups
    Bus = 0,
    /// E-paper display
    Display = 1,
    /// CO2 and particulate modules
    GasParticulate = 2,
    /// VOC sensor
    Voc = 3,
    /// Motion sensor
    Motion = 4,
}

impl PowerDomain {
    /// Number of rails
    pub const COUNT: usize = 5;

    /// Every rail
    pub const ALL: [PowerDomain; PowerDomain::COUNT] = [
        PowerDomain::Bus,
        PowerDomain::Display,
        PowerDomain::GasParticulate,
        PowerDomain::Voc,
        PowerDomain::Motion,
    ];

    /// Short name for logs
    pub const fn name(self) -> &'static str {
        match self {
            PowerDomain::Bus => "bus",
            PowerDomain::Display => "display",
            PowerDomain::GasParticulate => "gas-particulate",
            PowerDomain::Voc => "voc",
            PowerDomain::Motion => "motion",
        }
    }

    /// Whether transactions must wait for the rail to settle after enable
    pub const fn needs_settle(self) -> bool {
        matches!(self, PowerDomain::Bus)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PowerDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Part of the node holding a rail on
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Requester {
    /// Measurement cycle
    Measurement = 0,
    /// Display refresh
    Display = 1,
    /// AT command work such as calibration
    Command = 2,
    /// Background sampling and always-on sensing
    Background = 3,
    /// Mains operation keeps everything up
    Mains = 4,
}

impl Requester {
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Board-level rail switch
pub trait RailControl {
    /// Drive one rail
    fn set_rail(&mut self, domain: PowerDomain, on: bool) -> Result<(), PowerError>;
}

impl<T: RailControl + ?Sized> RailControl for &mut T {
    fn set_rail(&mut self, domain: PowerDomain, on: bool) -> Result<(), PowerError> {
        (**self).set_rail(domain, on)
    }
}

/// Rails driven by GPIO enable pins
///
/// Domains without a pin are treated as hard-wired on; switching them is a
/// no-op.
pub struct PinRails<P> {
    pins: [Option<P>; PowerDomain::COUNT],
}

impl<P: OutputPin> PinRails<P> {
    /// No pins attached
    pub fn new() -> Self {
        Self {
            pins: [None, None, None, None, None],
        }
    }

    /// Attach the enable pin for a domain
    pub fn with(mut self, domain: PowerDomain, pin: P) -> Self {
        self.pins[domain.index()] = Some(pin);
        self
    }
}

impl<P: OutputPin> Default for PinRails<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: OutputPin> RailControl for PinRails<P> {
    fn set_rail(&mut self, domain: PowerDomain, on: bool) -> Result<(), PowerError> {
        let Some(pin) = self.pins[domain.index()].as_mut() else {
            return Ok(());
        };
        let result = if on { pin.set_high() } else { pin.set_low() };
        result.map_err(|_| PowerError::RailFault { domain })
    }
}

/// Battery voltage sense
pub trait BatteryMonitor {
    /// Battery voltage in millivolts; 0 when no battery is fitted
    fn millivolts(&mut self) -> u16;
}

/// Reference-counted rail switching with settle delays
pub struct PowerSequencer<R> {
    rails: R,
    holders: [u8; PowerDomain::COUNT],
    settle: Millis,
}

impl<R: RailControl> PowerSequencer<R> {
    /// Every rail assumed off; nothing is switched until requested
    pub fn new(rails: R, settle: Millis) -> Self {
        Self {
            rails,
            holders: [0; PowerDomain::COUNT],
            settle,
        }
    }

    /// Whether the rail is on
    pub fn is_on(&self, domain: PowerDomain) -> bool {
        self.holders[domain.index()] != 0
    }

    /// Whether `who` currently holds the rail
    pub fn is_held_by(&self, domain: PowerDomain, who: Requester) -> bool {
        self.holders[domain.index()] & who.bit() != 0
    }

    /// Whether releasing `who` would switch the rail off
    pub fn would_cut(&self, domain: PowerDomain, who: Requester) -> bool {
        self.holders[domain.index()] == who.bit()
    }

    /// Error unless the rail is on
    pub fn ensure_on(&self, domain: PowerDomain) -> Result<(), PowerError> {
        if self.is_on(domain) {
            Ok(())
        } else {
            Err(PowerError::Unpowered { domain })
        }
    }

    /// Hold the rail on for `who`; returns whether this call switched it on
    pub fn request<D: DelayNs + ?Sized>(
        &mut self,
        domain: PowerDomain,
        who: Requester,
        delay: &mut D,
    ) -> Result<bool, PowerError> {
        let switched = !self.is_on(domain);
        if switched {
            self.set_domain(domain, true, delay)?;
        }
        self.holders[domain.index()] |= who.bit();
        Ok(switched)
    }

    /// Drop the hold of `who`; returns whether the rail went off
    ///
    /// Dependent sensors must already be parked when this is the last hold.
    pub fn release(&mut self, domain: PowerDomain, who: Requester) -> Result<bool, PowerError> {
        let index = domain.index();
        if self.holders[index] & who.bit() == 0 {
            return Ok(false);
        }

        self.holders[index] &= !who.bit();
        if self.holders[index] != 0 {
            return Ok(false);
        }

        self.rails.set_rail(domain, false)?;
        log_debug!("rail {} off", domain.name());
        Ok(true)
    }

    /// Switch a rail directly, bypassing the hold bookkeeping
    ///
    /// Enabling the bus blocks for the settle delay.
    pub fn set_domain<D: DelayNs + ?Sized>(
        &mut self,
        domain: PowerDomain,
        on: bool,
        delay: &mut D,
    ) -> Result<(), PowerError> {
        self.rails.set_rail(domain, on)?;
        if on {
            log_debug!("rail {} on", domain.name());
            if domain.needs_settle() {
                delay.delay_ms(self.settle.ticks());
            }
        }
        Ok(())
    }

    /// Rail driver
    pub fn rails(&self) -> &R {
        &self.rails
    }
}
