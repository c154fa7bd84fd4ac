//! Event flags shared between interrupts and the dispatcher
//!
//! ## Overview
//!
//! Interrupt handlers, timer callbacks and event handlers never call each
//! other. They communicate through one word of pending-event bits:
//!
//! ```text
//!  motion ISR ──┐
//!  button ISR ──┤  post()          ┌──────────────┐   pending()   ┌────────────┐
//!  radio ISR  ──┼─────────────────▶│  EventFlags  │──────────────▶│ dispatcher │
//!  timers     ──┤   (fetch_or)     │  AtomicU32   │◀──────────────│  handlers  │
//!  handlers   ──┘                  └──────────────┘   clear()     └────────────┘
//!                                                    (fetch_and)
//! ```
//!
//! Posting is a single atomic OR, so it never blocks and is safe from any
//! interrupt priority. Clearing is a single atomic AND of one bit, so a bit
//! posted while a handler runs is never lost.
//!
//! ## Priority
//!
//! The bit index of an [`Event`] is also its dispatch priority, lowest bit
//! first. Reset comes first, cosmetic display and indicator work next,
//! radio and occupancy bookkeeping after that, and the long-running
//! measurement cycle last.

use core::sync::atomic::{AtomicU32, Ordering};

/// A kind of pending work
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Restart the node
    ResetRequest = 0,
    /// Redraw the display
    DisplayUpdate = 1,
    /// Cut the display rail after a refresh
    DisplayOff = 2,
    /// Blink step for the status LED
    IndicatorToggle = 3,
    /// Motion seen after the room was empty
    Motion = 4,
    /// Occupancy timeout elapsed
    RoomEmpty = 5,
    /// Join attempt completed
    JoinFinished = 6,
    /// Uplink completed
    TxFinished = 7,
    /// Downlink received
    RxData = 8,
    /// Background VOC sample due
    VocRequest = 9,
    /// Start a measurement cycle
    CycleStart = 10,
    /// Warm-up elapsed, read and send
    SendNow = 11,
}

impl Event {
    /// Number of event kinds
    pub const COUNT: usize = 12;

    /// Every event in dispatch order
    pub const ALL: [Event; Event::COUNT] = [
        Event::ResetRequest,
        Event::DisplayUpdate,
        Event::DisplayOff,
        Event::IndicatorToggle,
        Event::Motion,
        Event::RoomEmpty,
        Event::JoinFinished,
        Event::TxFinished,
        Event::RxData,
        Event::VocRequest,
        Event::CycleStart,
        Event::SendNow,
    ];

    /// Bit for this event in an [`EventMask`]
    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Event for a bit index
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    /// Short name for logs
    pub const fn name(self) -> &'static str {
        match self {
            Event::ResetRequest => "reset-request",
            Event::DisplayUpdate => "display-update",
            Event::DisplayOff => "display-off",
            Event::IndicatorToggle => "indicator-toggle",
            Event::Motion => "motion",
            Event::RoomEmpty => "room-empty",
            Event::JoinFinished => "join-finished",
            Event::TxFinished => "tx-finished",
            Event::RxData => "rx-data",
            Event::VocRequest => "voc-request",
            Event::CycleStart => "cycle-start",
            Event::SendNow => "send-now",
        }
    }
}

/// Set of events, densely encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventMask(u32);

impl EventMask {
    const VALID: u32 = (1 << Event::COUNT) - 1;

    /// No events
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every event
    pub const fn all() -> Self {
        Self(Self::VALID)
    }

    /// Mask from raw bits; bits without an event are dropped
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::VALID)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when no event is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of events set
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Membership test
    pub const fn contains(self, event: Event) -> bool {
        self.0 & event.bit() != 0
    }

    /// Add an event
    pub fn insert(&mut self, event: Event) {
        self.0 |= event.bit();
    }

    /// Remove an event
    pub fn remove(&mut self, event: Event) {
        self.0 &= !event.bit();
    }

    /// Events in either mask
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Events in `self` but not `other`
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Events in dispatch order
    pub fn iter(self) -> impl Iterator<Item = Event> {
        Event::ALL.into_iter().filter(move |e| self.contains(*e))
    }
}

impl From<Event> for EventMask {
    fn from(event: Event) -> Self {
        Self(event.bit())
    }
}

impl FromIterator<Event> for EventMask {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        let mut mask = Self::empty();
        for event in iter {
            mask.insert(event);
        }
        mask
    }
}

/// Pending-event register
///
/// Lives in a `static` (or inside one) so interrupt handlers can reach it:
///
/// ```rust
/// use roomsense_core::events::{Event, EventFlags};
///
/// static FLAGS: EventFlags = EventFlags::new();
///
/// // motion interrupt
/// FLAGS.post(Event::Motion);
///
/// // dispatcher
/// assert!(FLAGS.pending().contains(Event::Motion));
/// assert!(FLAGS.clear(Event::Motion));
/// assert!(FLAGS.pending().is_empty());
/// ```
#[derive(Debug)]
pub struct EventFlags {
    bits: AtomicU32,
}

impl EventFlags {
    /// Register with nothing pending
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    /// Mark an event pending; callable from any context
    pub fn post(&self, event: Event) {
        self.bits.fetch_or(event.bit(), Ordering::AcqRel);
    }

    /// Mark several events pending at once
    pub fn post_mask(&self, mask: EventMask) {
        self.bits.fetch_or(mask.bits(), Ordering::AcqRel);
    }

    /// Snapshot of the pending set
    pub fn pending(&self) -> EventMask {
        EventMask::from_bits_truncate(self.bits.load(Ordering::Acquire))
    }

    /// Whether one event is pending
    pub fn is_pending(&self, event: Event) -> bool {
        self.pending().contains(event)
    }

    /// Clear one event; returns whether it was pending
    pub fn clear(&self, event: Event) -> bool {
        let previous = self.bits.fetch_and(!event.bit(), Ordering::AcqRel);
        previous & event.bit() != 0
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}
