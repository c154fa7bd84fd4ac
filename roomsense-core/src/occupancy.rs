//! Room occupancy
//!
//! Only two writers touch this state: the motion interrupt and the
//! occupancy timeout. Both use single atomic operations, so the dispatcher
//! can read it at any time without locking.
//!
//! ```text
//!            motion (post Motion)
//!   ┌──────────┐ ───────────────▶ ┌──────────┐
//!   │  empty   │                  │ occupied │ ◀─┐ motion: restart timeout
//!   └──────────┘ ◀─────────────── └──────────┘ ──┘
//!            timeout (post RoomEmpty)
//! ```
//!
//! The interrupt cannot touch timers, so it only leaves an activity mark.
//! The main loop consumes the mark before checking expiries and restarts
//! the timeout from there.

use core::sync::atomic::{AtomicBool, Ordering};

/// Interrupt-shared occupancy flag
#[derive(Debug)]
pub struct Occupancy {
    occupied: AtomicBool,
    activity: AtomicBool,
}

impl Occupancy {
    /// Nodes boot assuming someone is in the room
    pub const fn new() -> Self {
        Self {
            occupied: AtomicBool::new(true),
            activity: AtomicBool::new(false),
        }
    }

    /// Motion interrupt; true when the room was empty until now
    pub fn on_motion(&self) -> bool {
        self.activity.store(true, Ordering::Release);
        !self.occupied.swap(true, Ordering::AcqRel)
    }

    /// Timeout elapsed; true when the room was occupied until now
    ///
    /// Ignored while a motion mark is still unconsumed.
    pub fn on_timeout(&self) -> bool {
        if self.activity.load(Ordering::Acquire) {
            return false;
        }
        self.occupied.swap(false, Ordering::AcqRel)
    }

    /// Consume the activity mark left by the interrupt
    pub fn take_activity(&self) -> bool {
        self.activity.swap(false, Ordering::AcqRel)
    }

    /// Current state
    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }
}

impl Default for Occupancy {
    fn default() -> Self {
        Self::new()
    }
}
