//! Interrupt-side entry points
//!
//! Everything an interrupt may touch lives in [`Shared`], which is `Sync`
//! and usable from a `static`. Each entry point stores at most one value
//! and posts event bits; none of them switch rails, talk to sensors or
//! block.
//!
//! ```ignore
//! static SHARED: Shared = Shared::new();
//!
//! #[interrupt]
//! fn EXTI4() {
//!     SHARED.on_motion();
//! }
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

use crate::events::{Event, EventFlags};
use crate::occupancy::Occupancy;
use crate::radio::RadioMailbox;

/// Button gesture waiting for the display handler
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gesture {
    /// Single click: switch layout
    NextUi = 1,
    /// Four clicks: show the status screen
    StatusScreen = 2,
}

const NO_GESTURE: u8 = 0;

/// State shared between interrupts and the main loop
pub struct Shared {
    /// Pending event bits
    pub flags: EventFlags,
    /// Room occupancy
    pub occupancy: Occupancy,
    /// Radio completions
    pub radio: RadioMailbox,
    gesture: AtomicU8,
}

impl Shared {
    /// Clicks that switch the layout
    pub const CLICKS_NEXT_UI: u8 = 1;
    /// Clicks that show the status screen
    pub const CLICKS_STATUS: u8 = 4;
    /// Clicks that restart the node
    pub const CLICKS_RESET: u8 = 9;

    /// Nothing pending, room occupied
    pub const fn new() -> Self {
        Self {
            flags: EventFlags::new(),
            occupancy: Occupancy::new(),
            radio: RadioMailbox::new(),
            gesture: AtomicU8::new(NO_GESTURE),
        }
    }

    /// Motion sensor edge
    pub fn on_motion(&self) {
        if self.occupancy.on_motion() {
            self.flags.post(Event::Motion);
        }
    }

    /// Completed click sequence; unknown counts are ignored
    pub fn on_button(&self, clicks: u8) {
        match clicks {
            Self::CLICKS_NEXT_UI => self.post_gesture(Gesture::NextUi),
            Self::CLICKS_STATUS => self.post_gesture(Gesture::StatusScreen),
            Self::CLICKS_RESET => self.flags.post(Event::ResetRequest),
            _ => {}
        }
    }

    /// Join attempt finished
    pub fn on_join_finished(&self, success: bool) {
        self.radio.store_join(success);
        self.flags.post(Event::JoinFinished);
    }

    /// Uplink finished
    pub fn on_tx_finished(&self, success: bool) {
        self.radio.store_tx(success);
        self.flags.post(Event::TxFinished);
    }

    /// Downlink received
    pub fn on_rx(&self, port: u8, data: &[u8]) {
        self.radio.store_rx(port, data);
        self.flags.post(Event::RxData);
    }

    /// Dispatcher side: take the pending gesture
    pub fn take_gesture(&self) -> Option<Gesture> {
        match self.gesture.swap(NO_GESTURE, Ordering::AcqRel) {
            1 => Some(Gesture::NextUi),
            2 => Some(Gesture::StatusScreen),
            _ => None,
        }
    }

    fn post_gesture(&self, gesture: Gesture) {
        self.gesture.store(gesture as u8, Ordering::Release);
        self.flags.post(Event::DisplayUpdate);
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventMask;

    #[test]
    fn motion_posts_only_when_room_was_empty() {
        let shared = Shared::new();
        shared.on_motion();
        assert!(shared.flags.pending().is_empty());

        shared.occupancy.take_activity();
        shared.occupancy.on_timeout();
        shared.on_motion();
        assert!(shared.flags.is_pending(Event::Motion));
    }

    #[test]
    fn button_gestures() {
        let shared = Shared::new();

        shared.on_button(4);
        assert!(shared.flags.is_pending(Event::DisplayUpdate));
        assert_eq!(shared.take_gesture(), Some(Gesture::StatusScreen));
        assert_eq!(shared.take_gesture(), None);

        shared.on_button(9);
        assert!(shared.flags.is_pending(Event::ResetRequest));

        shared.flags.clear(Event::ResetRequest);
        shared.flags.clear(Event::DisplayUpdate);
        shared.on_button(3);
        assert_eq!(shared.flags.pending(), EventMask::empty());
    }

    #[test]
    fn radio_completions_store_then_post() {
        let shared = Shared::new();
        shared.on_tx_finished(false);
        shared.on_rx(3, &[0xAA, 0x55]);

        assert!(shared.flags.is_pending(Event::TxFinished));
        assert!(shared.flags.is_pending(Event::RxData));
        assert_eq!(shared.radio.take_tx().map(|done| done.failed), Some(1));
        assert_eq!(shared.radio.take_rx().map(|d| d.port), Some(3));
    }
}
