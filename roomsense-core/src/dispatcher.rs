//! Cooperative dispatcher
//!
//! One pass per wake from idle:
//!
//! 1. Read the pending mask once.
//! 2. Walk it in priority order. For each event, clear its bit, then run
//!    the handler to completion.
//! 3. Stop early if a handler asks for a reset.
//!
//! Bits posted while a handler runs stay pending for the next pass. A pass
//! therefore never recurses and never starves a lower-priority event behind
//! a handler that keeps re-posting itself.

use crate::events::{Event, EventFlags, EventMask};

/// Why the node is restarting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetCause {
    /// Button gesture or AT command
    UserRequest,
    /// Join failures reached the threshold
    JoinFailures,
    /// Send failures reached the threshold
    SendFailures,
}

/// What the dispatcher should do after a handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Flow {
    /// Keep servicing this pass
    Continue,
    /// Abandon the pass; the caller restarts the device
    Reset(ResetCause),
}

/// Receives events from the dispatcher
pub trait EventHandler {
    /// Service one event; the bit is already cleared
    fn handle(&mut self, event: Event) -> Flow;
}

/// What one pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events handed to the handler this pass
    pub serviced: EventMask,
    /// Set when a handler requested a reset
    pub reset: Option<ResetCause>,
}

/// Run one dispatch pass
pub fn dispatch<H: EventHandler + ?Sized>(flags: &EventFlags, handler: &mut H) -> DispatchReport {
    let snapshot = flags.pending();
    let mut serviced = EventMask::empty();

    for event in snapshot.iter() {
        // Clear first so a re-post from inside the handler survives
        flags.clear(event);
        serviced.insert(event);

        if let Flow::Reset(cause) = handler.handle(event) {
            log_warn!("reset requested while handling {}", event.name());
            return DispatchReport {
                serviced,
                reset: Some(cause),
            };
        }
    }

    DispatchReport {
        serviced,
        reset: None,
    }
}
