//! Radio link contract and completion mailbox
//!
//! The MAC layer is a black box. The node asks it to join and to send;
//! results come back later through the radio interrupt, which drops them in
//! a [`RadioMailbox`] and posts the matching event bit.
//!
//! ```text
//!  Node ── send(frame, confirm) ──▶ RadioLink ── Accepted | Busy | TooLarge
//!                                       │
//!                               (airtime, RX windows)
//!                                       │
//!  radio ISR ── store outcome ──▶ RadioMailbox ── post TxFinished ──▶ dispatcher
//! ```

use core::cell::RefCell;
use core::sync::atomic::{AtomicU8, Ordering};

use critical_section::Mutex;
use heapless::Vec;

use crate::constants::MAX_DOWNLINK;
use crate::datarate::{RateIndex, Region};
use crate::errors::RadioError;

/// Immediate answer to a send request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendStatus {
    /// Queued; completion arrives later
    Accepted,
    /// Previous frame still in flight
    Busy,
    /// Frame exceeds the current rate's ceiling
    TooLarge,
}

/// LoRaWAN-style MAC
pub trait RadioLink {
    /// Whether a network session exists
    fn is_joined(&self) -> bool;

    /// Start a join; completion arrives as a join-finished event
    fn join(&mut self) -> Result<(), RadioError>;

    /// Queue an uplink
    fn send(&mut self, payload: &[u8], confirm: bool) -> SendStatus;

    /// Regional plan in use
    fn region(&self) -> Region;

    /// Whether the caller picks the data rate
    fn rate_selectable(&self) -> bool {
        false
    }

    /// Select the data rate for the next uplink
    fn set_rate(&mut self, _rate: RateIndex) -> Result<(), RadioError> {
        Ok(())
    }

    /// MAC-level check that `len` bytes fit at `rate`
    fn rate_feasible(&self, _rate: RateIndex, _len: usize) -> bool {
        true
    }
}

/// Received downlink
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Downlink {
    /// Application port
    pub port: u8,
    /// Payload
    pub data: Vec<u8, MAX_DOWNLINK>,
}

/// Commands carried by downlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DownlinkCommand {
    /// New uplink interval in seconds
    SendInterval(u32),
}

impl DownlinkCommand {
    /// Port carrying configuration downlinks
    pub const PORT: u8 = 3;

    const MAGIC: [u8; 2] = [0xAA, 0x55];

    /// Decode a configuration downlink
    ///
    /// `AA 55 b0 b1 b2 b3` on port 3 sets the interval to the big-endian
    /// seconds value.
    pub fn parse(downlink: &Downlink) -> Option<Self> {
        if downlink.port != Self::PORT {
            return None;
        }
        match downlink.data.as_slice() {
            [m0, m1, b0, b1, b2, b3] if [*m0, *m1] == Self::MAGIC => {
                Some(Self::SendInterval(u32::from_be_bytes([*b0, *b1, *b2, *b3])))
            }
            _ => None,
        }
    }
}

const EMPTY: u8 = 0;
const SUCCESS: u8 = 1;
const FAILURE: u8 = 2;

/// Uplink completions collected since the last take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxCompletions {
    /// Uplinks delivered
    pub delivered: u8,
    /// Uplinks that failed
    pub failed: u8,
}

/// Outcomes left by the radio interrupt for the dispatcher
///
/// Join outcomes keep only the latest; uplink completions are counted so a
/// failure is never lost when two land between dispatch passes.
pub struct RadioMailbox {
    join: AtomicU8,
    tx_delivered: AtomicU8,
    tx_failed: AtomicU8,
    rx: Mutex<RefCell<Option<Downlink>>>,
}

impl RadioMailbox {
    /// Nothing pending
    pub const fn new() -> Self {
        Self {
            join: AtomicU8::new(EMPTY),
            tx_delivered: AtomicU8::new(0),
            tx_failed: AtomicU8::new(0),
            rx: Mutex::new(RefCell::new(None)),
        }
    }

    /// Interrupt side: join finished
    pub fn store_join(&self, success: bool) {
        self.join.store(if success { SUCCESS } else { FAILURE }, Ordering::Release);
    }

    /// Interrupt side: uplink finished
    pub fn store_tx(&self, success: bool) {
        let counter = if success { &self.tx_delivered } else { &self.tx_failed };
        // Closure never declines, so this cannot fail
        let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            Some(n.saturating_add(1))
        });
    }

    /// Interrupt side: downlink arrived; an unread one is replaced
    ///
    /// Payloads longer than the mailbox are truncated.
    pub fn store_rx(&self, port: u8, data: &[u8]) {
        let keep = data.len().min(MAX_DOWNLINK);
        let mut buffer = Vec::new();
        // Length clamped to capacity
        let _ = buffer.extend_from_slice(&data[..keep]);
        critical_section::with(|cs| {
            self.rx.borrow_ref_mut(cs).replace(Downlink { port, data: buffer });
        });
    }

    /// Dispatcher side: take the join outcome
    pub fn take_join(&self) -> Option<bool> {
        decode(self.join.swap(EMPTY, Ordering::AcqRel))
    }

    /// Dispatcher side: take the uplink completions
    pub fn take_tx(&self) -> Option<TxCompletions> {
        let done = TxCompletions {
            delivered: self.tx_delivered.swap(0, Ordering::AcqRel),
            failed: self.tx_failed.swap(0, Ordering::AcqRel),
        };
        (done != TxCompletions::default()).then_some(done)
    }

    /// Dispatcher side: take the downlink
    pub fn take_rx(&self) -> Option<Downlink> {
        critical_section::with(|cs| self.rx.borrow_ref_mut(cs).take())
    }
}

impl Default for RadioMailbox {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(raw: u8) -> Option<bool> {
    match raw {
        SUCCESS => Some(true),
        FAILURE => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downlink(port: u8, bytes: &[u8]) -> Downlink {
        Downlink {
            port,
            data: Vec::from_slice(bytes).unwrap(),
        }
    }

    #[test]
    fn parses_interval_command() {
        let dl = downlink(3, &[0xAA, 0x55, 0x00, 0x00, 0x02, 0x58]);
        assert_eq!(DownlinkCommand::parse(&dl), Some(DownlinkCommand::SendInterval(600)));
    }

    #[test]
    fn ignores_other_ports_and_shapes() {
        assert_eq!(DownlinkCommand::parse(&downlink(2, &[0xAA, 0x55, 0, 0, 0, 60])), None);
        assert_eq!(DownlinkCommand::parse(&downlink(3, &[0xAB, 0x55, 0, 0, 0, 60])), None);
        assert_eq!(DownlinkCommand::parse(&downlink(3, &[0xAA, 0x55, 0, 60])), None);
    }

    #[test]
    fn mailbox_outcomes_are_taken_once() {
        let mailbox = RadioMailbox::new();
        assert_eq!(mailbox.take_join(), None);

        mailbox.store_join(false);
        mailbox.store_tx(true);
        assert_eq!(mailbox.take_join(), Some(false));
        assert_eq!(mailbox.take_join(), None);
        assert_eq!(
            mailbox.take_tx(),
            Some(TxCompletions {
                delivered: 1,
                failed: 0
            })
        );
        assert_eq!(mailbox.take_tx(), None);
    }

    #[test]
    fn uplink_failures_accumulate_until_taken() {
        let mailbox = RadioMailbox::new();
        mailbox.store_tx(false);
        mailbox.store_tx(true);
        mailbox.store_tx(false);

        assert_eq!(
            mailbox.take_tx(),
            Some(TxCompletions {
                delivered: 1,
                failed: 2
            })
        );
    }

    #[test]
    fn newer_downlink_replaces_unread() {
        let mailbox = RadioMailbox::new();
        mailbox.store_rx(2, &[1, 2, 3]);
        mailbox.store_rx(3, &[0xAA; 80]);

        let dl = mailbox.take_rx().unwrap();
        assert_eq!(dl.port, 3);
        assert_eq!(dl.data.len(), MAX_DOWNLINK);
        assert!(mailbox.take_rx().is_none());
    }
}
