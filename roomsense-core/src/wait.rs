//! Bounded waits
//!
//! Every hardware wait in the node goes through [`bounded_wait`]: bus
//! acknowledgement polls, data-ready polls, sensor start-up. The operation
//! is a non-blocking poll in the `nb` style; `WouldBlock` means "ask again",
//! anything else ends the wait.
//!
//! ```text
//!  poll ──Ok──────────────────────────────▶ Ok(value)
//!   │
//!   ├─Other(e)───────────────────────────▶ Err(Failed(e))
//!   │
//!   └─WouldBlock ─ elapsed ≥ timeout? ─yes▶ Err(Timeout)
//!                        │no
//!                  delay(poll interval) ─▶ poll again
//! ```
//!
//! The first poll always happens, so a zero timeout still gives the device
//! one chance to answer.

use embedded_hal::delay::DelayNs;

use crate::errors::WaitError;
use crate::time::{elapsed, Clock, Millis};

/// Poll `op` until it yields, fails, or `timeout` elapses
pub fn bounded_wait<T, E, C, D, F>(
    clock: &C,
    delay: &mut D,
    timeout: Millis,
    poll_interval: Millis,
    mut op: F,
) -> Result<T, WaitError<E>>
where
    C: Clock + ?Sized,
    D: DelayNs + ?Sized,
    F: FnMut() -> nb::Result<T, E>,
{
    let start = clock.now();
    let limit = u64::from(timeout.ticks());
    // A zero interval would spin without letting the clock move
    let interval = poll_interval.ticks().max(1);

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(nb::Error::Other(e)) => return Err(WaitError::Failed(e)),
            Err(nb::Error::WouldBlock) => {}
        }

        if elapsed(start, clock.now()) >= limit {
            return Err(WaitError::Timeout {
                waited_ms: timeout.ticks(),
            });
        }

        delay.delay_ms(interval);
    }
}

/// Poll a presence check until it answers `true` or `timeout` elapses
pub fn wait_for<C, D, F>(
    clock: &C,
    delay: &mut D,
    timeout: Millis,
    poll_interval: Millis,
    mut check: F,
) -> bool
where
    C: Clock + ?Sized,
    D: DelayNs + ?Sized,
    F: FnMut() -> bool,
{
    bounded_wait::<(), (), _, _, _>(clock, delay, timeout, poll_interval, || {
        if check() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    })
    .is_ok()
}
