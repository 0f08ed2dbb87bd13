//! Time source, compare timer, and interrupt wiring utilities.
//!
//! The core never touches timer registers. It sees the hardware timer through two
//! narrow traits:
//! - [`MicrosClock`]: a free-running microsecond counter that wraps at 2^32
//! - [`CompareTimer`]: one compare register per ignition channel, each able to raise an
//!   interrupt when the counter reaches an armed value
//!
//! All arithmetic on counter values is wrapping. [`elapsed`] and [`is_after`] are the only
//! two comparisons the rest of the crate uses, so a 32-bit counter that overflows roughly
//! every 71 minutes is handled the same way as one that never does.
//!
//! Helpers for wiring interrupts are split by feature:
//! - `global_compare_match`, `global_edge_isr` and the `init_*!`/`*_isr!` macros:
//!   `critical_section` backed global slots (feature `timer-isr`)
//! - `run_ecu_loop`: blocking super-loop for a `DelayNs` provider (feature `delay-loop`)

use crate::ignition::IgnitionChannel;

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg_attr(feature = "delay-loop", allow(unused_imports))]
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;

/// Half of the counter range. Two counter values closer than this can be ordered.
pub const COUNTER_HALF_RANGE: u32 = 1 << 31;

/// A monotonic, free-running microsecond counter.
///
/// Reading the counter must have no side effects, so the clock is shared by reference
/// between the edge interrupt and every task.
pub trait MicrosClock {
    /// Returns the current counter value in microseconds. Wraps at 2^32.
    fn now_micros(&self) -> u32;
}

impl<T: MicrosClock + ?Sized> MicrosClock for &T {
    fn now_micros(&self) -> u32 {
        (**self).now_micros()
    }
}

/// One compare register per ignition channel on a shared hardware timer.
pub trait CompareTimer {
    /// Schedules a single compare-match interrupt for `channel` at `deadline`.
    ///
    /// Replaces any deadline previously armed for the same channel.
    fn arm(&mut self, channel: IgnitionChannel, deadline: u32);

    /// Stops `channel` from raising further compare-match interrupts.
    fn disarm(&mut self, channel: IgnitionChannel);
}

/// Microseconds from `earlier` to `later`, correct across counter wrap.
///
/// # Example
/// ```rust
/// use ecu_core::timer::elapsed;
///
/// assert_eq!(elapsed(0x10, 0xFFFF_FFF0), 0x20);
/// ```
pub const fn elapsed(later: u32, earlier: u32) -> u32 {
    later.wrapping_sub(earlier)
}

/// Returns `true` when `t` lies strictly after `reference`, within half the counter range.
pub const fn is_after(t: u32, reference: u32) -> bool {
    let delta = t.wrapping_sub(reference);
    delta != 0 && delta < COUNTER_HALF_RANGE
}
