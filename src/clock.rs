//! Cycle counter for the timed loops.
//!
//! On x86_64 [`CycleClock::now`] reads the time-stamp counter. Elsewhere it
//! falls back to monotonic nanoseconds since first use, so "cycles" are
//! nanoseconds and a calibrated clock reports roughly 1 GHz.

use std::thread;
use std::time::{Duration, Instant};

use crate::tracing_helpers::debug_log;

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn read_counter() -> u64 {
    // SAFETY: RDTSC is available on every x86_64 CPU and has no side effects.
    unsafe { std::arch::x86_64::_rdtsc() }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
fn read_counter() -> u64 {
    use std::sync::OnceLock;

    static START: OnceLock<Instant> = OnceLock::new();
    let start = START.get_or_init(Instant::now);
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Counter reader plus its measured frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleClock {
    hz: f64,
}

impl CycleClock {
    /// Current counter value.
    #[must_use]
    #[inline(always)]
    pub fn now() -> u64 {
        read_counter()
    }

    /// Counter ticks since `start`.
    #[must_use]
    #[inline(always)]
    pub fn since(start: u64) -> u64 {
        read_counter().wrapping_sub(start)
    }

    /// Measure the counter frequency over a sleep of `window`.
    ///
    /// Longer windows give steadier numbers. A frequency below 1 Hz (a zero
    /// window, say) is clamped to 1 so ratios stay finite.
    #[must_use]
    pub fn calibrate(window: Duration) -> Self {
        let wall = Instant::now();
        let start = read_counter();
        thread::sleep(window);
        let ticks = read_counter().wrapping_sub(start);
        let secs = wall.elapsed().as_secs_f64();

        #[allow(clippy::cast_precision_loss)]
        let hz = if secs > 0.0 { ticks as f64 / secs } else { 0.0 };
        let clock = Self::fixed(hz);
        debug_log!(hz = clock.hz, window_ms = window.as_millis() as u64, "cycle clock calibrated");
        clock
    }

    /// Clock with a known frequency, for tests and reproducible reports.
    #[must_use]
    pub const fn fixed(hz: f64) -> Self {
        Self {
            hz: if hz >= 1.0 { hz } else { 1.0 },
        }
    }

    /// Counter ticks per second.
    #[must_use]
    #[inline(always)]
    pub const fn hz(&self) -> f64 {
        self.hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_advances() {
        let a = CycleClock::now();
        let mut x = 0u64;
        for i in 0..10_000u64 {
            x = std::hint::black_box(x.wrapping_add(i));
        }
        let b = CycleClock::now();
        assert!(b >= a, "counter went backwards: {a} -> {b}");
    }

    #[test]
    fn test_fixed_clamps_to_one_hz() {
        assert_eq!(CycleClock::fixed(3.0e9).hz(), 3.0e9);
        assert_eq!(CycleClock::fixed(0.0).hz(), 1.0);
        assert_eq!(CycleClock::fixed(f64::NAN).hz(), 1.0);
    }

    #[test]
    #[cfg(not(miri))]
    fn test_calibrate_is_plausible() {
        let clock = CycleClock::calibrate(Duration::from_millis(20));
        // Anything from a slow emulator to a fast TSC.
        assert!(clock.hz() > 1.0e6, "hz = {}", clock.hz());
        assert!(clock.hz() < 1.0e11, "hz = {}", clock.hz());
    }
}
