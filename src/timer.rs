//! CPU and OS timers
//!
//! Provides:
//! - x86_64: `rdtsc` time-stamp counter
//! - aarch64: `cntvct_el0` virtual counter
//! - Fallback: nanoseconds since process start via `std::time::Instant`
//!
//! The CPU counter has no fixed unit, so it is calibrated against the OS
//! clock by busy-waiting. The estimate is cached process-wide.

use crate::config::DEFAULT_CALIBRATION_MS;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Cached CPU frequency estimate in Hz, 0 = not calibrated yet
static ESTIMATED_CPU_FREQUENCY: AtomicU64 = AtomicU64::new(0);

/// Ticks per second of [`read_os_timer`]
const OS_TIMER_FREQUENCY: u64 = 1_000_000;

fn process_anchor() -> Instant {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    *ANCHOR.get_or_init(Instant::now)
}

/// Read the high-resolution CPU counter.
#[inline]
pub fn read_cpu_timer() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        read_cpu_timer_x86_64()
    }

    #[cfg(target_arch = "aarch64")]
    {
        read_cpu_timer_aarch64()
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        process_anchor().elapsed().as_nanos() as u64
    }
}

#[cfg(target_arch = "x86_64")]
#[inline]
#[allow(unused_unsafe)]
fn read_cpu_timer_x86_64() -> u64 {
    // SAFETY: rdtsc is available on every x86_64 CPU and has no side effects
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(target_arch = "aarch64")]
#[inline]
fn read_cpu_timer_aarch64() -> u64 {
    let ticks: u64;
    // SAFETY: cntvct_el0 is readable from EL0 on all supported targets
    unsafe {
        std::arch::asm!(
            "mrs {}, cntvct_el0",
            out(reg) ticks,
            options(nostack, nomem),
        );
    }
    ticks
}

/// Read the monotonic OS clock in microseconds since process start.
#[inline]
pub fn read_os_timer() -> u64 {
    process_anchor().elapsed().as_micros() as u64
}

/// Ticks per second of [`read_os_timer`].
pub const fn os_timer_frequency() -> u64 {
    OS_TIMER_FREQUENCY
}

/// Estimate CPU counter ticks per second by spinning on the OS clock.
///
/// The longer the wait, the better the estimate; 100ms is a reasonable
/// start. Returns 0 if the OS clock did not advance.
pub fn estimate_cpu_frequency(ms_to_wait: u64) -> u64 {
    let os_freq = os_timer_frequency();
    let cpu_start = read_cpu_timer();
    let os_start = read_os_timer();
    let os_wait = os_freq.saturating_mul(ms_to_wait) / 1000;

    let mut os_elapsed = 0;
    while os_elapsed < os_wait {
        os_elapsed = read_os_timer().saturating_sub(os_start);
    }

    let cpu_elapsed = read_cpu_timer().saturating_sub(cpu_start);
    if os_elapsed == 0 {
        return 0;
    }

    let freq = u128::from(os_freq) * u128::from(cpu_elapsed) / u128::from(os_elapsed);
    u64::try_from(freq).unwrap_or(u64::MAX)
}

/// Cached CPU frequency estimate, calibrating with the default wait on
/// first use.
pub fn estimated_cpu_frequency() -> u64 {
    calibrated_cpu_frequency(DEFAULT_CALIBRATION_MS)
}

/// Cached CPU frequency estimate, calibrating for `ms_to_wait` if no
/// estimate exists yet.
pub fn calibrated_cpu_frequency(ms_to_wait: u64) -> u64 {
    match ESTIMATED_CPU_FREQUENCY.load(Ordering::Relaxed) {
        0 => set_estimated_cpu_frequency(ms_to_wait),
        freq => freq,
    }
}

/// Recalibrate and cache the CPU frequency estimate.
pub fn set_estimated_cpu_frequency(ms_to_wait: u64) -> u64 {
    let freq = estimate_cpu_frequency(ms_to_wait);
    tracing::debug!(ms_to_wait, freq, "calibrated CPU frequency");
    ESTIMATED_CPU_FREQUENCY.store(freq, Ordering::Relaxed);
    freq
}

/// Replace the cached estimate with a known value (0 forces recalibration).
pub fn override_cpu_frequency(hz: u64) {
    ESTIMATED_CPU_FREQUENCY.store(hz, Ordering::Relaxed);
}

/// Convert counter ticks to seconds; 0 when the frequency is unknown.
#[inline]
pub fn ticks_to_seconds(ticks: u64, cpu_frequency: u64) -> f64 {
    if cpu_frequency == 0 {
        0.0
    } else {
        ticks as f64 / cpu_frequency as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    fn test_cpu_timer_advances() {
        let a = read_cpu_timer();
        std::thread::sleep(Duration::from_millis(1));
        let b = read_cpu_timer();
        assert!(b > a);
    }

    #[test]
    fn test_os_timer_advances() {
        let a = read_os_timer();
        std::thread::sleep(Duration::from_millis(2));
        let b = read_os_timer();
        assert!(b - a >= 1000);
    }

    #[test]
    fn test_estimate_cpu_frequency_nonzero() {
        let freq = estimate_cpu_frequency(10);
        assert!(freq > 0);
    }

    #[test]
    fn test_estimate_waits_requested_time() {
        let start = Instant::now();
        estimate_cpu_frequency(20);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    #[serial(cpu_frequency)]
    fn test_override_is_cached() {
        override_cpu_frequency(3_000_000_000);
        assert_eq!(estimated_cpu_frequency(), 3_000_000_000);
        override_cpu_frequency(0);
        assert!(calibrated_cpu_frequency(5) > 0);
    }

    #[test]
    fn test_ticks_to_seconds_guards_zero() {
        assert_eq!(ticks_to_seconds(1000, 0), 0.0);
        assert_eq!(ticks_to_seconds(500, 1000), 0.5);
    }
}
