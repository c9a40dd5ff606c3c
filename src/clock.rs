//! Tick counter access and tick/nanosecond calibration.

use std::thread;
use std::time::Duration;

use crate::platform::Platform;

/// Wall-clock span bracketed by one calibration attempt.
pub const CALIBRATION_REFERENCE: Duration = Duration::from_millis(50);
const MAX_CALIBRATION_ATTEMPTS: u32 = 5;

/// Ticks per nanosecond. Fixed once calibrated or supplied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickRatio(f64);

impl TickRatio {
    pub const IDENTITY: TickRatio = TickRatio(1.0);

    /// `None` unless `ticks_per_ns` is finite and positive.
    pub fn new(ticks_per_ns: f64) -> Option<Self> {
        if ticks_per_ns.is_finite() && ticks_per_ns > 0.0 {
            Some(TickRatio(ticks_per_ns))
        } else {
            None
        }
    }

    pub fn ticks_per_ns(self) -> f64 {
        self.0
    }

    pub fn ns_per_tick(self) -> f64 {
        1.0 / self.0
    }

    pub fn ticks_for_nanos(self, nanos: u64) -> u64 {
        (nanos as f64 * self.0).round() as u64
    }

    pub fn nanos_for_ticks(self, ticks: u64) -> u64 {
        (ticks as f64 / self.0).round() as u64
    }
}

/// Read the raw hardware counter: `rdtsc` on x86_64, `cntvct_el0` on aarch64.
#[inline(always)]
pub fn read_counter() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: RDTSC is side-effect free and always present on x86_64.
        unsafe { core::arch::x86_64::_rdtsc() }
    }
    #[cfg(target_arch = "aarch64")]
    {
        let val: u64;
        // SAFETY: the virtual counter is readable from EL0.
        unsafe { core::arch::asm!("mrs {}, cntvct_el0", out(reg) val) };
        val
    }
    // Elsewhere the counter is a nanosecond clock and the ratio comes out near 1.
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        use std::sync::OnceLock;
        use std::time::Instant;
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
    }
}

/// Measure ticks per nanosecond by bracketing `reference` with paired
/// (ticks, nanos) reads. A degenerate bracket is retried; if every attempt
/// is degenerate the identity ratio is used.
pub fn calibrate<P: Platform>(platform: &P, reference: Duration) -> TickRatio {
    for attempt in 1..=MAX_CALIBRATION_ATTEMPTS {
        let ticks0 = platform.read_ticks();
        let nanos0 = platform.read_nanos();
        thread::sleep(reference);
        let ticks1 = platform.read_ticks();
        let nanos1 = platform.read_nanos();

        if nanos1 > nanos0 && ticks1 > ticks0 {
            let ratio = (ticks1 - ticks0) as f64 / (nanos1 - nanos0) as f64;
            if let Some(ratio) = TickRatio::new(ratio) {
                log::debug!(
                    "calibrated {} ticks over {} ns (attempt {})",
                    ticks1 - ticks0,
                    nanos1 - nanos0,
                    attempt
                );
                return ratio;
            }
        }

        log::debug!(
            "degenerate calibration bracket: ticks {}..{}, ns {}..{}",
            ticks0,
            ticks1,
            nanos0,
            nanos1
        );
    }

    log::warn!(
        "clock calibration failed after {} attempts, assuming 1 tick per ns",
        MAX_CALIBRATION_ATTEMPTS
    );
    TickRatio::IDENTITY
}

/// Use the trusted ratio when one is given, otherwise calibrate.
pub fn resolve<P: Platform>(platform: &P, trusted: Option<f64>) -> TickRatio {
    match trusted.and_then(TickRatio::new) {
        Some(ratio) => {
            log::debug!("using supplied ratio of {} ticks per ns", ratio.ticks_per_ns());
            ratio
        }
        None => calibrate(platform, CALIBRATION_REFERENCE),
    }
}
