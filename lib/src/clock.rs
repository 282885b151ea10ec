//! Coarse TSC-based monotonic clock.
//!
//! Time-bounded waits in this kernel take an explicit timeout through
//! [`Deadline`] instead of counting loop iterations, so their behavior
//! does not depend on CPU speed. The conversion factor defaults to a
//! 3 GHz estimate and can be tightened once a calibration source has run;
//! the consumers here only need tens-of-milliseconds accuracy.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::tsc;

const DEFAULT_CYCLES_PER_US: u64 = 3_000;

static CYCLES_PER_US: AtomicU64 = AtomicU64::new(DEFAULT_CYCLES_PER_US);

/// Install a measured TSC frequency (cycles per microsecond).
pub fn calibrate(cycles_per_us: u64) {
    if cycles_per_us > 0 {
        CYCLES_PER_US.store(cycles_per_us, Ordering::Relaxed);
    }
}

/// Monotonic nanoseconds since an arbitrary boot-time origin.
#[inline]
pub fn monotonic_ns() -> u64 {
    let cycles = tsc::rdtsc() as u128;
    let per_us = CYCLES_PER_US.load(Ordering::Relaxed) as u128;
    ((cycles * 1_000) / per_us) as u64
}

/// A fixed point in monotonic time.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    expires_ns: u64,
}

impl Deadline {
    #[inline]
    pub fn after_ns(ns: u64) -> Self {
        Self {
            expires_ns: monotonic_ns().saturating_add(ns),
        }
    }

    #[inline]
    pub fn after_ms(ms: u64) -> Self {
        Self::after_ns(ms.saturating_mul(1_000_000))
    }

    #[inline]
    pub fn expired(&self) -> bool {
        monotonic_ns() >= self.expires_ns
    }
}
