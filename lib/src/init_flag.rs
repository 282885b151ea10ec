//! One-shot and reentrancy latches for boot-phase state.
//!
//! [`InitFlag`] marks a subsystem as initialised: set once with release
//! semantics, checked with acquire semantics by everyone who relies on
//! the data published before the set. [`StateFlag`] is a mutual-exclusion
//! latch for "exactly one caller runs the init path" situations.
//!
//! Both exist so that post-boot mutation of boot-only structures is a
//! detectable programming error rather than a silent race.

use core::sync::atomic::{AtomicBool, Ordering};

/// Set-once readiness latch.
pub struct InitFlag(AtomicBool);

impl InitFlag {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Publish: everything written before this call is visible to any
    /// thread that observes `is_set() == true`.
    #[inline]
    pub fn mark_set(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Relaxed check for hot paths that only gate on the flag itself.
    #[inline]
    pub fn is_set_relaxed(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Enter/leave latch: `enter()` succeeds for exactly one caller until the
/// matching `leave()`.
pub struct StateFlag(AtomicBool);

impl StateFlag {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Try to claim the latch. Returns `false` if another caller holds it.
    #[inline]
    pub fn enter(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn leave(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_inactive(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for StateFlag {
    fn default() -> Self {
        Self::new()
    }
}
