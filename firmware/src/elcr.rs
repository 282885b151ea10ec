//! EISA Edge/Level Control Register snapshot.
//!
//! EISA chipsets expose one trigger-mode bit per legacy IRQ in a pair of
//! byte-wide registers. The platform layer samples them once at boot;
//! routing decisions key off this frozen snapshot, never off a live read,
//! so resolving the same entry twice always gives the same answer.

use kestrel_lib::ports::{ELCR_MASTER, ELCR_SLAVE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElcrSnapshot {
    bits: u16,
}

impl ElcrSnapshot {
    /// Snapshot with every line edge-triggered (the ISA-machine shape).
    pub const fn all_edge() -> Self {
        Self { bits: 0 }
    }

    pub const fn from_raw(bits: u16) -> Self {
        Self { bits }
    }

    /// Sample the hardware register pair.
    pub fn read() -> Self {
        // SAFETY: the ELCR pair is read-only sampled here; reading has no
        // device side effects.
        let low = unsafe { ELCR_MASTER.read() } as u16;
        let high = unsafe { ELCR_SLAVE.read() } as u16;
        Self {
            bits: (high << 8) | low,
        }
    }

    pub const fn raw(&self) -> u16 {
        self.bits
    }

    /// Trigger bit for a legacy IRQ. Only lines 0..16 exist; the caller
    /// handles out-of-range queries (a firmware defect) itself.
    pub fn level_triggered(&self, irq: u8) -> bool {
        debug_assert!(irq < 16);
        self.bits & (1u16 << (irq & 0x0F)) != 0
    }
}

impl Default for ElcrSnapshot {
    fn default() -> Self {
        Self::all_edge()
    }
}
