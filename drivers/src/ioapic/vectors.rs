//! CPU vector allocation for routed lines.
//!
//! Vectors are handed out with a stride of 8 so that consecutive lines
//! land in different interrupt priority classes, wrapping back through
//! the intermediate offsets once the first pass reaches the system
//! range. The system-call vector is stepped over, and nothing is ever
//! reclaimed within a boot.

use kestrel_core::irq::IRQ_LINES;

pub(crate) const FIRST_DEVICE_VECTOR: u8 = 0x31;
pub(crate) const SYSCALL_VECTOR: u8 = 0x80;
pub(crate) const FIRST_SYSTEM_VECTOR: u8 = 0xEF;

const VECTOR_STRIDE: u8 = 8;

/// Every priority band has been consumed. The platform wants more
/// distinct lines than the CPU has device vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VectorSpaceExhausted;

/// Bump allocator owned by the boot sequence. `assigned` doubles as the
/// idempotence record: a line keeps its first vector forever.
pub(crate) struct VectorAllocator {
    next_candidate: u8,
    band_offset: u8,
    assigned: [u8; IRQ_LINES],
}

impl VectorAllocator {
    pub(crate) const fn new() -> Self {
        Self {
            next_candidate: FIRST_DEVICE_VECTOR,
            band_offset: 0,
            assigned: [0; IRQ_LINES],
        }
    }

    /// Vector for a line, allocating on first use.
    pub(crate) fn assign(&mut self, line: u8) -> Result<u8, VectorSpaceExhausted> {
        let slot = line as usize;
        debug_assert!(slot < IRQ_LINES);

        if self.assigned[slot] != 0 {
            return Ok(self.assigned[slot]);
        }
        if self.band_offset >= VECTOR_STRIDE {
            return Err(VectorSpaceExhausted);
        }

        let vector = self.next_candidate;
        self.assigned[slot] = vector;
        self.advance();
        Ok(vector)
    }

    pub(crate) fn vector_of(&self, line: u8) -> Option<u8> {
        let slot = line as usize;
        if slot < IRQ_LINES && self.assigned[slot] != 0 {
            Some(self.assigned[slot])
        } else {
            None
        }
    }

    fn advance(&mut self) {
        let mut next = self.next_candidate as u32 + VECTOR_STRIDE as u32;
        if next == SYSCALL_VECTOR as u32 {
            next += VECTOR_STRIDE as u32;
        }
        if next >= FIRST_SYSTEM_VECTOR as u32 {
            self.band_offset += 1;
            next = FIRST_DEVICE_VECTOR as u32 + self.band_offset as u32;
        }
        self.next_candidate = next as u8;
    }
}
