mod interrupts;

pub use interrupts::*;

/// Spin-loop hint for busy-wait paths.
#[inline(always)]
pub fn pause() {
    core::hint::spin_loop();
}
