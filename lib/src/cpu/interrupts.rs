//! Interrupt flag management: sti, cli, irqsave/irqrestore.

use core::arch::asm;

const RFLAGS_IF: u64 = 1 << 9;

/// Enable interrupts (STI).
#[inline(always)]
pub fn enable_interrupts() {
    unsafe {
        asm!("sti", options(nomem, nostack));
    }
}

/// Disable interrupts (CLI).
#[inline(always)]
pub fn disable_interrupts() {
    unsafe {
        asm!("cli", options(nomem, nostack));
    }
}

/// Save RFLAGS and disable interrupts (irqsave pattern).
#[inline(always)]
pub fn save_flags_cli() -> u64 {
    let flags: u64;
    unsafe {
        asm!(
            "pushfq",
            "pop {}",
            "cli",
            out(reg) flags,
            options(nomem)
        );
    }
    flags
}

/// Restore the interrupt flag from saved RFLAGS (irqrestore pattern).
/// Re-enables interrupts only if they were enabled when saved.
#[inline(always)]
pub fn restore_flags(flags: u64) {
    if flags & RFLAGS_IF != 0 {
        enable_interrupts();
    }
}

/// Read RFLAGS without changing interrupt state.
#[inline(always)]
pub fn read_rflags() -> u64 {
    let flags: u64;
    unsafe {
        asm!("pushfq; pop {}", out(reg) flags, options(nomem, preserves_flags));
    }
    flags
}

/// True if the IF bit is currently set.
#[inline(always)]
pub fn are_interrupts_enabled() -> bool {
    read_rflags() & RFLAGS_IF != 0
}
