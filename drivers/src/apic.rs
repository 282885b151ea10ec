//! Local APIC, reduced to what interrupt routing consumes.
//!
//! Three concerns: acknowledging deliveries (EOI), the LINT0 delivery
//! modes the timer fallback re-programs, and a free-running copy of the
//! APIC timer whose current-count register serves as the watchdog
//! counter. Full local-APIC bring-up (IPIs, timer interrupts, error
//! handling) lives elsewhere.

use spin::Once;

use kestrel_lib::{InitFlag, MmioWindow, klog_debug, klog_info};

const LAPIC_ID: usize = 0x020;
const LAPIC_VERSION: usize = 0x030;
const LAPIC_EOI: usize = 0x0B0;
const LAPIC_SPURIOUS: usize = 0x0F0;
const LAPIC_LVT_TIMER: usize = 0x320;
const LAPIC_LVT_LINT0: usize = 0x350;
const LAPIC_TIMER_ICR: usize = 0x380;
const LAPIC_TIMER_CCR: usize = 0x390;
const LAPIC_TIMER_DCR: usize = 0x3E0;

const LAPIC_SPURIOUS_ENABLE: u32 = 1 << 8;
const LAPIC_SPURIOUS_VECTOR: u32 = 0xFF;
const LAPIC_LVT_MASKED: u32 = 1 << 16;
const LAPIC_LVT_DELIVERY_FIXED: u32 = 0x0 << 8;
const LAPIC_LVT_DELIVERY_EXTINT: u32 = 0x7 << 8;
const LAPIC_TIMER_DIV_16: u32 = 0x3;

const LAPIC_REGION_SIZE: usize = 0x400;

static LAPIC_WINDOW: Once<MmioWindow> = Once::new();
static APIC_ENABLED: InitFlag = InitFlag::new();

fn read_register(reg: usize) -> u32 {
    LAPIC_WINDOW.get().map(|w| w.read_u32(reg)).unwrap_or(0)
}

fn write_register(reg: usize, value: u32) {
    if let Some(window) = LAPIC_WINDOW.get() {
        window.write_u32(reg, value);
    }
}

/// Bring the local APIC far enough up for routed delivery: enable it via
/// the spurious register and park LINT0 masked until the timer fallback
/// decides what the pin carries.
pub fn init(window_base: u64) -> bool {
    if window_base == 0 {
        klog_info!("apic: no register window provided");
        return false;
    }
    // SAFETY: the platform layer maps the LAPIC page before handing its
    // base over; the window covers only the architectural register block.
    let window = unsafe { MmioWindow::new(window_base, LAPIC_REGION_SIZE) };
    LAPIC_WINDOW.call_once(|| window);

    let spurious = read_register(LAPIC_SPURIOUS) | LAPIC_SPURIOUS_ENABLE | LAPIC_SPURIOUS_VECTOR;
    write_register(LAPIC_SPURIOUS, spurious);
    write_register(LAPIC_LVT_LINT0, LAPIC_LVT_MASKED);

    APIC_ENABLED.mark_set();
    klog_debug!("apic: id {:#x}, version {:#x}", id(), version());
    true
}

#[inline]
pub fn is_enabled() -> bool {
    APIC_ENABLED.is_set_relaxed()
}

/// Acknowledge the in-service interrupt.
#[inline]
pub fn eoi() {
    if is_enabled() {
        write_register(LAPIC_EOI, 0);
    }
}

pub fn id() -> u32 {
    read_register(LAPIC_ID) >> 24
}

pub fn version() -> u32 {
    read_register(LAPIC_VERSION) & 0xFF
}

/// LINT0 passes the legacy controller's INTR through: the chip on the
/// other end supplies the vector.
pub fn set_lint0_extint() {
    write_register(LAPIC_LVT_LINT0, LAPIC_LVT_DELIVERY_EXTINT);
    klog_debug!("apic: LINT0 -> ExtINT passthrough");
}

/// LINT0 delivers `vector` directly in fixed mode, ignoring whatever the
/// legacy controller would have supplied.
pub fn set_lint0_fixed(vector: u8) {
    write_register(LAPIC_LVT_LINT0, LAPIC_LVT_DELIVERY_FIXED | vector as u32);
    klog_debug!("apic: LINT0 -> fixed vector {:#x}", vector);
}

pub fn mask_lint0() {
    write_register(LAPIC_LVT_LINT0, LAPIC_LVT_MASKED);
}

/// Start the APIC timer counting down with its interrupt masked. Nothing
/// fires; the current-count register just becomes a free-running
/// counter the watchdog check can sample.
pub fn start_free_running_timer() {
    write_register(LAPIC_TIMER_DCR, LAPIC_TIMER_DIV_16);
    write_register(LAPIC_LVT_TIMER, LAPIC_LVT_MASKED);
    write_register(LAPIC_TIMER_ICR, u32::MAX);
}

/// Current count of the free-running timer copy.
#[inline]
pub fn timer_current_count() -> u32 {
    read_register(LAPIC_TIMER_CCR)
}
