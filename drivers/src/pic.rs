//! Legacy 8259 controller pair.
//!
//! Routed delivery replaces the 8259s, so this driver is only the narrow
//! passthrough surface the routing subsystem needs: quiesce at boot,
//! per-line mask control, sampling a latched request, and the one-shot
//! timer route the timer fallback uses. Everything else the chips can do
//! stays unprogrammed.

use kestrel_lib::io::io_delay;
use kestrel_lib::ports::{PIC1_COMMAND, PIC1_DATA, PIC2_COMMAND, PIC2_DATA};
use kestrel_lib::{IrqMutex, klog_debug, klog_warn};

/// Where the quiesced chips park their vectors; anything arriving there
/// is spurious once routing is up.
pub const PIC_VECTOR_BASE: u8 = 0x20;

const ICW1_INIT_ICW4: u8 = 0x11;
const ICW3_MASTER_CASCADE: u8 = 0x04;
const ICW3_SLAVE_IDENTITY: u8 = 0x02;
const ICW4_8086: u8 = 0x01;
const ICW4_AUTO_EOI: u8 = 0x02;
const OCW3_READ_IRR: u8 = 0x0A;

/// The mask-register read-modify-write and the OCW3/IRR read pair must
/// not interleave across CPUs or with interrupt context.
static PIC_LOCK: IrqMutex<()> = IrqMutex::new(());

/// Full ICW init sequence for both chips.
///
/// # Safety
///
/// Caller must hold `PIC_LOCK`. Reprograms both chips from scratch.
unsafe fn init_chips(master_base: u8, icw4_extra: u8, master_mask: u8, slave_mask: u8) {
    PIC1_COMMAND.write(ICW1_INIT_ICW4);
    io_delay();
    PIC2_COMMAND.write(ICW1_INIT_ICW4);
    io_delay();

    PIC1_DATA.write(master_base);
    io_delay();
    PIC2_DATA.write(master_base + 8);
    io_delay();

    PIC1_DATA.write(ICW3_MASTER_CASCADE);
    io_delay();
    PIC2_DATA.write(ICW3_SLAVE_IDENTITY);
    io_delay();

    PIC1_DATA.write(ICW4_8086 | icw4_extra);
    io_delay();
    PIC2_DATA.write(ICW4_8086 | icw4_extra);
    io_delay();

    PIC1_DATA.write(master_mask);
    PIC2_DATA.write(slave_mask);
}

/// Park both chips: vectors moved clear of exception space, every line
/// masked. Routed delivery owns the lines from here on.
pub fn quiesce() {
    let _guard = PIC_LOCK.lock();
    // SAFETY: lock held; boot is single-threaded at this point.
    unsafe { init_chips(PIC_VECTOR_BASE, 0, 0xFF, 0xFF) };
    klog_debug!("pic: quiesced, all lines masked at vector base {:#x}", PIC_VECTOR_BASE);
}

fn mask_port(irq: u8) -> (kestrel_lib::io::Port<u8>, u8) {
    if irq < 8 {
        (PIC1_DATA, irq)
    } else {
        (PIC2_DATA, irq - 8)
    }
}

/// Mask one input on the legacy pair.
pub fn disable_line(irq: u8) {
    if irq >= 16 {
        return;
    }
    let _guard = PIC_LOCK.lock();
    let (port, bit) = mask_port(irq);
    // SAFETY: lock held for the read-modify-write.
    unsafe {
        let mask = port.read() | (1 << bit);
        port.write(mask);
    }
}

/// Unmask one input on the legacy pair.
pub fn enable_line(irq: u8) {
    if irq >= 16 {
        return;
    }
    let _guard = PIC_LOCK.lock();
    let (port, bit) = mask_port(irq);
    // SAFETY: lock held for the read-modify-write.
    unsafe {
        let mask = port.read() & !(1 << bit);
        port.write(mask);
    }
}

/// Whether the chip has a request latched for this input (IRR bit).
/// Used when routed delivery takes over an edge line: an edge that fired
/// before the takeover is only recorded here.
pub fn irq_pending(irq: u8) -> bool {
    if irq >= 16 {
        return false;
    }
    let _guard = PIC_LOCK.lock();
    let (command, bit) = if irq < 8 {
        (PIC1_COMMAND, irq)
    } else {
        (PIC2_COMMAND, irq - 8)
    };
    // SAFETY: lock held; OCW3 select followed by the register read is the
    // critical pair.
    unsafe {
        command.write(OCW3_READ_IRR);
        command.read() & (1 << bit) != 0
    }
}

/// Re-program the master chip so that exactly one input is live and
/// delivers exactly `vector`, in auto-EOI mode. Timer-fallback only:
/// this hands the chip's INTR output to the CPU as a virtual wire.
pub fn program_oneshot_route(pin: u8, vector: u8) {
    if pin >= 8 {
        klog_warn!("pic: one-shot route only supports master inputs, got pin {}", pin);
        return;
    }
    let base = vector - pin;
    if base & 0x07 != 0 {
        klog_warn!(
            "pic: one-shot vector {:#x} not chip-aligned for pin {}, delivery will round",
            vector,
            pin
        );
    }
    let _guard = PIC_LOCK.lock();
    // SAFETY: lock held; boot-time reprogramming.
    unsafe { init_chips(base & !0x07, ICW4_AUTO_EOI, !(1 << pin), 0xFF) };
    klog_debug!("pic: one-shot route pin {} -> vector {:#x}", pin, vector);
}
