//! Boot orchestration for interrupt delivery.
//!
//! Runs once, single-threaded, before other processors come up:
//! console → quiesce the legacy pair → local APIC → routing tables →
//! dispatch registration → timer programming → timer validation.

use kestrel_core::irq::{self, LEGACY_IRQ_TIMER};
use kestrel_firmware::{PlatformIrqInfo, Trigger};
use kestrel_lib::ports::PIT_DEFAULT_FREQUENCY_HZ;
use kestrel_lib::{cpu, klog_info, klog_warn};

use crate::ioapic::timer_check::{self, TimerCheckPolicy};
use crate::ioapic::{self, lifecycle};
use crate::{apic, pic, pit, serial};

fn timer_tick(_line: u8) {
    irq::note_timer_tick();
}

/// Bring routed interrupt delivery up. Returns whether the routing
/// subsystem took over; `false` leaves the machine on pure legacy
/// delivery (which is somebody else's problem).
pub fn init(platform: &PlatformIrqInfo, policy: &TimerCheckPolicy) -> bool {
    serial::init();

    if platform.skip_ioapic_setup {
        klog_info!("IRQ: routed delivery disabled by operator flag");
        return false;
    }

    pic::quiesce();

    if !apic::init(platform.lapic_window_base) {
        klog_warn!("IRQ: local APIC unavailable, staying on legacy delivery");
        return false;
    }

    if !ioapic::init(platform) {
        klog_warn!("IRQ: routed delivery unavailable, staying on legacy delivery");
        return false;
    }

    lifecycle::register_lines();

    // The timer line must exist even when the table routes no pin to it;
    // the fallback tiers still deliver through its vector.
    if !irq::line_is_registered(LEGACY_IRQ_TIMER) {
        let strategy = lifecycle::strategy_for(Trigger::Edge);
        if let Err(err) = irq::register_line(LEGACY_IRQ_TIMER, pic::PIC_VECTOR_BASE, strategy) {
            klog_warn!("IRQ: timer line registration rejected: {:?}", err);
        }
    }

    pit::init(PIT_DEFAULT_FREQUENCY_HZ);
    match irq::register_handler(LEGACY_IRQ_TIMER, timer_tick) {
        Ok(_) => {}
        Err(err) => klog_warn!("IRQ: timer handler registration rejected: {:?}", err),
    }

    cpu::enable_interrupts();

    let path = timer_check::check_timer(policy);
    klog_info!("IRQ: timer delivery verified via {:?}", path);
    true
}
