//! Boot-time timer delivery validation.
//!
//! Firmware tables lie about timer wiring often enough that the routed
//! pin cannot be trusted until it has demonstrably ticked. Three delivery
//! paths are tried in order, each given a fixed time window to produce
//! ticks:
//!
//! 1. the routed pin, exactly as the table programmed it;
//! 2. legacy passthrough — the 8259's timer input hand-wired to the CPU
//!    through LINT0 in ExtINT mode, bypassing the table entirely;
//! 3. virtual-wire fixed mode — LINT0 delivers the vector itself,
//!    straight to the boot processor.
//!
//! There is nothing after tier 3: a timer that ticks on none of the
//! paths aborts boot.

use kestrel_core::irq::{self, LEGACY_IRQ_TIMER};
use kestrel_lib::{Deadline, cpu, klog_info, klog_warn};

use super::routing_state;
use super::set_masked;
use crate::{apic, pic};

/// Test window per tier. At the 100 Hz boot tick rate this covers ~10
/// expected ticks, far more than the pass threshold.
const TIMER_TEST_WINDOW_MS: u64 = 100;

/// Ticks that must arrive inside one window for a tier to pass.
const TIMER_TEST_MIN_TICKS: u64 = 4;

/// Which delivery path ended up carrying the timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerPath {
    RoutedPin,
    ThroughPic,
    VirtualWire,
}

/// Operator policy for the optional watchdog requirement.
#[derive(Clone, Copy, Debug)]
pub struct TimerCheckPolicy {
    /// Also require the local APIC's free-running counter to advance.
    pub watchdog: bool,
    /// Escalate past the passthrough tier when only the watchdog counter
    /// (not the timer itself) failed. A timer that ticks while the
    /// watchdog counter sits still is ambiguous; default is to accept it.
    pub escalate_on_watchdog_only: bool,
}

impl Default for TimerCheckPolicy {
    fn default() -> Self {
        Self {
            watchdog: false,
            escalate_on_watchdog_only: false,
        }
    }
}

/// Did the tick counter move? Deadline-bounded, so the answer does not
/// depend on CPU speed. Interrupts must be enabled while this spins.
fn ticks_advance() -> bool {
    let start = irq::timer_ticks();
    let deadline = Deadline::after_ms(TIMER_TEST_WINDOW_MS);
    while !deadline.expired() {
        if irq::timer_ticks().wrapping_sub(start) >= TIMER_TEST_MIN_TICKS {
            return true;
        }
        cpu::pause();
    }
    false
}

/// Did the free-running watchdog counter move?
fn watchdog_advances() -> bool {
    let start = apic::timer_current_count();
    let deadline = Deadline::after_ms(TIMER_TEST_WINDOW_MS);
    while !deadline.expired() {
        if apic::timer_current_count() != start {
            return true;
        }
        cpu::pause();
    }
    false
}

/// Validate timer delivery, falling back tier by tier. Returns the path
/// that finally worked; panics if none does.
///
/// Boot-only, with interrupts enabled and the timer line's handler
/// already registered.
pub fn check_timer(policy: &TimerCheckPolicy) -> TimerPath {
    let routed_vector = routing_state()
        .and_then(|state| state.plan.lines[LEGACY_IRQ_TIMER as usize])
        .map(|info| info.vector);

    if policy.watchdog {
        apic::start_free_running_timer();
    }

    // Tier 1: the routed pin.
    if routed_vector.is_some() {
        let ticks_ok = ticks_advance();
        let watchdog_ok = !policy.watchdog || watchdog_advances();
        if ticks_ok && watchdog_ok {
            klog_info!("timer: verified on routed pin");
            return TimerPath::RoutedPin;
        }
        if ticks_ok {
            klog_warn!("timer: watchdog counter stalled on routed pin, trying legacy passthrough");
        } else {
            klog_warn!("timer: no ticks via routed pin, trying legacy passthrough");
        }
        set_masked(LEGACY_IRQ_TIMER, true);
    } else {
        klog_warn!("timer: table routes no pin to the timer line, trying legacy passthrough");
    }

    // Tier 2: hand-wire the 8259 timer input through LINT0 ExtINT. The
    // chip supplies the vector, so the delivery arrives at the parked
    // legacy base rather than the routed vector.
    let pic_vector = pic::PIC_VECTOR_BASE + LEGACY_IRQ_TIMER;
    if let Err(err) = irq::alias_vector(pic_vector, LEGACY_IRQ_TIMER) {
        klog_warn!("timer: cannot alias passthrough vector {:#x}: {:?}", pic_vector, err);
    }
    pic::program_oneshot_route(LEGACY_IRQ_TIMER, pic_vector);
    apic::set_lint0_extint();
    pic::enable_line(LEGACY_IRQ_TIMER);

    if ticks_advance() {
        let watchdog_ok = !policy.watchdog || watchdog_advances();
        if watchdog_ok || !policy.escalate_on_watchdog_only {
            if !watchdog_ok {
                klog_warn!("timer: watchdog counter still stalled, accepting passthrough per policy");
            }
            klog_info!("timer: verified through legacy controller passthrough");
            return TimerPath::ThroughPic;
        }
        klog_warn!("timer: watchdog counter stalled on passthrough, trying virtual wire");
    } else {
        klog_warn!("timer: no ticks through legacy passthrough, trying virtual wire");
    }

    // Tier 3: fixed-mode virtual wire. The legacy chip still gates the
    // line, but LINT0 now delivers the vector itself to this processor.
    pic::disable_line(LEGACY_IRQ_TIMER);
    let wire_vector = routed_vector.unwrap_or(pic_vector);
    apic::set_lint0_fixed(wire_vector);
    pic::enable_line(LEGACY_IRQ_TIMER);

    if ticks_advance() {
        klog_info!("timer: verified as virtual-wire fixed delivery");
        return TimerPath::VirtualWire;
    }

    panic!("timer: no ticks on any delivery path, cannot continue boot");
}
