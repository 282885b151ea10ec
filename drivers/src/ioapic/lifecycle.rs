//! Per-line delivery strategies.
//!
//! Two fixed strategies cover every routed pin, chosen once from the
//! resolved trigger mode when the line is registered with the dispatch
//! framework, and never changed afterwards. Both are backed by the mask
//! driver; the difference is *when* they mask.
//!
//! Edge pins self-clear once acknowledged, so the normal path never
//! touches the mask. The exception is a disabled line that keeps firing
//! (an unhandled shared source): the ack sees the pending+disabled
//! combination and masks the pin to stop the storm.
//!
//! Level pins re-assert until serviced. The ack must mask *before* the
//! CPU-side acknowledge or the pin would immediately re-deliver; the end
//! unmasks to re-arm the source once the handler is done.

use kestrel_core::irq::{self, IRQ_LINES, LEGACY_LINES, LineController, LineStatus};
use kestrel_firmware::Trigger;
use kestrel_lib::{klog_debug, klog_warn};

use super::{routing_state, set_masked};
use crate::{apic, pic};

/// Delivery strategy for a routed pin.
pub enum PinStrategy {
    Edge,
    Level,
}

static EDGE_STRATEGY: PinStrategy = PinStrategy::Edge;
static LEVEL_STRATEGY: PinStrategy = PinStrategy::Level;

pub fn strategy_for(trigger: Trigger) -> &'static PinStrategy {
    match trigger {
        Trigger::Edge => &EDGE_STRATEGY,
        Trigger::Level => &LEVEL_STRATEGY,
    }
}

impl LineController for PinStrategy {
    fn startup(&self, line: u8) -> bool {
        match self {
            PinStrategy::Edge => {
                // A legacy line may have an edge latched in the 8259 from
                // before routing took over. Quiesce the old input first,
                // remember the latched event, then open the routed pin.
                let mut was_pending = false;
                if line < LEGACY_LINES {
                    pic::disable_line(line);
                    was_pending = pic::irq_pending(line);
                }
                set_masked(line, false);
                was_pending
            }
            PinStrategy::Level => {
                // Level state is re-sampled by the pin; nothing to replay.
                set_masked(line, false);
                false
            }
        }
    }

    fn shutdown(&self, line: u8) {
        set_masked(line, true);
    }

    fn enable(&self, line: u8) {
        set_masked(line, false);
    }

    fn disable(&self, line: u8) {
        match self {
            // Masking an edge pin can lose the event outright. Leave the
            // pin open; ack() masks once a delivery actually arrives for
            // the disabled line.
            PinStrategy::Edge => {}
            PinStrategy::Level => set_masked(line, true),
        }
    }

    fn ack(&self, line: u8, status: LineStatus) {
        match self {
            PinStrategy::Edge => {
                if status.contains(LineStatus::PENDING | LineStatus::DISABLED) {
                    set_masked(line, true);
                }
                apic::eoi();
            }
            PinStrategy::Level => {
                set_masked(line, true);
                apic::eoi();
            }
        }
    }

    fn end(&self, line: u8) {
        match self {
            PinStrategy::Edge => {}
            PinStrategy::Level => set_masked(line, false),
        }
    }
}

/// Register every planned line with the dispatch framework. Runs once,
/// after the redirection entries are programmed and before interrupts
/// are enabled.
pub(crate) fn register_lines() {
    let Some(state) = routing_state() else {
        return;
    };

    let mut registered = 0u32;
    for line in 0..IRQ_LINES as u16 {
        let line = line as u8;
        let Some(info) = state.plan.lines[line as usize] else {
            continue;
        };
        if !state.plan.pins.has_links(line) {
            continue;
        }
        match irq::register_line(line, info.vector, strategy_for(info.trigger)) {
            Ok(()) => registered += 1,
            Err(err) => {
                klog_warn!("ioapic: line {} registration rejected: {:?}", line, err);
            }
        }
    }
    klog_debug!("ioapic: {} lines registered with dispatch", registered);
}
