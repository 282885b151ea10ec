//! Cross-crate smoke checks for the routing subsystem's public surface.
//!
//! These run in any configuration: when routing never came up (headless
//! QEMU without controllers) they only verify that the public entry
//! points stay harmless.

use kestrel_core::irq;
use kestrel_drivers::{apic, ioapic};
use kestrel_lib::klog_info;
use kestrel_lib::testing::TestResult;

pub fn test_ioapic_ready_state() -> TestResult {
    if !ioapic::is_ready() {
        klog_info!("SUBSYS_TEST: note - routing not up (may be expected in this config)");
    }
    TestResult::Pass
}

pub fn test_apic_enabled_state() -> TestResult {
    if !apic::is_enabled() {
        klog_info!("SUBSYS_TEST: note - local APIC not enabled");
    }
    TestResult::Pass
}

pub fn test_mask_of_unrouted_line_is_harmless() -> TestResult {
    ioapic::set_masked(250, true);
    ioapic::set_masked(250, false);
    TestResult::Pass
}

pub fn test_dump_state_is_readonly() -> TestResult {
    ioapic::dump_state();
    ioapic::dump_state();
    TestResult::Pass
}

pub fn test_timer_line_registered_after_boot() -> TestResult {
    if !ioapic::is_ready() {
        return TestResult::Skipped;
    }
    if !irq::line_is_registered(irq::LEGACY_IRQ_TIMER) {
        klog_info!("SUBSYS_TEST: BUG - timer line unregistered after routed boot");
        return TestResult::Fail;
    }
    TestResult::Pass
}

kestrel_lib::define_test_suite!(
    subsystem,
    [
        test_ioapic_ready_state,
        test_apic_enabled_state,
        test_mask_of_unrouted_line_is_harmless,
        test_dump_state_is_readonly,
        test_timer_line_registered_after_boot,
    ]
);
