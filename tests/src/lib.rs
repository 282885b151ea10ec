//! In-kernel test harness driver.
//!
//! Suites register themselves into the `.test_registry` link section via
//! `define_test_suite!`; the boot code passes the section bounds (linker
//! symbols) in here and gets an aggregated summary back. Suites run in
//! link order with no panic isolation — a panicking test is a real bug
//! and takes the run down loudly.

#![no_std]

pub mod subsystem_tests;

pub use kestrel_lib::testing::{
    HARNESS_MAX_SUITES, TestRunSummary, TestSuiteDesc, TestSuiteResult, measure_elapsed_ms,
};
use kestrel_lib::{klog_info, tsc};

/// Run every registered suite in `[registry_start, registry_end)`.
///
/// Returns `0` when every test in every suite passed, `-1` otherwise.
pub fn tests_run_all(
    registry_start: *const TestSuiteDesc,
    registry_end: *const TestSuiteDesc,
    summary: &mut TestRunSummary,
) -> i32 {
    *summary = TestRunSummary::default();

    klog_info!("TESTS: running registered suites");
    let start_cycles = tsc::rdtsc();

    let mut cursor = registry_start;
    while cursor < registry_end {
        // SAFETY: the registry section is a dense array of descriptors
        // emitted by define_test_suite!; cursor stays inside the bounds
        // the caller read from the linker.
        let desc = unsafe { &*cursor };
        cursor = unsafe { cursor.add(1) };

        let Some(run) = desc.run else {
            continue;
        };

        let mut result = TestSuiteResult {
            name: desc.name,
            ..TestSuiteResult::default()
        };
        let _ = run(&mut result);
        summary.add_suite_result(&result);
    }

    summary.elapsed_ms = measure_elapsed_ms(start_cycles, tsc::rdtsc());

    klog_info!(
        "TESTS: {} suites, {} tests, {} passed, {} failed ({} ms)",
        summary.suite_count,
        summary.total_tests,
        summary.passed,
        summary.failed,
        summary.elapsed_ms
    );

    if summary.failed == 0 { 0 } else { -1 }
}
