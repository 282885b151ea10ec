// Test harness types. Suites are auto-registered into the `.test_registry`
// link section by `define_test_suite!`; the tests crate walks that section.

use core::ffi::{c_char, c_int};
use core::ptr;

/// Maximum number of test suites a run summary can hold.
pub const HARNESS_MAX_SUITES: usize = 32;

/// Cycles-per-millisecond estimate used when no calibration ran (3 GHz).
const DEFAULT_CYCLES_PER_MS: u64 = 3_000_000;

/// Result of executing a single test suite.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TestSuiteResult {
    pub name: *const c_char,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub elapsed_ms: u32,
}

impl Default for TestSuiteResult {
    fn default() -> Self {
        Self {
            name: ptr::null(),
            total: 0,
            passed: 0,
            failed: 0,
            elapsed_ms: 0,
        }
    }
}

impl TestSuiteResult {
    pub fn fill(&mut self, passed: u32, total: u32, elapsed_ms: u32) {
        self.total = total;
        self.passed = passed;
        self.failed = total.saturating_sub(passed);
        self.elapsed_ms = elapsed_ms;
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

pub type SuiteRunnerFn = fn(*mut TestSuiteResult) -> i32;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct TestSuiteDesc {
    pub name: *const c_char,
    pub run: Option<SuiteRunnerFn>,
}

// SAFETY: TestSuiteDesc holds only pointers to static data and function
// pointers; read-only sharing is fine.
unsafe impl Sync for TestSuiteDesc {}

/// Aggregated results from a full suite walk.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TestRunSummary {
    pub suites: [TestSuiteResult; HARNESS_MAX_SUITES],
    pub suite_count: usize,
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    pub elapsed_ms: u32,
}

impl Default for TestRunSummary {
    fn default() -> Self {
        Self {
            suites: [TestSuiteResult::default(); HARNESS_MAX_SUITES],
            suite_count: 0,
            total_tests: 0,
            passed: 0,
            failed: 0,
            elapsed_ms: 0,
        }
    }
}

impl TestRunSummary {
    pub fn add_suite_result(&mut self, result: &TestSuiteResult) {
        self.total_tests = self.total_tests.saturating_add(result.total);
        self.passed = self.passed.saturating_add(result.passed);
        self.failed = self.failed.saturating_add(result.failed);
        if self.suite_count < HARNESS_MAX_SUITES {
            self.suites[self.suite_count] = *result;
            self.suite_count += 1;
        }
    }

    pub fn all_passed(&self) -> c_int {
        if self.failed == 0 { 1 } else { 0 }
    }
}

/// Convert a TSC interval to milliseconds with the default frequency
/// estimate. Good enough for per-suite timing output.
pub fn measure_elapsed_ms(start_cycles: u64, end_cycles: u64) -> u32 {
    let delta = end_cycles.saturating_sub(start_cycles);
    (delta / DEFAULT_CYCLES_PER_MS) as u32
}
