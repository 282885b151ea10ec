use super::TestResult;
use crate::{klog_debug, klog_info};

/// Run one test function, logging its name and outcome.
///
/// There is no panic isolation here: a panicking test takes the run down,
/// which is the desired fail-fast behavior for in-kernel suites.
pub fn run_single_test(name: &str, test: impl FnOnce() -> TestResult) -> TestResult {
    klog_debug!("TEST: {} ...", name);
    let result = test();
    match result {
        TestResult::Pass => klog_debug!("TEST: {} ok", name),
        TestResult::Skipped => klog_debug!("TEST: {} skipped", name),
        TestResult::Fail => klog_info!("TEST: {} FAILED", name),
    }
    result
}
