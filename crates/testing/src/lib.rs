//! Test suite for the minikernel: a scripted machine harness, the
//! end-to-end scenarios, and runtime invariant checks. The
//! `minikernel-test-runner` binary drives the same suites and emits a
//! JSON report.

pub mod harness;
pub mod invariants;
pub mod scenarios;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full report produced by the test runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub generated_at: DateTime<Utc>,
    pub scenarios: scenarios::ScenarioSuiteResults,
}

/// Initialize logging once per process; safe to call from tests.
pub fn setup_logging() {
    let _ = env_logger::builder().format_timestamp(None).try_init();
}
