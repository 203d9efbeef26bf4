//! Thin binary front-end for the test-run aggregator: reads newline-
//! delimited JSON test events from stdin, writes the report document, and
//! exits non-zero when the run failed.

use std::io::{self, BufReader};
use std::process::ExitCode;

use discount_engine::test_report::{self, TestReportError};

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init();
}

fn run() -> Result<bool, TestReportError> {
    let stdin = io::stdin();
    let summary = test_report::summarize(BufReader::new(stdin.lock()));
    let report = test_report::build_report(summary);
    let root = test_report::resolve_root();

    test_report::persist(&report, &root)?;
    tracing::info!(
        total = report.tests.metrics.total,
        passed = report.tests.metrics.passed,
        failed = report.tests.metrics.failed,
        root = %root.display(),
        "test report written"
    );

    Ok(report.success)
}

fn main() -> ExitCode {
    init_tracing();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            tracing::warn!("test run reported failures");
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to write test report");
            ExitCode::FAILURE
        }
    }
}
