//! Test-run aggregator: reads a stream of JSON-encoded test events and
//! writes a summary report document.
//!
//! This is ambient CI-facing tooling, not part of the pricing pipeline --
//! nothing in `evaluate`/`evaluate_parallel` imports this module. It exists
//! here for the same reason the reference CLI carries its own sink and
//! stdout writers: every production repository in this lineage ships the
//! small utilities its own CI needs.

use std::collections::BTreeMap;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default root used when `TEST_REPORT_ROOT` is unset: the parent of the
/// current working directory.
fn default_root() -> PathBuf {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| cwd.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// One line of `go test -json`-shaped output. Only the fields the
/// aggregator actually consumes are modeled; everything else in a real
/// event stream is ignored. Field names accept both the PascalCase the
/// upstream tool emits and plain lowercase.
#[derive(Debug, Default, Deserialize)]
struct TestEvent {
    #[serde(default, alias = "Action")]
    action: String,
    #[serde(default, alias = "Test")]
    test: Option<String>,
}

/// Pass/fail tallies over the whole event stream.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Metrics {
    /// Total number of distinct tests observed.
    pub total: u64,
    /// Tests that last reported `pass`.
    pub passed: u64,
    /// Tests that last reported `fail`.
    pub failed: u64,
}

/// Per-test outcomes plus the rolled-up [`Metrics`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct TestSummary {
    /// Each observed test name mapped to `"PASSED"` or `"FAILED"`.
    pub tests: BTreeMap<String, String>,
    /// Rolled-up counts over [`TestSummary::tests`].
    pub metrics: Metrics,
}

/// The report document written to disk at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// When the report was generated.
    pub timestamp: chrono::DateTime<Utc>,
    /// The tallied test results.
    pub tests: TestSummary,
    /// True iff at least one test ran and none failed.
    pub success: bool,
}

/// Failure modes while aggregating or persisting a report.
#[derive(Debug, Error)]
pub enum TestReportError {
    /// Writing a report file or its parent directories failed.
    #[error("failed to write report to {path}: {source}")]
    Write {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Serializing the report document failed.
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Parses a stream of newline-delimited JSON test events, tallying each
/// recognized `{test, pass|fail}` pair. Lines that fail to parse, or whose
/// `test` field is empty, are silently skipped -- the aggregator only cares
/// about events it understands.
pub fn summarize<R: BufRead>(reader: R) -> TestSummary {
    let mut tests: BTreeMap<String, String> = BTreeMap::new();

    for line in reader.lines() {
        let Ok(line) = line else { continue };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<TestEvent>(&line) else {
            continue;
        };

        let Some(test) = event.test.filter(|t| !t.is_empty()) else {
            continue;
        };

        match event.action.as_str() {
            "pass" => {
                let _ = tests.insert(test, "PASSED".to_owned());
            }
            "fail" => {
                let _ = tests.insert(test, "FAILED".to_owned());
            }
            _ => {}
        }
    }

    let passed = tests.values().filter(|v| v.as_str() == "PASSED").count() as u64;
    let failed = tests.values().filter(|v| v.as_str() == "FAILED").count() as u64;

    TestSummary {
        metrics: Metrics {
            total: tests.len() as u64,
            passed,
            failed,
        },
        tests,
    }
}

/// Builds a [`Report`] from a [`TestSummary`], stamped with the current time.
pub fn build_report(tests: TestSummary) -> Report {
    let success = tests.metrics.failed == 0 && tests.metrics.total > 0;
    Report {
        timestamp: Utc::now(),
        tests,
        success,
    }
}

/// Resolves the configured report root: `TEST_REPORT_ROOT` if set, else the
/// parent of the current working directory.
pub fn resolve_root() -> PathBuf {
    std::env::var_os("TEST_REPORT_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(default_root)
}

/// Persists `report` under `root`, both at a timestamped path
/// (`<root>/<date>/<time>/report.json`) and at the rolling
/// `<root>/report.json`. Directories are created mode `0755`, files mode
/// `0644`.
pub fn persist(report: &Report, root: &Path) -> Result<(), TestReportError> {
    let body = serde_json::to_vec_pretty(report)?;

    let dated_dir = root
        .join(report.timestamp.format("%Y-%m-%d").to_string())
        .join(report.timestamp.format("%H-%M-%S").to_string());
    let dated_path = dated_dir.join("report.json");
    let rolling_path = root.join("report.json");

    write_with_modes(&dated_dir, &dated_path, &body)?;
    write_with_modes(root, &rolling_path, &body)?;

    Ok(())
}

fn write_with_modes(dir: &Path, file: &Path, body: &[u8]) -> Result<(), TestReportError> {
    fs::create_dir_all(dir).map_err(|source| TestReportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    fs::write(file, body).map_err(|source| TestReportError::Write {
        path: file.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755)).map_err(|source| {
            TestReportError::Write {
                path: dir.to_path_buf(),
                source,
            }
        })?;
        fs::set_permissions(file, fs::Permissions::from_mode(0o644)).map_err(|source| {
            TestReportError::Write {
                path: file.to_path_buf(),
                source,
            }
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn summarize_tallies_pass_and_fail_by_test_name() {
        let input = concat!(
            r#"{"Action":"run","Test":"pkg.TestA"}"#, "\n",
            r#"{"Action":"pass","Test":"pkg.TestA"}"#, "\n",
            r#"{"Action":"fail","Test":"pkg.TestB"}"#, "\n",
            r#"not json at all"#, "\n",
            r#"{"Action":"output","Test":""}"#, "\n",
        );
        let summary = summarize(Cursor::new(input));

        assert_eq!(summary.metrics.total, 2);
        assert_eq!(summary.metrics.passed, 1);
        assert_eq!(summary.metrics.failed, 1);
        assert_eq!(summary.tests.get("pkg.TestA").map(String::as_str), Some("PASSED"));
        assert_eq!(summary.tests.get("pkg.TestB").map(String::as_str), Some("FAILED"));
    }

    #[test]
    fn build_report_requires_at_least_one_test_to_succeed() {
        let empty = build_report(TestSummary::default());
        assert!(!empty.success);

        let mut tests = TestSummary::default();
        let _ = tests.tests.insert("pkg.TestA".to_owned(), "PASSED".to_owned());
        tests.metrics = Metrics { total: 1, passed: 1, failed: 0 };
        let report = build_report(tests);
        assert!(report.success);
    }

    #[test]
    fn persist_writes_both_timestamped_and_rolling_paths() {
        let dir = std::env::temp_dir().join(format!("discount-engine-test-report-{}", std::process::id()));
        let report = build_report({
            let mut tests = TestSummary::default();
            let _ = tests.tests.insert("pkg.TestA".to_owned(), "PASSED".to_owned());
            tests.metrics = Metrics { total: 1, passed: 1, failed: 0 };
            tests
        });

        persist(&report, &dir).expect("persist should succeed");

        let rolling = dir.join("report.json");
        assert!(rolling.exists());

        let dated = dir
            .join(report.timestamp.format("%Y-%m-%d").to_string())
            .join(report.timestamp.format("%H-%M-%S").to_string())
            .join("report.json");
        assert!(dated.exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
