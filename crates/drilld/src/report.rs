use chrono::Utc;
use drill_core::{
    Issue, PipelineOutcome, ReportSummary, TestReport, TestResult, TestSuiteResult,
    REPORT_SCHEMA_VERSION,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to create report directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode report: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn build_report(
    suites: Vec<TestSuiteResult>,
    pipeline_result: PipelineOutcome,
    issues: Vec<Issue>,
    total_duration: u64,
) -> TestReport {
    let tests: Vec<&TestResult> = suites.iter().flat_map(|suite| suite.tests.iter()).collect();
    let total_tests = tests.len();
    let passed_tests = tests.iter().filter(|test| test.success).count();
    let skipped_tests = suites.iter().map(|suite| suite.skipped.len()).sum();

    let summary = ReportSummary {
        success_rate: ratio(passed_tests as f64 * 100.0, total_tests),
        average_duration: ratio(total_duration as f64, total_tests),
        fastest_test: extreme(&tests, |candidate, best| candidate < best),
        slowest_test: extreme(&tests, |candidate, best| candidate > best),
    };

    TestReport {
        schema_version: REPORT_SCHEMA_VERSION,
        timestamp: Utc::now(),
        total_tests,
        passed_tests,
        failed_tests: total_tests - passed_tests,
        skipped_tests,
        total_duration,
        suites,
        summary,
        pipeline_result,
        issues,
    }
}

fn ratio(numerator: f64, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        numerator / total as f64
    }
}

/// Linear scan; the first test seen keeps its place on ties.
fn extreme(tests: &[&TestResult], better: impl Fn(u64, u64) -> bool) -> Option<String> {
    let mut best: Option<&TestResult> = None;
    for test in tests {
        match best {
            Some(current) if !better(test.duration_ms, current.duration_ms) => {}
            _ => best = Some(*test),
        }
    }
    best.map(|test| test.name.clone())
}

pub fn write_report(path: impl AsRef<Path>, report: &TestReport) -> Result<(), ReportError> {
    let path_ref = path.as_ref();
    if let Some(parent) = path_ref.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| ReportError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    let body = serde_json::to_string_pretty(report).map_err(ReportError::Encode)?;
    fs::write(path_ref, body).map_err(|source| ReportError::Write {
        path: path_ref.to_path_buf(),
        source,
    })
}
