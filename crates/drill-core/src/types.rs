//! Result and report types shared by every harness crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Bumped whenever the report layout changes in a way readers must notice.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a single command execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TestResult {
    pub fn passed(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            success: true,
            duration_ms,
            errors: Vec::new(),
            warnings: Vec::new(),
            artifacts: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn failed(name: impl Into<String>, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Self::passed(name, duration_ms)
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifacts.push(path.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

/// Aggregate of one suite run. Children are never mutated once collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub tests: Vec<TestResult>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Commands that were never started because of fail-fast or a pipeline stop.
    #[serde(default)]
    pub skipped: Vec<String>,
    /// Number of times the suite (or its failing commands) was executed.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl TestSuiteResult {
    pub fn new(
        name: impl Into<String>,
        tests: Vec<TestResult>,
        skipped: Vec<String>,
        duration_ms: u64,
        attempts: u32,
    ) -> Self {
        let success = skipped.is_empty() && tests.iter().all(|test| test.success);
        let errors = tests
            .iter()
            .filter(|test| !test.success)
            .flat_map(|test| {
                test.errors
                    .iter()
                    .map(move |err| format!("{}: {err}", test.name))
            })
            .collect();
        Self {
            name: name.into(),
            success,
            duration_ms,
            tests,
            errors,
            skipped,
            attempts,
        }
    }

    /// A suite that was never started; every command is reported as skipped.
    pub fn not_run(name: impl Into<String>, skipped: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            duration_ms: 0,
            tests: Vec::new(),
            errors: vec![reason.into()],
            skipped,
            attempts: 0,
        }
    }

    pub fn failed_tests(&self) -> impl Iterator<Item = &TestResult> {
        self.tests.iter().filter(|test| !test.success)
    }

    pub fn passed_count(&self) -> usize {
        self.tests.iter().filter(|test| test.success).count()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl IssueSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueSeverity::Low => "low",
            IssueSeverity::Medium => "medium",
            IssueSeverity::High => "high",
            IssueSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Network,
    Timeout,
    Rendering,
    Assertion,
    Resource,
    Data,
    #[default]
    Unknown,
}

impl IssueCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCategory::Network => "network",
            IssueCategory::Timeout => "timeout",
            IssueCategory::Rendering => "rendering",
            IssueCategory::Assertion => "assertion",
            IssueCategory::Resource => "resource",
            IssueCategory::Data => "data",
            IssueCategory::Unknown => "unknown",
        }
    }
}

/// Structured failure record kept for the lifetime of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub test_name: String,
    pub suite_name: String,
    pub message: String,
    pub severity: IssueSeverity,
    #[serde(default)]
    pub category: IssueCategory,
    #[serde(default)]
    pub remediation: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of the pipeline controller's decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub issues_raised: usize,
    pub retries_used: u32,
    pub stopped_early: bool,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub success_rate: f64,
    pub average_duration: f64,
    pub fastest_test: Option<String>,
    pub slowest_test: Option<String>,
}

/// Terminal document of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub schema_version: u32,
    pub timestamp: DateTime<Utc>,
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    pub skipped_tests: usize,
    pub total_duration: u64,
    pub suites: Vec<TestSuiteResult>,
    pub summary: ReportSummary,
    pub pipeline_result: PipelineOutcome,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl TestReport {
    pub fn is_green(&self) -> bool {
        self.failed_tests == 0
    }
}
