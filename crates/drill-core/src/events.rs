use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EventId, IssueSeverity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        suites: usize,
    },
    SuiteStarted,
    TestFinished {
        test: String,
        success: bool,
        duration_ms: u64,
    },
    SuiteFinished {
        success: bool,
        skipped: usize,
    },
    IssueRaised {
        issue_id: String,
        test: String,
        severity: IssueSeverity,
    },
    RetryScheduled {
        test: String,
        attempt: u32,
    },
    PipelineStopped {
        reason: String,
    },
    ChaosActivated {
        scenario: String,
    },
    ChaosRestored {
        scenario: String,
    },
    ReportWritten {
        path: String,
    },
    ReportWriteFailed {
        message: String,
    },
    RunFinished {
        passed: usize,
        failed: usize,
        skipped: usize,
    },
}

impl EventKind {
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::RunStarted { .. } => "run_started",
            EventKind::SuiteStarted => "suite_started",
            EventKind::TestFinished { .. } => "test_finished",
            EventKind::SuiteFinished { .. } => "suite_finished",
            EventKind::IssueRaised { .. } => "issue_raised",
            EventKind::RetryScheduled { .. } => "retry_scheduled",
            EventKind::PipelineStopped { .. } => "pipeline_stopped",
            EventKind::ChaosActivated { .. } => "chaos_activated",
            EventKind::ChaosRestored { .. } => "chaos_restored",
            EventKind::ReportWritten { .. } => "report_written",
            EventKind::ReportWriteFailed { .. } => "report_write_failed",
            EventKind::RunFinished { .. } => "run_finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub suite: Option<String>,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(id: EventId, suite: Option<&str>, kind: EventKind) -> Self {
        Self {
            id,
            suite: suite.map(str::to_string),
            at: Utc::now(),
            kind,
        }
    }
}
