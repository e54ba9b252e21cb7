//! Validation of harness configuration before a run starts.

use serde::{Deserialize, Serialize};

use crate::config::HarnessConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues
        .iter()
        .any(|issue| issue.level == ValidationLevel::Error)
}

impl Validate for HarnessConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.orchestrator.max_concurrency == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "orchestrator.max_concurrency.zero",
                message: "max_concurrency must be greater than zero".to_string(),
            });
        }

        if self.orchestrator.timeout_ms == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "orchestrator.timeout.zero",
                message: "command timeout of 0ms would fail every command".to_string(),
            });
        }

        let base_url = self.orchestrator.base_url.trim();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "orchestrator.base_url.invalid",
                message: format!("base_url {base_url:?} should start with http:// or https://"),
            });
        }

        if self.pipeline.stop_on_critical_issues && self.pipeline.critical_issue_threshold == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "pipeline.critical_issue_threshold.zero",
                message: "critical_issue_threshold is 0; the first failed suite stops the pipeline"
                    .to_string(),
            });
        }

        if self.pipeline.retry_delay_ms > 60_000 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "pipeline.retry_delay.high",
                message: format!(
                    "retry delay {}ms is above one minute; retries will dominate run time",
                    self.pipeline.retry_delay_ms
                ),
            });
        }

        if self.chaos.enabled && self.chaos.tick_ms == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "chaos.tick.zero",
                message: "chaos tick interval cannot be 0".to_string(),
            });
        }

        if !self.chaos.probability_scale.is_finite() || self.chaos.probability_scale < 0.0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "chaos.probability_scale.invalid",
                message: format!(
                    "probability_scale must be a finite non-negative number, got {}",
                    self.chaos.probability_scale
                ),
            });
        }

        if self.report.path.as_os_str().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "report.path.empty",
                message: "report path must not be empty".to_string(),
            });
        }

        if self.mapper.extensions.is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "mapper.extensions.empty",
                message: "no source extensions configured; component discovery finds nothing"
                    .to_string(),
            });
        }

        issues
    }
}
