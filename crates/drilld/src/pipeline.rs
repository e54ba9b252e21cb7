//! Continue/retry/stop decisions taken at suite boundaries.

use drill_core::{Issue, PipelineConfig, PipelineOutcome};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::issue_tracker::IssueTracker;

#[derive(Debug, Clone)]
pub struct PipelineController {
    config: PipelineConfig,
    tracker: IssueTracker,
    attempts: HashMap<String, u32>,
    critical_count: usize,
    retries_used: u32,
    active: bool,
    stopped_early: bool,
    stop_reason: Option<String>,
}

impl PipelineController {
    pub fn new(config: PipelineConfig) -> Self {
        let tracker = IssueTracker::new(config.auto_address_issues);
        Self {
            config,
            tracker,
            attempts: HashMap::new(),
            critical_count: 0,
            retries_used: 0,
            active: false,
            stopped_early: false,
            stop_reason: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &IssueTracker {
        &self.tracker
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start(&mut self) {
        self.tracker.clear();
        self.attempts.clear();
        self.critical_count = 0;
        self.retries_used = 0;
        self.stopped_early = false;
        self.stop_reason = None;
        self.active = true;
    }

    /// Records the failure and decides whether the run may go on. The count
    /// is absolute over the run; the threshold is exclusive.
    pub fn should_continue(&mut self, test: &str, suite: &str, error: &str) -> bool {
        let issue = self.tracker.record(test, suite, error);
        info!(
            issue = %issue.id,
            test,
            suite,
            severity = %issue.severity,
            category = issue.category.as_str(),
            "issue recorded"
        );
        self.critical_count += 1;

        if self.config.stop_on_critical_issues
            && self.critical_count > self.config.critical_issue_threshold
        {
            self.stop(format!(
                "critical issue threshold exceeded ({} > {})",
                self.critical_count, self.config.critical_issue_threshold
            ));
            return false;
        }
        true
    }

    /// Grants a retry while the test has attempts left, after waiting out the
    /// configured delay.
    pub async fn handle_failure(&mut self, test: &str, suite: &str, error: &str) -> bool {
        let max_retries = self.config.max_retries;
        self.handle_failure_within(test, suite, error, max_retries)
            .await
    }

    /// Same as [`handle_failure`](Self::handle_failure) with a per-suite
    /// retry budget in place of `max_retries`.
    pub async fn handle_failure_within(
        &mut self,
        test: &str,
        suite: &str,
        error: &str,
        max_retries: u32,
    ) -> bool {
        let attempts = self.attempts.entry(test.to_string()).or_insert(0);
        if *attempts >= max_retries {
            info!(test, suite, attempts = *attempts, "retries exhausted");
            return false;
        }
        *attempts += 1;
        let attempt = *attempts;
        self.retries_used += 1;
        info!(
            test,
            suite,
            attempt,
            max_retries,
            error,
            "retrying after failure"
        );

        let delay = self.config.retry_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        true
    }

    pub fn attempts_for(&self, test: &str) -> u32 {
        self.attempts.get(test).copied().unwrap_or(0)
    }

    pub fn stop(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "pipeline stopped");
        self.stopped_early = true;
        self.stop_reason = Some(reason);
        self.active = false;
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub fn last_issue(&self) -> Option<&Issue> {
        self.tracker.last()
    }

    pub fn result(&self) -> PipelineOutcome {
        PipelineOutcome {
            issues_raised: self.tracker.len(),
            retries_used: self.retries_used,
            stopped_early: self.stopped_early,
            stop_reason: self.stop_reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(threshold: usize, stop: bool) -> PipelineConfig {
        PipelineConfig {
            fail_fast: false,
            max_retries: 2,
            retry_delay_ms: 1_000,
            auto_address_issues: false,
            critical_issue_threshold: threshold,
            stop_on_critical_issues: stop,
        }
    }

    #[test]
    fn fourth_failure_over_threshold_three_stops_the_run() {
        let mut pipeline = PipelineController::new(config(3, true));
        pipeline.start();
        for idx in 0..3 {
            assert!(pipeline.should_continue(&format!("t{idx}"), "suite", "boom"));
        }
        assert!(!pipeline.should_continue("t3", "suite", "boom"));

        let outcome = pipeline.result();
        assert_eq!(outcome.issues_raised, 4);
        assert!(outcome.stopped_early);
        assert!(outcome
            .stop_reason
            .is_some_and(|reason| reason.contains("threshold")));
        assert!(!pipeline.is_active());
    }

    #[test]
    fn threshold_is_ignored_when_stopping_is_disabled() {
        let mut pipeline = PipelineController::new(config(3, false));
        pipeline.start();
        for idx in 0..10 {
            assert!(pipeline.should_continue(&format!("t{idx}"), "suite", "boom"));
        }
        assert!(!pipeline.result().stopped_early);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_failure_grants_max_retries_then_refuses() {
        let mut pipeline = PipelineController::new(config(5, true));
        pipeline.start();

        let started = tokio::time::Instant::now();
        assert!(pipeline.handle_failure("layers", "map", "boom").await);
        assert!(pipeline.handle_failure("layers", "map", "boom").await);
        assert!(!pipeline.handle_failure("layers", "map", "boom").await);
        assert!(started.elapsed() >= Duration::from_millis(2_000));

        assert_eq!(pipeline.attempts_for("layers"), 2);
        assert!(pipeline.handle_failure("routes", "map", "boom").await);
        assert_eq!(pipeline.result().retries_used, 3);
    }

    #[tokio::test]
    async fn suite_budget_replaces_max_retries() {
        let mut pipeline = PipelineController::new(PipelineConfig {
            max_retries: 0,
            retry_delay_ms: 0,
            ..config(5, true)
        });
        pipeline.start();

        assert!(!pipeline.handle_failure("tiles", "map", "boom").await);
        assert!(pipeline.handle_failure_within("tiles", "map", "boom", 1).await);
        assert!(!pipeline.handle_failure_within("tiles", "map", "boom", 1).await);
        assert_eq!(pipeline.result().retries_used, 1);
    }

    #[test]
    fn start_resets_counters_and_issues() {
        let mut pipeline = PipelineController::new(config(0, true));
        pipeline.start();
        assert!(!pipeline.should_continue("t", "s", "boom"));

        pipeline.start();
        assert!(pipeline.is_active());
        assert_eq!(pipeline.result(), PipelineOutcome::default());
        assert!(pipeline.tracker().is_empty());
    }
}
