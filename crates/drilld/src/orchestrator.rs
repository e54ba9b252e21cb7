//! Runs suites of commands and folds their results into a `TestReport`.
//!
//! Commands of a suite run sequentially, or in batches of at most
//! `max_concurrency` joined on the current task when the suite is parallel.
//! Each command races its deadline; errors and panics become failing results.
//! The pipeline controller is consulted once per failed suite round.

use drill_chaos::{ChaosEngine, ChaosTransition, NetworkPort};
use drill_core::{EventKind, OrchestratorConfig, TestReport, TestResult, TestSuiteResult};
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandContext};
use crate::event_log::EventRecorder;
use crate::pipeline::PipelineController;
use crate::report::{build_report, write_report};

/// A named group of commands with optional overrides of the orchestrator
/// defaults.
#[derive(Clone)]
pub struct TestSuite {
    pub name: String,
    pub commands: Vec<Arc<dyn Command>>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub fail_fast: Option<bool>,
    pub parallel: Option<bool>,
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite")
            .field("name", &self.name)
            .field("commands", &self.command_names())
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("fail_fast", &self.fail_fast)
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
            timeout: None,
            retries: None,
            fail_fast: None,
            parallel: None,
        }
    }

    pub fn with_command(mut self, command: impl Command + 'static) -> Self {
        self.commands.push(Arc::new(command));
        self
    }

    pub fn with_commands(mut self, commands: impl IntoIterator<Item = Arc<dyn Command>>) -> Self {
        self.commands.extend(commands);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = Some(fail_fast);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands
            .iter()
            .map(|command| command.name().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct SuiteSettings {
    parallel: bool,
    fail_fast: bool,
    timeout: Duration,
    max_concurrency: usize,
    retries: u32,
}

/// Outcome of one pass over a set of commands, keyed by declaration index.
#[derive(Default)]
struct Round {
    results: BTreeMap<usize, TestResult>,
    skipped: Vec<usize>,
}

pub struct TestOrchestrator {
    config: OrchestratorConfig,
    pipeline: PipelineController,
    network: Arc<dyn NetworkPort>,
    events: EventRecorder,
    report_path: Option<PathBuf>,
    chaos: Option<Arc<ChaosEngine>>,
}

impl TestOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        pipeline: PipelineController,
        network: Arc<dyn NetworkPort>,
    ) -> Self {
        Self {
            config,
            pipeline,
            network,
            events: EventRecorder::disabled(),
            report_path: None,
            chaos: None,
        }
    }

    pub fn with_events(mut self, events: EventRecorder) -> Self {
        self.events = events;
        self
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Chaos transitions are copied into the event log after every suite.
    pub fn with_chaos(mut self, chaos: Arc<ChaosEngine>) -> Self {
        self.chaos = Some(chaos);
        self
    }

    pub fn pipeline(&self) -> &PipelineController {
        &self.pipeline
    }

    pub async fn run_suites(&mut self, suites: &[TestSuite]) -> TestReport {
        let started = Instant::now();
        self.pipeline.start();
        self.events.emit(None, EventKind::RunStarted { suites: suites.len() });
        info!(suites = suites.len(), "test run started");

        let mut results = Vec::with_capacity(suites.len());
        let mut halted: Option<String> = None;
        for suite in suites {
            if let Some(reason) = &halted {
                debug!(suite = %suite.name, "suite not run after pipeline stop");
                results.push(TestSuiteResult::not_run(
                    &suite.name,
                    suite.command_names(),
                    reason.clone(),
                ));
                continue;
            }
            let (result, stop) = self.run_suite(suite).await;
            results.push(result);
            self.drain_chaos_events();
            if stop.is_some() {
                halted = stop;
            }
        }

        let total_duration = started.elapsed().as_millis() as u64;
        let report = build_report(
            results,
            self.pipeline.result(),
            self.pipeline.tracker().issues().to_vec(),
            total_duration,
        );
        self.events.emit(
            None,
            EventKind::RunFinished {
                passed: report.passed_tests,
                failed: report.failed_tests,
                skipped: report.skipped_tests,
            },
        );
        info!(
            total = report.total_tests,
            passed = report.passed_tests,
            failed = report.failed_tests,
            skipped = report.skipped_tests,
            success_rate = report.summary.success_rate,
            "test run finished"
        );
        self.persist(&report);
        report
    }

    fn persist(&self, report: &TestReport) {
        let Some(path) = &self.report_path else {
            return;
        };
        match write_report(path, report) {
            Ok(()) => {
                info!(path = %path.display(), "report written");
                self.events.emit(
                    None,
                    EventKind::ReportWritten {
                        path: path.display().to_string(),
                    },
                );
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to write report");
                self.events.emit(
                    None,
                    EventKind::ReportWriteFailed {
                        message: err.to_string(),
                    },
                );
            }
        }
    }

    fn settings(&self, suite: &TestSuite) -> SuiteSettings {
        SuiteSettings {
            parallel: suite.parallel.unwrap_or(self.config.parallel),
            fail_fast: suite.fail_fast.unwrap_or(self.config.fail_fast),
            timeout: suite.timeout.unwrap_or_else(|| self.config.timeout()),
            max_concurrency: self.config.max_concurrency.max(1),
            retries: suite
                .retries
                .or(self.config.retries)
                .unwrap_or(self.pipeline.config().max_retries),
        }
    }

    /// Returns the suite result and, when the pipeline must stop, the reason.
    async fn run_suite(&mut self, suite: &TestSuite) -> (TestSuiteResult, Option<String>) {
        let settings = self.settings(suite);
        let ctx = CommandContext {
            base_url: self.config.base_url.clone(),
            timeout: settings.timeout,
            retries: settings.retries,
            fail_fast: settings.fail_fast,
            network: Arc::clone(&self.network),
        };
        let suite_name = suite.name.as_str();
        self.events.emit(Some(suite_name), EventKind::SuiteStarted);
        info!(
            suite = suite_name,
            commands = suite.commands.len(),
            parallel = settings.parallel,
            fail_fast = settings.fail_fast,
            retries = settings.retries,
            "suite started"
        );

        let started = Instant::now();
        let all: Vec<(usize, Arc<dyn Command>)> =
            suite.commands.iter().cloned().enumerate().collect();
        let mut round = self.execute(suite_name, &all, &ctx, settings).await;
        let mut attempts = 1;
        let mut stop = None;

        loop {
            let failed: Vec<usize> = round
                .results
                .iter()
                .filter(|(_, result)| !result.success)
                .map(|(idx, _)| *idx)
                .collect();
            let Some(&first_failed) = failed.first() else {
                break;
            };
            let first_name = round.results[&first_failed].name.clone();
            let error = failed
                .iter()
                .flat_map(|idx| round.results[idx].errors.iter().cloned())
                .collect::<Vec<_>>()
                .join("; ");

            let keep_going = self.pipeline.should_continue(&first_name, suite_name, &error);
            if let Some(issue) = self.pipeline.last_issue() {
                self.events.emit(
                    Some(suite_name),
                    EventKind::IssueRaised {
                        issue_id: issue.id.clone(),
                        test: issue.test_name.clone(),
                        severity: issue.severity,
                    },
                );
            }
            if !keep_going {
                stop = self.pipeline.stop_reason().map(str::to_string);
                break;
            }

            if self
                .pipeline
                .handle_failure_within(&first_name, suite_name, &error, settings.retries)
                .await
            {
                attempts += 1;
                self.events.emit(
                    Some(suite_name),
                    EventKind::RetryScheduled {
                        test: first_name.clone(),
                        attempt: self.pipeline.attempts_for(&first_name),
                    },
                );
                // Failed and fail-fast-skipped commands get another go, in order.
                let mut rerun: Vec<usize> = failed;
                rerun.extend(round.skipped.iter().copied());
                rerun.sort_unstable();
                let retry: Vec<(usize, Arc<dyn Command>)> = rerun
                    .into_iter()
                    .map(|idx| (idx, Arc::clone(&suite.commands[idx])))
                    .collect();
                let again = self.execute(suite_name, &retry, &ctx, settings).await;
                round.results.extend(again.results);
                round.skipped = again.skipped;
                continue;
            }

            if self.pipeline.config().fail_fast {
                let reason = format!("suite {suite_name} failed with no retries left");
                self.pipeline.stop(reason.clone());
                stop = Some(reason);
            }
            break;
        }

        let skipped: Vec<String> = round
            .skipped
            .iter()
            .map(|idx| suite.commands[*idx].name().to_string())
            .collect();
        let result = TestSuiteResult::new(
            suite_name,
            round.results.into_values().collect(),
            skipped,
            started.elapsed().as_millis() as u64,
            attempts,
        );
        self.events.emit(
            Some(suite_name),
            EventKind::SuiteFinished {
                success: result.success,
                skipped: result.skipped.len(),
            },
        );
        info!(
            suite = suite_name,
            success = result.success,
            passed = result.passed_count(),
            tests = result.tests.len(),
            skipped = result.skipped.len(),
            attempts,
            "suite finished"
        );
        if let Some(reason) = &stop {
            self.events.emit(
                Some(suite_name),
                EventKind::PipelineStopped {
                    reason: reason.clone(),
                },
            );
        }
        (result, stop)
    }

    async fn execute(
        &self,
        suite: &str,
        commands: &[(usize, Arc<dyn Command>)],
        ctx: &CommandContext,
        settings: SuiteSettings,
    ) -> Round {
        let mut round = Round::default();
        let batch_size = if settings.parallel && commands.len() > 1 {
            settings.max_concurrency.min(commands.len())
        } else {
            1
        };

        let mut failed = false;
        for batch in commands.chunks(batch_size) {
            if failed && settings.fail_fast {
                round.skipped.extend(batch.iter().map(|(idx, _)| *idx));
                continue;
            }
            debug!(suite, size = batch.len(), "starting batch");
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|(_, command)| run_command(command.as_ref(), ctx, settings.timeout)),
            )
            .await;
            for ((idx, _), result) in batch.iter().zip(outcomes) {
                failed |= !result.success;
                self.events.emit(
                    Some(suite),
                    EventKind::TestFinished {
                        test: result.name.clone(),
                        success: result.success,
                        duration_ms: result.duration_ms,
                    },
                );
                round.results.insert(*idx, result);
            }
        }
        if !round.skipped.is_empty() {
            info!(suite, skipped = round.skipped.len(), "fail-fast skipped remaining commands");
        }
        round
    }

    fn drain_chaos_events(&self) {
        let Some(chaos) = &self.chaos else {
            return;
        };
        for transition in chaos.take_transitions() {
            let kind = match transition {
                ChaosTransition::Activated { scenario, .. } => EventKind::ChaosActivated { scenario },
                ChaosTransition::Restored { scenario, .. } => EventKind::ChaosRestored { scenario },
            };
            self.events.emit(None, kind);
        }
    }
}

/// Runs one command under its deadline. Never fails: errors, panics and
/// timeouts come back as failing results named after the command.
pub async fn run_command(command: &dyn Command, ctx: &CommandContext, timeout: Duration) -> TestResult {
    let started = Instant::now();
    let name = command.name().to_string();
    let guarded = AssertUnwindSafe(command.run(ctx)).catch_unwind();
    let outcome = tokio::time::timeout(timeout, guarded).await;
    let elapsed = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(Ok(mut result))) => {
            if result.duration_ms == 0 {
                result.duration_ms = elapsed;
            }
            result
        }
        Ok(Ok(Err(err))) => {
            warn!(command = %name, error = %err, "command could not run");
            TestResult::failed(name, elapsed, format!("command error: {err}"))
        }
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            warn!(command = %name, panic = %message, "command panicked");
            TestResult::failed(name, elapsed, format!("command panicked: {message}"))
        }
        Err(_) => {
            warn!(command = %name, timeout_ms = timeout.as_millis() as u64, "command timed out");
            TestResult::failed(
                name,
                elapsed,
                format!("timed out after {}ms", timeout.as_millis()),
            )
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
