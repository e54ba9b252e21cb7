//! The unit of work the orchestrator schedules, plus the shell-backed command.

use async_trait::async_trait;
use drill_chaos::{NetworkError, NetworkPort};
use drill_core::TestResult;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const OUTPUT_TAIL_CHARS: usize = 2_000;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` produced non-utf8 {stream}: {source}")]
    NonUtf8Output {
        command: String,
        stream: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("failed to read payload {path}: {source}")]
    ReadPayload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Per-suite settings handed to every command of that suite.
#[derive(Clone)]
pub struct CommandContext {
    pub base_url: String,
    pub timeout: Duration,
    /// Retry budget the pipeline applies to this suite.
    pub retries: u32,
    pub fail_fast: bool,
    pub network: Arc<dyn NetworkPort>,
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("fail_fast", &self.fail_fast)
            .finish_non_exhaustive()
    }
}

impl CommandContext {
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn with_network(&self, network: Arc<dyn NetworkPort>) -> Self {
        Self {
            network,
            ..self.clone()
        }
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// A failing check is `Ok` with `success: false`. `Err` is reserved for
    /// the command being unable to run at all.
    async fn run(&self, ctx: &CommandContext) -> Result<TestResult, CommandError>;
}

/// Adapts a closure into a [`Command`].
pub struct FnCommand<F> {
    name: String,
    run: F,
}

impl<F> FnCommand<F> {
    pub fn new(name: impl Into<String>, run: F) -> Self {
        Self {
            name: name.into(),
            run,
        }
    }
}

#[async_trait]
impl<F, Fut> Command for FnCommand<F>
where
    F: Fn(CommandContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TestResult, CommandError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CommandContext) -> Result<TestResult, CommandError> {
        (self.run)(ctx.clone()).await
    }
}

/// Runs a command line through `<shell> -lc` and passes on exit status 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub name: String,
    pub command_line: String,
    pub cwd: PathBuf,
    pub shell_bin: String,
}

impl ShellCommand {
    pub fn new(name: impl Into<String>, command_line: impl Into<String>, cwd: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            command_line: command_line.into(),
            cwd: cwd.as_ref().to_path_buf(),
            shell_bin: "bash".to_string(),
        }
    }
}

#[async_trait]
impl Command for ShellCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &CommandContext) -> Result<TestResult, CommandError> {
        let started = Instant::now();
        if self.command_line.trim().is_empty() {
            return Ok(TestResult::passed(&self.name, 0)
                .with_warning("no command configured"));
        }

        let rendered = format!("{} -lc {}", self.shell_bin, self.command_line);
        // Dropped on timeout; the child must not outlive the orchestrator's deadline.
        let output = tokio::process::Command::new(&self.shell_bin)
            .arg("-lc")
            .arg(&self.command_line)
            .current_dir(&self.cwd)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                command: rendered.clone(),
                source,
            })?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let stdout = String::from_utf8(output.stdout).map_err(|source| {
            CommandError::NonUtf8Output {
                command: rendered.clone(),
                stream: "stdout",
                source,
            }
        })?;
        let stderr = String::from_utf8(output.stderr).map_err(|source| {
            CommandError::NonUtf8Output {
                command: rendered,
                stream: "stderr",
                source,
            }
        })?;

        let exit_code = output.status.code();
        let result = if output.status.success() {
            TestResult::passed(&self.name, duration_ms)
        } else {
            let detail = tail(stderr.trim(), OUTPUT_TAIL_CHARS);
            let status = exit_code.map_or_else(|| "signal".to_string(), |code| code.to_string());
            let message = if detail.is_empty() {
                format!("`{}` exited with {status}", self.command_line)
            } else {
                format!("`{}` exited with {status}: {detail}", self.command_line)
            };
            TestResult::failed(&self.name, duration_ms, message)
        };
        Ok(result
            .with_metadata("exitCode", serde_json::json!(exit_code))
            .with_metadata("stdout", serde_json::json!(tail(&stdout, OUTPUT_TAIL_CHARS))))
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}
