//! TOML suite definitions.
//!
//! ```toml
//! [[suites]]
//! name = "backend"
//! parallel = true
//! chaos = ["slow-api"]
//!
//! [[suites.commands]]
//! kind = "http"
//! name = "health"
//! path = "/api/validation/health"
//! ```
//!
//! Relative paths (shell `cwd`, payload files, component maps) resolve
//! against the directory holding the suite file.

use drill_chaos::ChaosEngine;
use drill_map::{load_component_map, MapError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::chaos_command::ChaosCommand;
use crate::command::{Command, ShellCommand};
use crate::component_command::{component_commands, DEFAULT_COMBINATION_LIMIT, DEFAULT_RENDER_PATH};
use crate::http_client::HttpCheckCommand;
use crate::layers::LayerValidationCommand;
use crate::orchestrator::TestSuite;
use crate::validation_api::{ValidationApiCommand, ValidationCheck};

#[derive(Debug, thiserror::Error)]
pub enum SuiteFileError {
    #[error("failed to read suite file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse suite file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("suite #{index} has an empty name")]
    EmptySuiteName { index: usize },
    #[error("suite {suite} is defined more than once")]
    DuplicateSuite { suite: String },
    #[error("command #{index} of suite {suite} has an empty name")]
    EmptyCommandName { suite: String, index: usize },
    #[error("suite {suite} names unknown chaos scenario {scenario}")]
    UnknownScenario { suite: String, scenario: String },
    #[error("failed to read payload {path} for command {command}: {source}")]
    ReadPayload {
        command: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("payload {path} for command {command} is not valid json: {source}")]
    ParsePayload {
        command: String,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("component map for command {command}: {source}")]
    ComponentMap {
        command: String,
        #[source]
        source: MapError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteFile {
    #[serde(default)]
    pub suites: Vec<SuiteSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteSpec {
    pub name: String,
    #[serde(default)]
    pub parallel: Option<bool>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub fail_fast: Option<bool>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub chaos: Vec<String>,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    Health,
    Comprehensive,
    Compare,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandSpec {
    Shell {
        name: String,
        run: String,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    Http {
        name: String,
        path: String,
        #[serde(default = "default_expect_status")]
        expect_status: u16,
    },
    Validation {
        name: String,
        check: ValidationKind,
        /// JSON file POSTed by `compare`; `{}` when absent.
        #[serde(default)]
        payload: Option<PathBuf>,
    },
    Layers {
        name: String,
        payload: PathBuf,
        #[serde(default)]
        expect: Vec<String>,
    },
    /// Expands into one render command per prop combination of every
    /// component in `map`.
    Component {
        name: String,
        map: PathBuf,
        #[serde(default = "default_render_path")]
        path: String,
        #[serde(default = "default_combination_limit")]
        limit: usize,
        #[serde(default)]
        components: Vec<String>,
    },
}

fn default_expect_status() -> u16 {
    200
}

fn default_render_path() -> String {
    DEFAULT_RENDER_PATH.to_string()
}

fn default_combination_limit() -> usize {
    DEFAULT_COMBINATION_LIMIT
}

impl CommandSpec {
    pub fn name(&self) -> &str {
        match self {
            CommandSpec::Shell { name, .. }
            | CommandSpec::Http { name, .. }
            | CommandSpec::Validation { name, .. }
            | CommandSpec::Layers { name, .. }
            | CommandSpec::Component { name, .. } => name,
        }
    }
}

pub fn parse_suite_file(contents: &str) -> Result<SuiteFile, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_suite_file(path: impl AsRef<Path>) -> Result<SuiteFile, SuiteFileError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| SuiteFileError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_suite_file(&body).map_err(|source| SuiteFileError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

/// How suite commands reach the chaos engine.
#[derive(Debug, Clone)]
pub struct ChaosWiring {
    pub engine: Arc<ChaosEngine>,
    /// Route every command through the fault plane, not only those of suites
    /// that list scenarios. Needed when the random trigger loop is running.
    pub route_all: bool,
}

/// Turns parsed specs into runnable suites. Commands of suites that list
/// chaos scenarios are wrapped in a [`ChaosCommand`]; without wiring the
/// scenarios are ignored with a warning.
pub fn build_suites(
    file: &SuiteFile,
    base_dir: &Path,
    chaos: Option<&ChaosWiring>,
) -> Result<Vec<TestSuite>, SuiteFileError> {
    let mut seen = HashSet::new();
    let mut suites = Vec::with_capacity(file.suites.len());

    for (index, spec) in file.suites.iter().enumerate() {
        if spec.name.trim().is_empty() {
            return Err(SuiteFileError::EmptySuiteName { index });
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(SuiteFileError::DuplicateSuite {
                suite: spec.name.clone(),
            });
        }

        let engine = match chaos {
            Some(wiring) => {
                for scenario in &spec.chaos {
                    let known = wiring
                        .engine
                        .available_scenarios()
                        .iter()
                        .any(|candidate| &candidate.name == scenario);
                    if !known {
                        return Err(SuiteFileError::UnknownScenario {
                            suite: spec.name.clone(),
                            scenario: scenario.clone(),
                        });
                    }
                }
                (wiring.route_all || !spec.chaos.is_empty()).then(|| Arc::clone(&wiring.engine))
            }
            None => {
                if !spec.chaos.is_empty() {
                    warn!(suite = %spec.name, "suite lists chaos scenarios but chaos is unavailable");
                }
                None
            }
        };

        let mut suite = TestSuite::new(&spec.name);
        suite.parallel = spec.parallel;
        suite.fail_fast = spec.fail_fast;
        suite.retries = spec.retries;
        suite.timeout = spec.timeout_ms.map(Duration::from_millis);

        for (command_index, command) in spec.commands.iter().enumerate() {
            if command.name().trim().is_empty() {
                return Err(SuiteFileError::EmptyCommandName {
                    suite: spec.name.clone(),
                    index: command_index,
                });
            }
            for built in build_commands(command, base_dir)? {
                let built: Arc<dyn Command> = match &engine {
                    Some(engine) => Arc::new(ChaosCommand::new(
                        built,
                        Arc::clone(engine),
                        spec.chaos.clone(),
                    )),
                    None => built,
                };
                suite.commands.push(built);
            }
        }
        suites.push(suite);
    }
    Ok(suites)
}

fn build_commands(
    spec: &CommandSpec,
    base_dir: &Path,
) -> Result<Vec<Arc<dyn Command>>, SuiteFileError> {
    let command: Arc<dyn Command> = match spec {
        CommandSpec::Shell { name, run, cwd } => {
            let cwd = cwd
                .as_ref()
                .map_or_else(|| base_dir.to_path_buf(), |cwd| base_dir.join(cwd));
            Arc::new(ShellCommand::new(name, run, cwd))
        }
        CommandSpec::Http {
            name,
            path,
            expect_status,
        } => Arc::new(HttpCheckCommand::new(name, path).expecting(*expect_status)),
        CommandSpec::Validation {
            name,
            check,
            payload,
        } => {
            let check = match check {
                ValidationKind::Health => ValidationCheck::Health,
                ValidationKind::Comprehensive => ValidationCheck::Comprehensive,
                ValidationKind::Compare => ValidationCheck::Compare {
                    payload: match payload {
                        Some(path) => read_payload(name, &base_dir.join(path))?,
                        None => serde_json::json!({}),
                    },
                },
            };
            Arc::new(ValidationApiCommand::new(name, check))
        }
        CommandSpec::Layers {
            name,
            payload,
            expect,
        } => Arc::new(
            LayerValidationCommand::new(name, base_dir.join(payload)).expecting(expect.iter().cloned()),
        ),
        CommandSpec::Component {
            name,
            map,
            path,
            limit,
            components,
        } => {
            let map = load_component_map(base_dir.join(map)).map_err(|source| {
                SuiteFileError::ComponentMap {
                    command: name.clone(),
                    source,
                }
            })?;
            let commands = component_commands(name, &map, path, *limit, components);
            if commands.is_empty() {
                warn!(command = %name, "component map produced no render commands");
            }
            return Ok(commands
                .into_iter()
                .map(|command| Arc::new(command) as Arc<dyn Command>)
                .collect());
        }
    };
    Ok(vec![command])
}

fn read_payload(command: &str, path: &Path) -> Result<serde_json::Value, SuiteFileError> {
    let raw = fs::read_to_string(path).map_err(|source| SuiteFileError::ReadPayload {
        command: command.to_string(),
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| SuiteFileError::ParsePayload {
        command: command.to_string(),
        path: path.to_path_buf(),
        source,
    })
}
