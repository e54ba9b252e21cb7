//! Configuration for a harness run, loaded from `drill.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config at {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to create config parent directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub chaos: ChaosConfig,
    #[serde(default)]
    pub mapper: MapperConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub events: EventLogConfig,
}

/// Orchestrator-level defaults; suites may shadow `timeout_ms`, `retries`,
/// `fail_fast` and `parallel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "default_command_timeout_ms")]
    pub timeout_ms: u64,
    /// Retry budget per suite; falls back to `pipeline.max_retries`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            parallel: false,
            max_concurrency: default_max_concurrency(),
            fail_fast: false,
            timeout_ms: default_command_timeout_ms(),
            retries: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Fail-fast / retry policy consulted after every failed suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub auto_address_issues: bool,
    #[serde(default = "default_critical_issue_threshold")]
    pub critical_issue_threshold: usize,
    #[serde(default = "default_true")]
    pub stop_on_critical_issues: bool,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_critical_issue_threshold() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            auto_address_issues: false,
            critical_issue_threshold: default_critical_issue_threshold(),
            stop_on_critical_issues: true,
        }
    }
}

impl PipelineConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_chaos_tick_ms")]
    pub tick_ms: u64,
    /// Fixed seed for the trigger loop; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Restrict the registry to these scenario names. Empty keeps every scenario.
    #[serde(default)]
    pub scenarios: Vec<String>,
    /// Multiplier applied to every scenario probability (clamped to [0, 1]).
    #[serde(default = "default_probability_scale")]
    pub probability_scale: f64,
}

fn default_chaos_tick_ms() -> u64 {
    1_000
}

fn default_probability_scale() -> f64 {
    1.0
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_ms: default_chaos_tick_ms(),
            seed: None,
            scenarios: Vec::new(),
            probability_scale: default_probability_scale(),
        }
    }
}

impl ChaosConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperConfig {
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,
    #[serde(default = "default_component_map_path")]
    pub output: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
}

fn default_source_root() -> PathBuf {
    PathBuf::from("src")
}

fn default_component_map_path() -> PathBuf {
    PathBuf::from("test-results/component-map.json")
}

fn default_extensions() -> Vec<String> {
    ["tsx", "ts", "jsx", "js"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_exclude_dirs() -> Vec<String> {
    ["node_modules", "dist", "build", ".git", "__tests__"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            output: default_component_map_path(),
            extensions: default_extensions(),
            exclude_dirs: default_exclude_dirs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_path")]
    pub path: PathBuf,
}

fn default_report_path() -> PathBuf {
    PathBuf::from("test-results/drill-report.json")
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_report_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_event_root")]
    pub root: PathBuf,
}

fn default_event_root() -> PathBuf {
    PathBuf::from(".drill/events")
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: default_event_root(),
        }
    }
}

pub fn parse_harness_config(contents: &str) -> Result<HarnessConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_harness_config(path: impl AsRef<Path>) -> Result<HarnessConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_harness_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

/// Missing files fall back to defaults; unreadable or malformed files are errors.
pub fn load_harness_config_or_default(path: impl AsRef<Path>) -> Result<HarnessConfig, ConfigError> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Ok(HarnessConfig::default());
    }
    load_harness_config(path_ref)
}

pub fn save_harness_config(
    path: impl AsRef<Path>,
    config: &HarnessConfig,
) -> Result<(), ConfigError> {
    let path_ref = path.as_ref();
    if let Some(parent) = path_ref.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    let body = toml::to_string_pretty(config).map_err(|source| ConfigError::Serialize {
        path: path_ref.to_path_buf(),
        source,
    })?;
    fs::write(path_ref, body).map_err(|source| ConfigError::Write {
        path: path_ref.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_harness_config("").expect("parse empty config");
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.orchestrator.max_concurrency, 4);
        assert_eq!(config.pipeline.max_retries, 2);
        assert!(config.pipeline.stop_on_critical_issues);
        assert_eq!(config.chaos.tick(), Duration::from_secs(1));
    }

    #[test]
    fn partial_tables_keep_unspecified_defaults() {
        let config = parse_harness_config(
            r#"
[orchestrator]
base_url = "http://127.0.0.1:8080"
parallel = true
max_concurrency = 2
retries = 1

[pipeline]
max_retries = 0
critical_issue_threshold = 3

[chaos]
enabled = true
seed = 7
scenarios = ["network-timeout", "tile-404"]
"#,
        )
        .expect("parse config");

        assert_eq!(config.orchestrator.base_url, "http://127.0.0.1:8080");
        assert!(config.orchestrator.parallel);
        assert_eq!(config.orchestrator.timeout_ms, 30_000);
        assert_eq!(config.orchestrator.retries, Some(1));
        assert_eq!(config.pipeline.max_retries, 0);
        assert_eq!(config.pipeline.retry_delay_ms, 1_000);
        assert_eq!(config.chaos.seed, Some(7));
        assert_eq!(config.chaos.scenarios.len(), 2);
        assert_eq!(config.report.path, PathBuf::from("test-results/drill-report.json"));
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/drill.toml");
        let mut config = HarnessConfig::default();
        config.pipeline.auto_address_issues = true;
        config.mapper.source_root = PathBuf::from("frontend/src");

        save_harness_config(&path, &config).expect("save config");
        let loaded = load_harness_config(&path).expect("load config");
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_falls_back_to_defaults_but_parse_errors_surface() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.toml");
        let config = load_harness_config_or_default(&missing).expect("defaults");
        assert_eq!(config, HarnessConfig::default());

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[orchestrator\nparallel = true").expect("write broken");
        let err = load_harness_config_or_default(&broken).expect_err("parse should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse config"));
    }
}
