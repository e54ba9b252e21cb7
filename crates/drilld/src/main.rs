use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use drill_chaos::{ChaosEngine, ChaosError};
use drill_core::{
    has_errors, load_harness_config_or_default, save_harness_config, ConfigError, HarnessConfig,
    TestReport, Validate, ValidationIssue, ValidationLevel,
};
use drill_map::{generate_test_config, save_component_map, ComponentMapper, MapError};
use drilld::logging::init_tracing;
use drilld::{
    build_suites, load_suite_file, ChaosWiring, CommandError, EventRecorder, JsonlEventLog,
    PipelineController, ReqwestNetwork, SuiteFileError, TestOrchestrator,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_CONFIG_PATH: &str = "drill.toml";

#[derive(Debug, Parser)]
#[command(name = "drill", version, about = "Test-pipeline orchestration and fault injection")]
struct Cli {
    /// Harness configuration; defaults apply when the file does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Run the suites of a suite file and write a report.
    Run(RunArgs),
    /// Scan UI sources and write the component map.
    Map(MapArgs),
    /// List the registered chaos scenarios.
    Scenarios,
    /// Check the configuration and print every finding.
    ValidateConfig,
    /// Write a configuration file with every default spelled out.
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    suites: PathBuf,
    /// Overrides `[report] path`.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Overrides `[orchestrator] base_url`.
    #[arg(long)]
    base_url: Option<String>,
    /// Start the random trigger loop regardless of `[chaos] enabled`.
    #[arg(long)]
    chaos: bool,
    /// Keep a scenario active for the whole run, ignoring its duration.
    /// Repeatable.
    #[arg(long = "scenario")]
    scenarios: Vec<String>,
    #[arg(long)]
    no_events: bool,
}

#[derive(Debug, Args)]
struct MapArgs {
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    /// Print generated prop test inputs for every component as JSON.
    #[arg(long)]
    print_configs: bool,
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("failed to load config at {path}: {source}")]
    LoadConfig {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("failed to save config at {path}: {source}")]
    SaveConfig {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("config already exists at {path}; pass --force to overwrite")]
    ConfigExists { path: PathBuf },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("failed to start async runtime: {source}")]
    Runtime {
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode output as json: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
    #[error("run interrupted")]
    Interrupted,
    #[error(transparent)]
    SuiteFile(#[from] SuiteFileError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Chaos(#[from] ChaosError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("drill failed: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        CliCommand::InitConfig { force } => {
            init_config(&cli.config, force)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::ValidateConfig => {
            let config = load_config(&cli.config)?;
            let issues = config.validate();
            print_issues(&issues);
            if issues.is_empty() {
                println!("{}: ok", cli.config.display());
            }
            Ok(exit_code(!has_errors(&issues)))
        }
        CliCommand::Scenarios => {
            let config = load_config(&cli.config)?;
            list_scenarios(&config);
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Map(args) => {
            let config = load_checked_config(&cli.config)?;
            map_components(&config, args).context("component mapping failed")?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Run(args) => {
            let config = load_checked_config(&cli.config)?;
            let report = run_tests(config, args).context("test run failed")?;
            print_summary(&report);
            Ok(exit_code(report.failed_tests == 0))
        }
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn load_config(path: &Path) -> Result<HarnessConfig, MainError> {
    load_harness_config_or_default(path).map_err(|source| MainError::LoadConfig {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the config and refuses to go on when validation reports errors.
fn load_checked_config(path: &Path) -> Result<HarnessConfig, MainError> {
    let config = load_config(path)?;
    let issues = config.validate();
    for issue in &issues {
        if issue.level == ValidationLevel::Warning {
            warn!(code = issue.code, "{}", issue.message);
        }
    }
    if has_errors(&issues) {
        let messages = issues
            .iter()
            .filter(|issue| issue.level == ValidationLevel::Error)
            .map(|issue| format!("{} ({})", issue.message, issue.code))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(MainError::InvalidConfig(messages));
    }
    Ok(config)
}

fn init_config(path: &Path, force: bool) -> Result<(), MainError> {
    if path.exists() && !force {
        return Err(MainError::ConfigExists {
            path: path.to_path_buf(),
        });
    }
    save_harness_config(path, &HarnessConfig::default()).map_err(|source| {
        MainError::SaveConfig {
            path: path.to_path_buf(),
            source,
        }
    })?;
    println!("wrote {}", path.display());
    Ok(())
}

fn print_issues(issues: &[ValidationIssue]) {
    for issue in issues {
        let level = match issue.level {
            ValidationLevel::Error => "error",
            ValidationLevel::Warning => "warning",
        };
        println!("{level}: {} [{}]", issue.message, issue.code);
    }
}

fn list_scenarios(config: &HarnessConfig) {
    let engine = ChaosEngine::from_config(&config.chaos);
    for scenario in engine.available_scenarios() {
        println!(
            "{:<20} p={:<5.3} {:>6}ms  {}",
            scenario.name, scenario.probability, scenario.duration_ms, scenario.description
        );
    }
}

fn map_components(config: &HarnessConfig, args: MapArgs) -> Result<(), MainError> {
    let mut mapper_config = config.mapper.clone();
    if let Some(root) = args.root {
        mapper_config.source_root = root;
    }
    let output = args.output.unwrap_or_else(|| mapper_config.output.clone());

    let mut mapper = ComponentMapper::from_config(&mapper_config)?;
    let components = mapper.discover_components()?;
    save_component_map(&output, &mapper.to_map())?;
    info!(
        root = %mapper.root().display(),
        output = %output.display(),
        components = components.len(),
        "component map written"
    );
    println!(
        "mapped {} components into {}",
        components.len(),
        output.display()
    );

    if args.print_configs {
        let configs: Vec<_> = components.iter().map(generate_test_config).collect();
        let body =
            serde_json::to_string_pretty(&configs).map_err(|source| MainError::Encode { source })?;
        println!("{body}");
    }
    Ok(())
}

fn run_tests(mut config: HarnessConfig, args: RunArgs) -> Result<TestReport, MainError> {
    if let Some(base_url) = args.base_url {
        config.orchestrator.base_url = base_url;
    }
    let report_path = args.report.unwrap_or_else(|| config.report.path.clone());
    let random_chaos = args.chaos || config.chaos.enabled;

    let suite_file = load_suite_file(&args.suites)?;
    let base_dir = args
        .suites
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let engine = Arc::new(ChaosEngine::from_config(&config.chaos));
    let wiring = ChaosWiring {
        engine: Arc::clone(&engine),
        route_all: random_chaos || !args.scenarios.is_empty(),
    };
    let suites = build_suites(&suite_file, &base_dir, Some(&wiring))?;

    let network = Arc::new(ReqwestNetwork::new(config.orchestrator.timeout())?);
    let events = if config.events.enabled && !args.no_events {
        let log = JsonlEventLog::new(&config.events.root);
        if let Err(err) = log.ensure_layout() {
            warn!(error = %err, "event log unavailable; continuing without it");
        }
        EventRecorder::new(Some(log), format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S")))
    } else {
        EventRecorder::disabled()
    };

    let mut orchestrator = TestOrchestrator::new(
        config.orchestrator.clone(),
        PipelineController::new(config.pipeline.clone()),
        network,
    )
    .with_events(events)
    .with_report_path(report_path)
    .with_chaos(Arc::clone(&engine));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| MainError::Runtime { source })?;

    runtime.block_on(async {
        if random_chaos {
            engine.enable();
        }
        hold_scenarios(&engine, &args.scenarios)?;

        let outcome = tokio::select! {
            report = orchestrator.run_suites(&suites) => Ok(report),
            _ = tokio::signal::ctrl_c() => Err(MainError::Interrupted),
        };
        engine.disable();
        outcome
    })
}

/// Scenarios named on the command line ignore their duration and stay active
/// until the engine is disabled at the end of the run.
fn hold_scenarios(engine: &ChaosEngine, names: &[String]) -> Result<(), MainError> {
    for name in names {
        if engine.hold_scenario(name)? {
            info!(scenario = %name, "holding chaos scenario for the run");
        } else {
            debug!(scenario = %name, "scenario already held");
        }
    }
    Ok(())
}

fn print_summary(report: &TestReport) {
    for suite in &report.suites {
        let status = if suite.success { "ok" } else { "FAILED" };
        println!(
            "{status:<6} {:<24} {}/{} passed, {} skipped, {}ms",
            suite.name,
            suite.passed_count(),
            suite.tests.len(),
            suite.skipped.len(),
            suite.duration_ms
        );
        for test in suite.failed_tests() {
            println!("         - {}: {}", test.name, test.errors.join("; "));
        }
    }
    println!(
        "total {} passed {} failed {} skipped {} ({:.1}%) in {}ms",
        report.total_tests,
        report.passed_tests,
        report.failed_tests,
        report.skipped_tests,
        report.summary.success_rate,
        report.total_duration
    );
    if report.pipeline_result.stopped_early {
        println!(
            "pipeline stopped early: {}",
            report
                .pipeline_result
                .stop_reason
                .as_deref()
                .unwrap_or("no reason recorded")
        );
    }
}
