use std::fs;
use std::process::Command;

fn drill() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_drill"));
    command.env("DRILL_LOG", "error");
    command
}

#[test]
fn scenarios_lists_the_builtin_registry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = drill()
        .current_dir(dir.path())
        .arg("scenarios")
        .output()
        .expect("run drill");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    for name in ["network-timeout", "tile-404", "webgl-unavailable", "clock-skew"] {
        assert!(stdout.contains(name), "missing {name} in:\n{stdout}");
    }
}

#[test]
fn validate_config_fails_on_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("drill.toml"),
        "[orchestrator]\ntimeout_ms = 0\n",
    )
    .expect("write config");
    let output = drill()
        .current_dir(dir.path())
        .arg("validate-config")
        .output()
        .expect("run drill");
    assert!(!output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert!(stdout.contains("orchestrator.timeout.zero"));
}

#[test]
fn failing_shell_suite_exits_non_zero_and_writes_a_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("suites.toml"),
        r#"
[[suites]]
name = "shell"

[[suites.commands]]
kind = "shell"
name = "ok"
run = "true"

[[suites.commands]]
kind = "shell"
name = "broken"
run = "echo nope >&2; exit 4"
"#,
    )
    .expect("write suites");

    let output = drill()
        .current_dir(dir.path())
        .args(["run", "--suites", "suites.toml", "--report", "out/report.json", "--no-events"])
        .output()
        .expect("run drill");
    assert_eq!(output.status.code(), Some(1));

    let report: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("out/report.json")).expect("read report"),
    )
    .expect("decode report");
    assert_eq!(report["totalTests"], 2);
    assert_eq!(report["failedTests"], 1);
    assert_eq!(report["summary"]["successRate"], 50.0);
}

#[test]
fn passing_run_exits_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("suites.toml"),
        "[[suites]]\nname = \"s\"\n\n[[suites.commands]]\nkind = \"shell\"\nname = \"ok\"\nrun = \"true\"\n",
    )
    .expect("write suites");
    let status = drill()
        .current_dir(dir.path())
        .args(["run", "--suites", "suites.toml", "--no-events"])
        .status()
        .expect("run drill");
    assert!(status.success());
    assert!(dir.path().join("test-results/drill-report.json").exists());
}
