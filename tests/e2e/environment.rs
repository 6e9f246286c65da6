//! Environment-driven behavior of the binary.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::json;

use crate::common::fixtures::{INT32, REAL32, TestWorkspace, int32, real32};
use crate::runner::CliRunner;

fn psync(ws: &TestWorkspace) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_psync"));
    cmd.current_dir(ws.path())
        .env("NO_COLOR", "1")
        .env("PSYNC_FORMAT", "text")
        .env("PSYNC_STATE_FILE", ws.state_path())
        .env("PSYNC_SNAPSHOT_DB", ws.snapshot_db_path())
        .env("PSYNC_SETTLE_DELAY_MS", "0")
        .env("XDG_CONFIG_HOME", ws.path().join("config"))
        .env("XDG_DATA_HOME", ws.path().join("data"));
    cmd
}

fn workspace() -> TestWorkspace {
    let ws = TestWorkspace::new();
    ws.param_file(
        "2",
        &[("MPC_Z_P", "4.0", REAL32), ("CAL_MAG0_ID", "12", INT32)],
    );
    ws.device(&[real32("MPC_Z_P", 3.0), int32("CAL_MAG0_ID", 99)]);
    ws
}

#[test]
fn format_variable_selects_json() {
    let ws = workspace();

    psync(&ws)
        .env("PSYNC_FORMAT", "json")
        .args(["diff", "-p", "ref.params", "-d", "vehicle.json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{").and(predicate::str::contains("\"mismatches\": 2")));
}

#[test]
fn param_file_and_device_come_from_environment() {
    let ws = workspace();

    psync(&ws)
        .env("PSYNC_PARAM_FILE", ws.path().join("ref.params"))
        .env("PSYNC_DEVICE", ws.path().join("vehicle.json"))
        .args(["--robot", "sync"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("\"outcome\": \"success\""));
}

#[test]
fn exclude_variable_protects_parameters() {
    let ws = workspace();

    psync(&ws)
        .env("PSYNC_EXCLUDE", "CAL_*, SYS_*")
        .args(["--robot", "sync", "-p", "ref.params", "-d", "vehicle.json"])
        .assert()
        .code(0);

    assert_eq!(
        ws.device_value(&ws.path().join("vehicle.json"), "CAL_MAG0_ID"),
        Some(json!(99))
    );
    assert_eq!(
        ws.device_value(&ws.path().join("vehicle.json"), "MPC_Z_P"),
        Some(json!(4.0))
    );
}

#[test]
fn skip_version_check_variable_forces_a_run() {
    let ws = workspace();
    ws.write_state("2");

    psync(&ws)
        .env("PSYNC_SKIP_VERSION_CHECK", "true")
        .args(["--robot", "sync", "-p", "ref.params", "-d", "vehicle.json"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("\"reason\": \"forced\""));

    assert_eq!(ws.read_state().as_deref(), Some("2\n"));
}

#[test]
fn invalid_variable_fails_before_touching_the_device() {
    let ws = workspace();

    psync(&ws)
        .env("PSYNC_MAX_ROUNDS", "lots")
        .args(["sync", "-p", "ref.params", "-d", "vehicle.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("PSYNC_MAX_ROUNDS"));

    assert_eq!(
        ws.device_value(&ws.path().join("vehicle.json"), "MPC_Z_P"),
        Some(json!(3.0))
    );
}

#[test]
fn config_file_from_environment() {
    let ws = workspace();
    let config = ws.write(
        "psync.toml",
        "param_file = \"ref.params\"\ndevice = \"vehicle.json\"\nexclude = [\"CAL_*\"]\n",
    );

    psync(&ws)
        .env("PSYNC_CONFIG", &config)
        .args(["--robot", "diff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"excluded\": 1"));
}

#[test]
fn loglevel_variable_silences_info() {
    let ws = workspace();

    psync(&ws)
        .env("PSYNC_LOGLEVEL", "ERROR")
        .args(["diff", "-p", "ref.params", "-d", "vehicle.json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("INFO").not());
}

#[test]
fn runner_ignores_variables_of_the_test_process() {
    let _format = env_lock::lock_env([("PSYNC_FORMAT", Some("json"))]);
    let ws = workspace();

    // The guard sets PSYNC_FORMAT for this process; runs must not inherit it.
    let result = CliRunner::isolated(ws.path()).run(&["state", "show"]);

    result
        .assert_exit_code(0)
        .assert_stdout_contains("Last applied");
    assert!(serde_json::from_str::<serde_json::Value>(&result.stdout).is_err());
}

#[test]
fn no_color_variable_keeps_output_plain() {
    let ws = workspace();

    psync(&ws)
        .args(["diff", "-p", "ref.params", "-d", "vehicle.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\u{1b}[").not());
}
