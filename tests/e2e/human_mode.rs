//! Human-mode end-to-end tests: plain text on stdout, diagnostics on stderr.

use crate::common::fixtures::{REAL32, TestWorkspace, real32};
use crate::common::init_test_logging;
use crate::logs::LogVerifier;
use crate::runner::CliRunner;

fn mpc_workspace() -> TestWorkspace {
    let ws = TestWorkspace::new();
    ws.param_file("2", &[("MPC_Z_P", "4.0", REAL32)]);
    ws.device(&[real32("MPC_Z_P", 3.0)]);
    ws
}

#[test]
fn sync_prints_session_summary() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());

    cli.run(&["sync", "-p", "ref.params", "-d", "vehicle.json"])
        .assert_exit_code(0)
        .assert_stdout_contains("psync session")
        .assert_stdout_contains("SUCCESS")
        .assert_stdout_contains("no previous version")
        .assert_stdout_matches(r"Writes\s+1 applied / 1 attempted")
        .assert_stdout_not_contains("\u{1b}[");
}

#[test]
fn failed_sync_shows_reason_and_revert() {
    init_test_logging();
    let ws = TestWorkspace::new();
    ws.param_file("2", &[("MPC_Z_P", "4.0", REAL32)]);
    ws.device_image(&serde_json::json!({
        "params": [real32("MPC_Z_P", 3.0)],
        "not_ready_when": [real32("MPC_Z_P", 4.0)],
    }));
    let cli = CliRunner::isolated(ws.path());

    cli.run(&["sync", "-p", "ref.params", "-d", "vehicle.json"])
        .assert_exit_code(3)
        .assert_stdout_contains("FAILED-REVERTED")
        .assert_stdout_contains("not ready to fly")
        .assert_stdout_contains("1 restored, 0 unchanged, 0 failed");
}

#[test]
fn diff_lists_pending_changes() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());

    cli.run(&["diff", "-p", "ref.params", "-d", "vehicle.json"])
        .assert_exit_code(0)
        .assert_stdout_contains("psync diff")
        .assert_stdout_contains("1 to write, 0 absent")
        .assert_stdout_contains("MPC_Z_P");
}

#[test]
fn diff_on_matching_device_says_so() {
    init_test_logging();
    let ws = TestWorkspace::new();
    ws.param_file("2", &[("MPC_Z_P", "4.0", REAL32)]);
    ws.device(&[real32("MPC_Z_P", 4.0)]);
    let cli = CliRunner::isolated(ws.path());

    cli.run(&["diff", "-p", "ref.params", "-d", "vehicle.json"])
        .assert_exit_code(0)
        .assert_stdout_contains("Device already matches");
}

#[test]
fn errors_go_to_stderr_with_suggestion() {
    init_test_logging();
    let ws = TestWorkspace::new();
    let cli = CliRunner::isolated(ws.path());

    cli.run(&["sync", "-p", "missing.params"])
        .assert_exit_code(1)
        .assert_stdout_is_empty()
        .assert_stderr_contains("[ERR]")
        .assert_stderr_contains("Suggestion:");
}

#[test]
fn several_components_need_a_choice() {
    init_test_logging();
    let ws = TestWorkspace::new();
    ws.param_file_rows(
        "ref.params",
        "2",
        &[(1, 1, "MPC_Z_P", "4.0", REAL32), (1, 154, "MNT_RC_IN_MODE", "1", 6)],
    );
    ws.device(&[real32("MPC_Z_P", 3.0)]);
    let cli = CliRunner::isolated(ws.path());

    cli.run(&["diff", "-p", "ref.params", "-d", "vehicle.json"])
        .assert_exit_code(1)
        .assert_stderr_contains("Available components:")
        .assert_stderr_contains("- 1:154");

    cli.run(&["diff", "-p", "ref.params", "-d", "vehicle.json", "--component", "1:1"])
        .assert_exit_code(0);
}

#[test]
fn quiet_suppresses_success_messages() {
    let ws = TestWorkspace::new();
    ws.write_state("3");
    let cli = CliRunner::isolated(ws.path());

    cli.run(&["-q", "state", "clear"])
        .assert_exit_code(0)
        .assert_stdout_is_empty();
    assert!(ws.read_state().is_none());
}

#[test]
fn state_show_without_history() {
    let ws = TestWorkspace::new();
    let cli = CliRunner::isolated(ws.path());

    cli.run(&["state", "show"])
        .assert_exit_code(0)
        .assert_stdout_contains("Last applied")
        .assert_stdout_contains("none");
}

#[test]
fn verbose_logs_reach_stderr() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());

    let result = cli.run(&["-v", "sync", "-p", "ref.params", "-d", "vehicle.json"]);

    result.assert_exit_code(0);
    LogVerifier::from_stderr(&result.stderr)
        .assert_debug("effective configuration")
        .assert_info("parameters updated")
        .assert_no_errors();
}

#[test]
fn completions_are_generated() {
    CliRunner::new()
        .run(&["completions", "bash"])
        .assert_success()
        .assert_stdout_contains("psync");
}
