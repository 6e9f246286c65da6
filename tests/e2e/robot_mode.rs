//! Robot-mode end-to-end tests: JSON on stdout and exit codes.

use serde_json::{Value, json};

use crate::common::fixtures::{INT32, REAL32, TestWorkspace, int32, real32};
use crate::common::init_test_logging;
use crate::runner::{CliResult, CliRunner};

/// Workspace with spec version 2 wanting `MPC_Z_P` = 4.0 on a vehicle at 3.0.
fn mpc_workspace() -> TestWorkspace {
    let ws = TestWorkspace::new();
    ws.param_file("2", &[("MPC_Z_P", "4.0", REAL32)]);
    ws.device(&[real32("MPC_Z_P", 3.0), int32("SYS_AUTOSTART", 4001)]);
    ws
}

fn sync(cli: &CliRunner) -> CliResult {
    cli.run_robot(&["sync", "-p", "ref.params", "-d", "vehicle.json"])
}

#[test]
fn sync_applies_changed_version() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());

    let result = sync(&cli);

    result
        .assert_exit_code(0)
        .assert_json_field("/outcome", &json!("success"))
        .assert_json_field("/spec_version", &json!("2"))
        .assert_json_field("/gate/reason", &json!("first_run"))
        .assert_json_field("/components/0/convergence/status", &json!("converged"))
        .assert_json_field("/components/0/readiness/state", &json!("ready"))
        .assert_json_field("/version_saved", &json!(true))
        .assert_json_field_exists("/components/0/snapshot_id");
    assert_eq!(
        ws.device_value(&ws.path().join("vehicle.json"), "MPC_Z_P"),
        Some(json!(4.0))
    );
    assert!(ws.read_state().unwrap().contains("\"version\": \"2\""));
}

#[test]
fn second_sync_is_skipped() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());
    sync(&cli).assert_exit_code(0);

    sync(&cli)
        .assert_exit_code(0)
        .assert_json_field("/outcome", &json!("skipped"))
        .assert_json_field("/gate/reason", &json!("skip"));
}

#[test]
fn unarmable_result_is_reverted() {
    init_test_logging();
    let ws = TestWorkspace::new();
    ws.param_file("2", &[("MPC_Z_P", "4.0", REAL32)]);
    let device = ws.device_image(&json!({
        "params": [real32("MPC_Z_P", 3.0)],
        "not_ready_when": [real32("MPC_Z_P", 4.0)],
    }));
    ws.write_state("1");
    let cli = CliRunner::isolated(ws.path());

    sync(&cli)
        .assert_exit_code(3)
        .assert_json_field("/outcome", &json!("failed_reverted"))
        .assert_json_field("/reason/kind", &json!("not_ready"))
        .assert_json_field("/components/0/revert/restored_count", &json!(1))
        .assert_json_field("/version_saved", &json!(false));
    assert_eq!(ws.device_value(&device, "MPC_Z_P"), Some(json!(3.0)));
    assert_eq!(ws.read_state().as_deref(), Some("1\n"));
}

#[test]
fn vehicle_in_air_is_left_alone() {
    init_test_logging();
    let ws = TestWorkspace::new();
    ws.param_file("2", &[("MPC_Z_P", "4.0", REAL32)]);
    let device = ws.device_image(&json!({
        "params": [real32("MPC_Z_P", 3.0)],
        "in_air": true,
    }));
    let cli = CliRunner::isolated(ws.path());

    sync(&cli)
        .assert_exit_code(2)
        .assert_json_field("/outcome", &json!("failed_no_revert_needed"))
        .assert_json_field("/reason/kind", &json!("in_air"));
    assert_eq!(ws.device_value(&device, "MPC_Z_P"), Some(json!(3.0)));
    assert!(ws.read_state().is_none());
}

#[test]
fn rejected_write_ends_not_converged() {
    init_test_logging();
    let ws = TestWorkspace::new();
    ws.param_file(
        "2",
        &[("MPC_Z_P", "4.0", REAL32), ("COM_RC_IN_MODE", "1", INT32)],
    );
    let device = ws.device_image(&json!({
        "params": [real32("MPC_Z_P", 3.0), int32("COM_RC_IN_MODE", 0)],
        "limits": { "MPC_Z_P": [0.0, 3.5] },
    }));
    let cli = CliRunner::isolated(ws.path());

    let result = sync(&cli);

    result
        .assert_exit_code(3)
        .assert_json_field("/components/0/convergence/status", &json!("not_reached"))
        .assert_json_field("/reason/kind", &json!("convergence_not_reached"))
        .assert_json_field("/components/0/convergence/failures/0/name", &json!("MPC_Z_P"))
        .assert_json_field("/components/0/convergence/failures/0/kind", &json!("rejected"));
    assert_eq!(ws.device_value(&device, "COM_RC_IN_MODE"), Some(json!(0)));
}

#[test]
fn failed_revert_exits_four() {
    init_test_logging();
    let ws = TestWorkspace::new();
    ws.param_file("2", &[("A", "1", INT32), ("B", "1", INT32)]);
    // A only accepts 1, so it cannot go back; B never accepts the new value.
    ws.device_image(&json!({
        "params": [int32("A", 0), int32("B", 0)],
        "limits": { "A": [1.0, 1.0], "B": [0.0, 0.0] },
    }));
    let cli = CliRunner::isolated(ws.path());

    sync(&cli)
        .assert_exit_code(4)
        .assert_json_field("/outcome", &json!("failed_revert_incomplete"))
        .assert_json_field("/components/0/revert/failures/0/name", &json!("A"));
}

#[test]
fn diff_reports_plan_without_writing() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());

    cli.run_robot(&["diff", "-p", "ref.params", "-d", "vehicle.json"])
        .assert_exit_code(0)
        .assert_json_field("/mismatches", &json!(1))
        .assert_json_field("/desired", &json!(1))
        .assert_json_field("/diff/0/kind", &json!("mismatch"))
        .assert_json_field("/diff/0/name", &json!("MPC_Z_P"))
        .assert_json_field("/gate/reason", &json!("first_run"));
    assert_eq!(
        ws.device_value(&ws.path().join("vehicle.json"), "MPC_Z_P"),
        Some(json!(3.0))
    );
    assert!(ws.read_state().is_none());
}

#[test]
fn diff_honors_exclusions() {
    init_test_logging();
    let ws = TestWorkspace::new();
    ws.param_file(
        "2",
        &[("MPC_Z_P", "4.0", REAL32), ("CAL_MAG0_ID", "12", INT32)],
    );
    ws.device(&[real32("MPC_Z_P", 3.0), int32("CAL_MAG0_ID", 99)]);
    let cli = CliRunner::isolated(ws.path());

    cli.run_robot(&["plan", "-p", "ref.params", "-d", "vehicle.json", "-x", "CAL_*"])
        .assert_exit_code(0)
        .assert_json_field("/excluded", &json!(1))
        .assert_json_array_len("/diff", 1);
}

#[test]
fn get_reads_one_parameter() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());

    cli.run_robot(&["get", "SYS_AUTOSTART", "-d", "vehicle.json"])
        .assert_exit_code(0)
        .assert_json_field("/name", &json!("SYS_AUTOSTART"))
        .assert_json_field("/type", &json!("int32"))
        .assert_json_field("/value", &json!(4001));
}

#[test]
fn unknown_parameter_is_an_error() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());

    let result = cli.run_robot(&["get", "NOPE", "-d", "vehicle.json"]);

    result
        .assert_exit_code(1)
        .assert_stdout_is_empty()
        .assert_stderr_contains("\"error\": true")
        .assert_stderr_contains("NOPE");
}

#[test]
fn missing_param_file_is_reported() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());

    cli.run_robot(&["sync", "-p", "absent.params", "-d", "vehicle.json"])
        .assert_exit_code(1)
        .assert_stderr_contains("absent.params")
        .assert_stderr_contains("\"recoverable\": true");
}

#[test]
fn state_show_and_clear() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());

    cli.run_robot(&["state", "show"])
        .assert_exit_code(0)
        .assert_json_field("/status", &json!("missing"));

    sync(&cli).assert_exit_code(0);
    cli.run_robot(&["state", "show"])
        .assert_exit_code(0)
        .assert_json_field("/status", &json!("known"))
        .assert_json_field("/version", &json!("2"))
        .assert_json_field_exists("/spec_digest");

    cli.run_robot(&["state", "clear"])
        .assert_exit_code(0)
        .assert_json_field("/cleared", &json!(true));
    assert!(ws.read_state().is_none());
    sync(&cli).assert_json_field("/gate/reason", &json!("first_run"));
}

#[test]
fn snapshot_archive_round_trip_through_restore() {
    init_test_logging();
    let ws = mpc_workspace();
    let device = ws.path().join("vehicle.json");
    let cli = CliRunner::isolated(ws.path());

    let id = sync(&cli).json()["components"][0]["snapshot_id"].as_i64().unwrap();
    assert_eq!(ws.device_value(&device, "MPC_Z_P"), Some(json!(4.0)));

    let listed = cli.run_robot(&["snapshots", "list"]);
    listed.assert_exit_code(0).assert_json_array_len("", 1);
    assert_eq!(listed.json()[0]["param_count"], json!(2));

    let shown: Value = cli.run_robot(&["snapshots", "show", &id.to_string()]).json();
    let params = shown["params"].as_array().unwrap();
    assert!(
        params
            .iter()
            .any(|p| p["name"] == "MPC_Z_P" && p["value"] == json!(3.0))
    );

    cli.run_robot(&["restore", &id.to_string(), "-d", "vehicle.json"])
        .assert_exit_code(0)
        .assert_json_field("/complete", &json!(true))
        .assert_json_field("/restored_count", &json!(1));
    assert_eq!(ws.device_value(&device, "MPC_Z_P"), Some(json!(3.0)));
}

#[test]
fn unknown_snapshot_is_an_error() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());

    cli.run_robot(&["snapshots", "show", "42"])
        .assert_exit_code(1)
        .assert_stderr_contains("42");
}

#[test]
fn no_archive_skips_snapshot_storage() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());

    let result = cli.run_robot(&["sync", "-p", "ref.params", "-d", "vehicle.json", "--no-archive"]);

    result.assert_exit_code(0);
    assert!(result.json()["components"][0].get("snapshot_id").is_none());
    cli.run_robot(&["snapshots", "list"])
        .assert_exit_code(0)
        .assert_json_array_len("", 0);
}

#[test]
fn version_reports_package_version() {
    let cli = CliRunner::new();

    cli.run_robot(&["version"])
        .assert_success()
        .assert_json_field("/version", &json!(env!("CARGO_PKG_VERSION")))
        .assert_json_field_exists("/git_sha")
        .assert_json_field_exists("/target");
}

#[test]
fn compact_format_is_one_line() {
    let result = CliRunner::new().run(&["--format", "json-compact", "version"]);

    result.assert_success();
    assert_eq!(result.stdout.trim().lines().count(), 1);
}

/// Workspace whose file targets the autopilot (1:1) and a gimbal (1:154).
fn two_component_workspace() -> TestWorkspace {
    let ws = TestWorkspace::new();
    ws.param_file_rows(
        "ref.params",
        "2",
        &[(1, 1, "MPC_Z_P", "4.0", REAL32), (1, 154, "MNT_MODE_IN", "1", INT32)],
    );
    ws.device(&[real32("MPC_Z_P", 3.0), int32("MNT_MODE_IN", 0)]);
    ws
}

#[test]
fn sync_applies_every_component_in_the_file() {
    init_test_logging();
    let ws = two_component_workspace();
    let cli = CliRunner::isolated(ws.path());
    let device = ws.path().join("vehicle.json");

    sync(&cli)
        .assert_exit_code(0)
        .assert_json_field("/outcome", &json!("success"))
        .assert_json_array_len("/components", 2)
        .assert_json_field("/components/1/component/component_id", &json!(154))
        .assert_json_field("/version_saved", &json!(true));
    assert_eq!(ws.device_value(&device, "MPC_Z_P"), Some(json!(4.0)));
    assert_eq!(ws.device_value(&device, "MNT_MODE_IN"), Some(json!(1)));

    sync(&cli)
        .assert_exit_code(0)
        .assert_json_field("/outcome", &json!("skipped"));
}

#[test]
fn sync_of_one_component_does_not_record_version() {
    init_test_logging();
    let ws = two_component_workspace();
    let cli = CliRunner::isolated(ws.path());

    cli.run_robot(&["sync", "-p", "ref.params", "-d", "vehicle.json", "--component", "1:1"])
        .assert_exit_code(0)
        .assert_json_array_len("/components", 1)
        .assert_json_field("/version_saved", &json!(false));
    assert!(ws.read_state().is_none());

    sync(&cli)
        .assert_exit_code(0)
        .assert_json_field("/gate/reason", &json!("first_run"))
        .assert_json_field("/version_saved", &json!(true));
    assert_eq!(
        ws.device_value(&ws.path().join("vehicle.json"), "MNT_MODE_IN"),
        Some(json!(1))
    );
}

#[test]
fn restore_onto_another_device_warns_on_stderr() {
    init_test_logging();
    let ws = mpc_workspace();
    let cli = CliRunner::isolated(ws.path());
    let id = sync(&cli).json()["components"][0]["snapshot_id"].as_i64().unwrap();
    std::fs::copy(ws.path().join("vehicle.json"), ws.path().join("spare.json")).unwrap();

    let result = cli.run_robot(&["restore", &id.to_string(), "-d", "spare.json"]);

    result
        .assert_exit_code(0)
        .assert_json_field("/complete", &json!(true))
        .assert_stderr_contains("\"warning\": true");
    assert_eq!(
        ws.device_value(&ws.path().join("spare.json"), "MPC_Z_P"),
        Some(json!(3.0))
    );
}
