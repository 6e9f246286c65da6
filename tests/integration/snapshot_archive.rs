//! Pre-sync snapshots archived in SQLite and restored later.

use std::time::Duration;

use serde_json::json;

use psync::device::{FileVehicle, MockVehicle, ParameterStore};
use psync::params::{ParamValue, Parameter, ParameterSpec, SpecVersion};
use psync::snapshot::SnapshotDb;
use psync::sync::{
    ConvergenceOptions, MemoryVersionStore, RevertManager, SessionOutcome, SnapshotArchive,
    SyncOptions, SyncSession,
};

use crate::common::fixtures::{TestWorkspace, int32, real32};
use crate::common::init_test_logging;

fn options() -> SyncOptions {
    SyncOptions {
        convergence: ConvergenceOptions {
            settle_delay: Duration::ZERO,
            ..ConvergenceOptions::default()
        },
        ..SyncOptions::default()
    }
}

fn spec_v2() -> ParameterSpec {
    ParameterSpec::from_params(
        SpecVersion::new("2"),
        [
            Parameter::new("MPC_Z_P", ParamValue::Real32(4.0)),
            Parameter::new("COM_RC_IN_MODE", ParamValue::Int32(1)),
        ],
    )
    .unwrap()
}

fn bench_params() -> Vec<Parameter> {
    vec![
        Parameter::new("MPC_Z_P", ParamValue::Real32(3.0)),
        Parameter::new("COM_RC_IN_MODE", ParamValue::Int32(0)),
        Parameter::new("SYS_AUTOSTART", ParamValue::Int32(4001)),
    ]
}

#[test]
fn session_archives_the_pre_sync_state() {
    init_test_logging();
    let mut db = SnapshotDb::in_memory().unwrap();
    let mut versions = MemoryVersionStore::default();
    let mut mock = MockVehicle::with_params(bench_params());

    let report = SyncSession::new(options(), &mut versions)
        .with_archive(&mut db as &mut dyn SnapshotArchive)
        .run(&spec_v2(), &mut mock);

    assert_eq!(report.outcome, SessionOutcome::Success);
    let id = report.components[0].snapshot_id.expect("snapshot archived");

    let archived = db.load_snapshot(id).unwrap().unwrap();
    assert_eq!(archived.session_id, report.session_id);
    assert_eq!(archived.spec_version, SpecVersion::new("2"));
    assert_eq!(archived.device, "simulated vehicle 'mock-vehicle'");
    assert_eq!(archived.params.len(), 3);
    let z_p = archived.params.iter().find(|p| p.name == "MPC_Z_P").unwrap();
    assert_eq!(z_p.value, ParamValue::Real32(3.0));

    let listed = db.list_snapshots(None).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].param_count, 3);
}

#[test]
fn skipped_session_archives_nothing() {
    let mut db = SnapshotDb::in_memory().unwrap();
    let mut versions = MemoryVersionStore::with_version("2");
    let mut mock = MockVehicle::with_params(bench_params());

    let report = SyncSession::new(options(), &mut versions)
        .with_archive(&mut db as &mut dyn SnapshotArchive)
        .run(&spec_v2(), &mut mock);

    assert_eq!(report.outcome, SessionOutcome::Skipped);
    assert!(report.components.is_empty());
    assert!(db.list_snapshots(None).unwrap().is_empty());
}

#[test]
fn archived_snapshot_restores_a_synced_vehicle() {
    init_test_logging();
    let mut db = SnapshotDb::in_memory().unwrap();
    let mut versions = MemoryVersionStore::default();
    let mut mock = MockVehicle::with_params(bench_params());

    let report = SyncSession::new(options(), &mut versions)
        .with_archive(&mut db as &mut dyn SnapshotArchive)
        .run(&spec_v2(), &mut mock);
    assert_eq!(mock.value("MPC_Z_P"), Some(ParamValue::Real32(4.0)));

    let archived = db.load_snapshot(report.components[0].snapshot_id.unwrap()).unwrap().unwrap();
    let result = RevertManager::new().revert(&archived.to_snapshot(), &mut mock);

    assert!(result.is_complete());
    assert_eq!(result.restored_count, 2);
    assert_eq!(result.unchanged_count, 1);
    assert_eq!(mock.value("MPC_Z_P"), Some(ParamValue::Real32(3.0)));
    assert_eq!(mock.value("COM_RC_IN_MODE"), Some(ParamValue::Int32(0)));
}

#[test]
fn archive_on_disk_outlives_the_connection() {
    init_test_logging();
    let ws = TestWorkspace::new();
    let device_path = ws.device(&[real32("MPC_Z_P", 3.0), int32("COM_RC_IN_MODE", 0)]);
    let mut vehicle = FileVehicle::open(&device_path).unwrap();

    let id = {
        let mut db = SnapshotDb::open(ws.snapshot_db_path()).unwrap();
        let mut versions = MemoryVersionStore::default();
        let report = SyncSession::new(options(), &mut versions)
            .with_archive(&mut db as &mut dyn SnapshotArchive)
            .run(&spec_v2(), &mut vehicle);
        assert_eq!(report.outcome, SessionOutcome::Success);
        report.components[0].snapshot_id.unwrap()
    };

    let db = SnapshotDb::open(ws.snapshot_db_path()).unwrap();
    let archived = db.load_snapshot(id).unwrap().unwrap();
    let mut reopened = FileVehicle::open(&device_path).unwrap();
    assert_eq!(archived.device, reopened.describe());

    let result = RevertManager::new().revert(&archived.to_snapshot(), &mut reopened);

    assert!(result.is_complete());
    assert_eq!(ws.device_value(&device_path, "MPC_Z_P"), Some(json!(3.0)));
    assert_eq!(ws.device_value(&device_path, "COM_RC_IN_MODE"), Some(json!(0)));
}

#[test]
fn prune_keeps_newest_sessions() {
    let mut db = SnapshotDb::in_memory().unwrap();
    let mut mock = MockVehicle::with_params(bench_params());

    for version in ["1", "2", "3"] {
        let spec = ParameterSpec::from_params(
            SpecVersion::new(version),
            [Parameter::new("MPC_Z_P", ParamValue::Real32(4.0))],
        )
        .unwrap();
        let mut versions = MemoryVersionStore::default();
        SyncSession::new(
            SyncOptions {
                skip_version_check: true,
                ..options()
            },
            &mut versions,
        )
        .with_archive(&mut db as &mut dyn SnapshotArchive)
        .run(&spec, &mut mock);
    }

    assert_eq!(db.prune(1).unwrap(), 2);
    let remaining = db.list_snapshots(None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].spec_version, SpecVersion::new("3"));
}
