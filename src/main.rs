//! psync - Idempotent flight-controller parameter synchronization.
//!
//! Provides both human-friendly and agent-friendly (robot mode) interfaces.
#![forbid(unsafe_code)]

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use psync::cli::{self, Cli, Commands, SnapshotsCommand, SourceArgs, StateCommand};
use psync::config::{SyncConfig, resolve_config, resolve_path};
use psync::device::{FileVehicle, ParameterStore, RetryingStore};
use psync::error::{Result, ResultExt, SyncError};
use psync::logging::init_logging;
use psync::output::{BuildInfo, DiffPlan, Output, OutputMode, RestoreReport, StateView};
use psync::params::{Component, ParamFile, ParameterSpec, read_param_file};
use psync::snapshot::SnapshotDb;
use psync::state::FileVersionStore;
use psync::sync::{
    RevertManager, SnapshotArchive, SyncOptions, SyncSession, VersionStore, compute_diff,
    evaluate_gate,
};

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> bool {
        option_env!("VERGEN_GIT_DIRTY") == Some("true")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }
}

/// Exit code for errors before or outside a session.
const EXIT_USAGE: i32 = 1;

fn main() {
    let cli = Cli::parse();
    let output = OutputMode::from_cli(&cli).into_output();

    let code = match run(&cli, output.as_ref()) {
        Ok(code) => code,
        Err(e) => {
            output.error(&e);
            EXIT_USAGE
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli, output: &dyn Output) -> Result<i32> {
    match &cli.command {
        Commands::Version => return cmd_version(output),
        Commands::Completions(args) => return cmd_completions(args),
        _ => {}
    }

    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(level) = &cli.loglevel {
        config.loglevel = Some(level.parse()?);
    }
    init_logging(cli.use_json(), cli.verbose, cli.quiet, config.loglevel);
    debug!(config = ?config, "Effective configuration");

    match &cli.command {
        Commands::Sync(args) => cmd_sync(cli, output, config, args),
        Commands::Diff(args) => cmd_diff(output, config, &args.source),
        Commands::Get(args) => cmd_get(output, config, args),
        Commands::State(command) => cmd_state(output, &config, command),
        Commands::Snapshots(command) => cmd_snapshots(output, &config, command),
        Commands::Restore(args) => cmd_restore(output, config, args),
        Commands::Version | Commands::Completions(_) => Ok(0),
    }
}

// === Shared setup ===

/// Paths given on the command line are relative to the working directory,
/// not to the config file.
fn cli_path(path: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir().with_context(|| "Cannot read the working directory")?;
    resolve_path(path, &cwd)
}

fn apply_source(config: &mut SyncConfig, source: &SourceArgs) -> Result<()> {
    if let Some(param_file) = &source.param_file {
        let resolved = if param_file.contains("://") {
            param_file.clone()
        } else {
            cli_path(Path::new(param_file))?.display().to_string()
        };
        config.param_file = Some(resolved);
    }
    if let Some(device) = &source.device {
        config.device = Some(cli_path(device)?);
    }
    if let Some(component) = &source.component {
        config.component = Some(component.clone());
    }
    config.exclude.extend(source.exclude.iter().cloned());
    config.validate()
}

/// Load the parameter file, narrowed to `component` when one is configured
/// and with exclusions applied.
///
/// Returns the file, how many parameters the filter dropped and whether
/// components of the file were left out.
fn load_file(config: &SyncConfig) -> Result<(ParamFile, usize, bool)> {
    let source = config.param_file_source()?.ok_or_else(|| {
        SyncError::ConfigInvalid(
            "No parameter file: pass --param-file or set `param_file`".to_string(),
        )
    })?;
    let file = read_param_file(&source)?;
    if file.is_empty() {
        return Err(SyncError::ParamFileParse {
            line: 0,
            reason: "file contains no parameters".to_string(),
        });
    }

    let narrowed = file.narrow(config.component()?)?;
    let partial = narrowed.len() < file.len();
    let filtered = narrowed.filtered(&config.param_filter());
    let excluded = narrowed.param_count() - filtered.param_count();
    info!(
        version = %filtered.version,
        components = filtered.len(),
        params = filtered.param_count(),
        excluded,
        partial,
        "Parameter file loaded"
    );
    Ok((filtered, excluded, partial))
}

/// Load the parameter file and pick the one component to inspect.
fn load_spec(config: &SyncConfig) -> Result<(Component, ParameterSpec, usize)> {
    let (file, excluded, _) = load_file(config)?;
    let (component, spec) = file.select(None)?;
    Ok((component, spec.clone(), excluded))
}

fn open_device(config: &SyncConfig) -> Result<RetryingStore<FileVehicle>> {
    let path = config.device_path()?.ok_or(SyncError::NoDevice)?;
    let vehicle = FileVehicle::open(&path)?;
    Ok(RetryingStore::new(vehicle, config.retry.policy()))
}

fn open_archive(config: &SyncConfig) -> Result<SnapshotDb> {
    SnapshotDb::open(config.snapshot_db_path()?)
}

fn spinner(cli: &Cli, message: &str) -> Option<ProgressBar> {
    if cli.use_json() || cli.quiet || !io::stderr().is_terminal() {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.blue} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    Some(bar)
}

// === Commands ===

fn cmd_sync(
    cli: &Cli,
    output: &dyn Output,
    mut config: SyncConfig,
    args: &cli::SyncArgs,
) -> Result<i32> {
    apply_source(&mut config, &args.source)?;
    if args.skip_version_check {
        config.skip_version_check = true;
    }
    if let Some(rounds) = args.max_rounds {
        config.max_convergence_rounds = rounds;
    }
    if let Some(delay) = args.settle_delay_ms {
        config.settle_delay_ms = delay;
    }
    if args.no_archive {
        config.archive = false;
    }
    config.validate()?;

    let (file, _, partial) = load_file(&config)?;
    let mut store = open_device(&config)?;
    let mut versions = FileVersionStore::new(config.state_path()?);

    let mut archive = if config.archive {
        match open_archive(&config) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(error = %e, "Snapshot archive unavailable, continuing without it");
                output.warning(&format!("Pre-sync snapshot will not be archived: {e}"));
                None
            }
        }
    } else {
        None
    };

    let options = SyncOptions {
        skip_version_check: config.skip_version_check,
        convergence: config.convergence_options(),
        readiness: config.readiness_source(),
        partial,
    };

    let progress = spinner(
        cli,
        &format!("Syncing {} component(s) to version {}", file.len(), file.version),
    );
    let report = {
        let mut session = SyncSession::new(options, &mut versions);
        if let Some(db) = archive.as_mut() {
            session = session.with_archive(db as &mut dyn SnapshotArchive);
        }
        session.run_file(&file, &mut store)
    };
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    if let (Some(db), Some(keep)) = (archive.as_mut(), config.keep_snapshots) {
        if let Err(e) = db.prune(keep) {
            warn!(error = %e, "Failed to prune snapshot archive");
        }
    }

    output.session_report(&report);
    Ok(report.exit_code())
}

fn cmd_diff(output: &dyn Output, mut config: SyncConfig, source: &SourceArgs) -> Result<i32> {
    apply_source(&mut config, source)?;
    let (component, spec, excluded) = load_spec(&config)?;
    let mut store = open_device(&config)?;
    let versions = FileVersionStore::new(config.state_path()?);

    let live = store.read_all()?;
    let diff = compute_diff(&spec, &live, config.comparison())?;
    let gate = evaluate_gate(spec.version(), &versions, config.skip_version_check);

    output.diff_plan(&DiffPlan {
        device: store.describe(),
        component,
        spec_version: spec.version().clone(),
        gate,
        desired: spec.len(),
        excluded,
        mismatches: diff.mismatch_count(),
        absent: diff.absent_count(),
        diff,
    });
    Ok(0)
}

fn cmd_get(output: &dyn Output, mut config: SyncConfig, args: &cli::GetArgs) -> Result<i32> {
    if let Some(device) = &args.device {
        config.device = Some(cli_path(device)?);
    }
    let mut store = open_device(&config)?;
    let param = store.read_one(&args.name)?;
    output.parameter(&param);
    Ok(0)
}

fn cmd_state(output: &dyn Output, config: &SyncConfig, command: &StateCommand) -> Result<i32> {
    let path = config.state_path()?;
    let mut versions = FileVersionStore::new(&path);
    match command {
        StateCommand::Show => output.version_state(&StateView::new(&path, &versions.load())),
        StateCommand::Clear => {
            versions.clear()?;
            output.state_cleared(&path);
        }
    }
    Ok(0)
}

fn cmd_snapshots(
    output: &dyn Output,
    config: &SyncConfig,
    command: &SnapshotsCommand,
) -> Result<i32> {
    let db = open_archive(config)?;
    match command {
        SnapshotsCommand::List { limit } => output.snapshot_list(&db.list_snapshots(*limit)?),
        SnapshotsCommand::Show { id } => {
            let snapshot = db
                .load_snapshot(*id)?
                .ok_or(SyncError::SnapshotNotFound { id: *id })?;
            output.snapshot_detail(&snapshot);
        }
    }
    Ok(0)
}

fn cmd_restore(output: &dyn Output, mut config: SyncConfig, args: &cli::RestoreArgs) -> Result<i32> {
    if let Some(device) = &args.device {
        config.device = Some(cli_path(device)?);
    }
    let db = open_archive(&config)?;
    let archived = db
        .load_snapshot(args.id)?
        .ok_or(SyncError::SnapshotNotFound { id: args.id })?;

    let mut store = open_device(&config)?;
    if archived.device != store.describe() {
        warn!(
            archived = %archived.device,
            current = %store.describe(),
            "Restoring a snapshot taken from a different device"
        );
        output.warning(&format!(
            "Snapshot #{} was taken from {}",
            archived.id, archived.device
        ));
    }

    let result = RevertManager::new().revert(&archived.to_snapshot(), &mut store);
    let report = RestoreReport {
        snapshot_id: archived.id,
        device: store.describe(),
        complete: result.is_complete(),
        result,
    };
    output.restore_report(&report);
    Ok(if report.complete { 0 } else { 4 })
}

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn cmd_version(output: &dyn Output) -> Result<i32> {
    output.version_info(&BuildInfo {
        version: build_info::VERSION,
        git_sha: build_info::git_sha(),
        git_dirty: build_info::git_dirty(),
        build_timestamp: build_info::build_timestamp(),
        rustc_version: build_info::rustc_semver(),
        target: build_info::target(),
    });
    Ok(0)
}

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn cmd_completions(args: &cli::CompletionsArgs) -> Result<i32> {
    use clap::CommandFactory;
    clap_complete::generate(args.shell, &mut Cli::command(), "psync", &mut io::stdout());
    Ok(0)
}
