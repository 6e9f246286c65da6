//! CLI argument definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// psync - Idempotent flight-controller parameter synchronization.
///
/// Applies a parameter file to a vehicle, converges until the device matches,
/// checks the vehicle can still arm and reverts if it cannot.
///
/// Robot Mode: Use --robot or --format=json for machine-parseable output.
#[derive(Parser, Debug)]
#[command(name = "psync", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (TOML or YAML)
    #[arg(long, short = 'c', global = true, env = "PSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format (text for humans, json for agents/scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "PSYNC_FORMAT"
    )]
    pub format: OutputFormat,

    /// Robot mode: equivalent to --format=json
    #[arg(long, global = true)]
    pub robot: bool,

    /// Verbose output (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Log level: TRACE, DEBUG, INFO, WARNING, ERROR, CRITICAL or 10-50
    #[arg(long, global = true)]
    pub loglevel: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// JSON output for scripts and agents
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON (robot mode or explicit --format=json).
    pub const fn use_json(&self) -> bool {
        self.robot || matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full sync session against the device
    Sync(SyncArgs),

    /// Show what a sync would write, without writing
    #[command(visible_alias = "plan")]
    Diff(DiffArgs),

    /// Read one parameter from the device
    Get(GetArgs),

    /// Inspect or reset the last applied version
    #[command(subcommand)]
    State(StateCommand),

    /// Browse archived pre-sync snapshots
    #[command(subcommand)]
    Snapshots(SnapshotsCommand),

    /// Restore the device to an archived snapshot
    Restore(RestoreArgs),

    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Where the parameter file and the device come from.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Parameter file (local path)
    #[arg(long, short = 'p', value_name = "PATH")]
    pub param_file: Option<String>,

    /// Device image (JSON) of the vehicle to talk to
    #[arg(long, short = 'd', value_name = "PATH")]
    pub device: Option<PathBuf>,

    /// Component to sync, as VEHICLE:COMPONENT
    #[arg(long, value_name = "V:C")]
    pub component: Option<String>,

    /// Extra exclusion glob (repeatable)
    #[arg(long, short = 'x', value_name = "GLOB")]
    pub exclude: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Apply even if this version was already applied (does not record it)
    #[arg(long)]
    pub skip_version_check: bool,

    /// Maximum convergence rounds
    #[arg(long, value_name = "N")]
    pub max_rounds: Option<u32>,

    /// Pause after each write round, in milliseconds
    #[arg(long, value_name = "MS")]
    pub settle_delay_ms: Option<u64>,

    /// Do not archive the pre-sync snapshot
    #[arg(long)]
    pub no_archive: bool,
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Parameter name
    pub name: String,

    /// Device image (JSON) of the vehicle to talk to
    #[arg(long, short = 'd', value_name = "PATH")]
    pub device: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Show the last applied version
    Show,
    /// Forget the last applied version so the next sync runs
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotsCommand {
    /// List archived snapshots, newest first
    List {
        /// Show at most this many
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Show the parameters of one snapshot
    Show {
        /// Snapshot id
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Snapshot id
    pub id: i64,

    /// Device image (JSON) of the vehicle to talk to
    #[arg(long, short = 'd', value_name = "PATH")]
    pub device: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
