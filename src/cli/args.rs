//! CLI argument definitions
//!
//! All clap derive structs for `signalrig` command-line parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

// ============================================================================
// Root CLI
// ============================================================================

/// Adaptive phase controller for a six-lane traffic-signal rig.
#[derive(Parser, Debug)]
#[command(name = "signalrig", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "SIGNALRIG_COLOR")]
    pub color: ColorChoice,

    /// Log line format.
    #[arg(long, default_value = "human", global = true, env = "SIGNALRIG_LOG_FORMAT")]
    pub log_format: LogFormatArg,
}

// ============================================================================
// Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control loop, reading vehicle counts from a feed.
    Run(RunArgs),

    /// Execute a single cycle (or one manual phase) and exit.
    Cycle(CycleArgs),

    /// Show which phase would be chosen for a set of counts.
    Decide(DecideArgs),

    /// List the phase catalog.
    Catalog(CatalogArgs),

    /// Validate configuration files.
    Validate(ValidateArgs),

    /// Display version information.
    Version(VersionArgs),
}

/// Options shared by every command that drives the rig.
#[derive(Args, Debug, Clone)]
pub struct RigArgs {
    /// Path to YAML configuration file.
    #[arg(short, long, env = "SIGNALRIG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Hardware link `host:port` (overrides `hardware.link`).
    #[arg(long, env = "SIGNALRIG_LINK")]
    pub link: Option<String>,

    /// JSONL file for cycle records (overrides `persistence.cycle_log`).
    #[arg(long, env = "SIGNALRIG_CYCLE_LOG")]
    pub cycle_log: Option<PathBuf>,

    /// Write controller events as JSONL to this file instead of stderr.
    #[arg(long, env = "SIGNALRIG_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,
}

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Rig connection options.
    #[command(flatten)]
    pub rig: RigArgs,

    /// Count feed: a file of NDJSON count messages, or `-` for stdin.
    #[arg(long, default_value = "-")]
    pub feed: String,

    /// Counts to start with, e.g. `1,0,2,0,0,3`.
    #[arg(long)]
    pub initial_counts: Option<String>,

    /// Stop after this long (e.g. `10m`); runs until signalled otherwise.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Serve Prometheus metrics on 127.0.0.1:<port>.
    #[arg(long, env = "SIGNALRIG_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for `cycle`.
#[derive(Args, Debug)]
pub struct CycleArgs {
    /// Rig connection options.
    #[command(flatten)]
    pub rig: RigArgs,

    /// Per-lane vehicle counts, e.g. `0,1,0,0,1,1`.
    #[arg(long)]
    pub counts: String,

    /// Run this phase (id or name) instead of selecting one.
    #[arg(long)]
    pub phase: Option<String>,

    /// Green time in seconds for `--phase`.
    #[arg(long, requires = "phase")]
    pub green: Option<u32>,

    /// Print the planned steps without driving the hardware.
    #[arg(long)]
    pub dry_run: bool,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `decide`.
#[derive(Args, Debug)]
pub struct DecideArgs {
    /// Path to YAML configuration file.
    #[arg(short, long, env = "SIGNALRIG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Per-lane vehicle counts, e.g. `1,5,5,0,0,0`.
    #[arg(long)]
    pub counts: String,

    /// Previously executed phase (id or name).
    #[arg(long)]
    pub last_phase: Option<String>,

    /// Consecutive cycles won by the last phase's group.
    #[arg(long, default_value_t = 0)]
    pub streak: u32,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `catalog`.
#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Path to YAML configuration file.
    #[arg(short, long, env = "SIGNALRIG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for `version`.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Log format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable lines.
    #[default]
    Human,
    /// One JSON object per line.
    Json,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================
