//! CLI argument definitions using clap derive

use crate::pipeline::matrix::HostPolicy;
use crate::pipeline::trigger::EventKind;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Shipyard - Multi-target build and release pipeline
///
/// Verifies a Rust project with a debug build and tests, then builds
/// release binaries for every platform in the matrix.
#[derive(Parser, Debug)]
#[command(name = "shipyard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SHIPYARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .shipyard.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline: verify, then release for every matrix target
    Run(RunArgs),

    /// Show the resolved release matrix
    Matrix(MatrixArgs),

    /// Check toolchain health and installed targets
    Status,

    /// Inspect past pipeline runs
    Runs(RunsArgs),

    /// Manage build caches
    Cache(CacheArgs),

    /// Manage published artifacts
    Artifacts(ArtifactsArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Triggering event
    #[arg(long, value_enum, default_value = "push")]
    pub event: EventKind,

    /// Branch pushed to, or base branch of the pull request (defaults to git HEAD)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Source revision (defaults to git HEAD)
    #[arg(short, long)]
    pub revision: Option<String>,

    /// Project directory (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Only release these targets (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub target: Vec<String>,

    /// Run even if the branch is not a trigger branch
    #[arg(long)]
    pub force: bool,

    /// Disable build caching for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Override release.host_policy
    #[arg(long, value_enum)]
    pub host_policy: Option<HostPolicy>,

    /// Output format for the run summary
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the matrix command
#[derive(Parser, Debug)]
pub struct MatrixArgs {
    /// Project directory (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the runs command
#[derive(Parser, Debug)]
pub struct RunsArgs {
    /// Subcommand for runs
    #[command(subcommand)]
    pub action: RunsAction,
}

/// Runs subcommands
#[derive(Subcommand, Debug)]
pub enum RunsAction {
    /// List recorded runs, newest first
    List {
        /// Show at most N runs (0 = all)
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one run
    Show {
        /// Run id or unique id prefix
        run: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List all saved caches
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show cache state for the current project's matrix
    Info {
        /// Project directory (defaults to current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// Remove caches not saved recently
    Gc {
        /// Remove caches older than N days (default: from config)
        #[arg(long)]
        days: Option<u32>,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove caches by key, or all of them
    #[command(group(clap::ArgGroup::new("which").required(true).args(["keys", "all"])))]
    Clear {
        /// Cache keys (target triples) to remove
        keys: Vec<String>,

        /// Remove every cache
        #[arg(long)]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the artifacts command
#[derive(Parser, Debug)]
pub struct ArtifactsArgs {
    /// Subcommand for artifacts
    #[command(subcommand)]
    pub action: ArtifactsAction,
}

/// Artifacts subcommands
#[derive(Subcommand, Debug)]
pub enum ArtifactsAction {
    /// List published artifacts
    List {
        /// Only artifacts of this run (id or unique prefix)
        #[arg(short, long)]
        run: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove artifacts past their retention period
    Prune {
        /// Remove every artifact regardless of retention
        #[arg(long)]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., release.retention_days)
        key: String,
        /// Value to set
        value: String,
        /// Write to project-local .shipyard.toml instead of global config
        #[arg(long)]
        local: bool,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
