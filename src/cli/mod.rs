//! CLI argument parsing for clusterlock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Clusterlock: cluster-wide named locks over a group transport.
///
/// Members of a cluster agree on exclusive ownership of named locks:
/// - ownership is negotiated by broadcasting to the current membership view
/// - locks held by members that leave or crash are reclaimed
/// - duplicate ownership after a partition heals is resolved deterministically
#[derive(Parser, Debug)]
#[command(name = "clusterlock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    ///
    /// `RUST_LOG` takes precedence when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for clusterlock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run lock contention on an in-process cluster.
    ///
    /// Starts several members on an in-memory network, lets workers on every
    /// member compete for a set of locks, and checks that no two members
    /// were ever inside the same lock at once.
    Simulate(SimulateArgs),

    /// Configuration commands.
    ///
    /// Print the effective configuration or validate a config file.
    Config(ConfigCommand),
}

/// Arguments for the `simulate` command.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Number of cluster members.
    #[arg(short, long, default_value_t = 3)]
    pub members: usize,

    /// Number of distinct lock names workers compete for.
    #[arg(short, long, default_value_t = 2)]
    pub locks: usize,

    /// Worker threads per member.
    #[arg(short, long, default_value_t = 2)]
    pub workers: usize,

    /// Lock/unlock cycles per worker.
    #[arg(short, long, default_value_t = 20)]
    pub iterations: usize,

    /// How long a worker stays inside a lock, in milliseconds.
    #[arg(long, default_value_t = 1)]
    pub hold_ms: u64,

    /// Crash a lock holder first and check that a waiting member takes over.
    #[arg(long)]
    pub crash_holder: bool,

    /// Config file (YAML) used for every member.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write lock events of all members to this NDJSON file.
    #[arg(long)]
    pub event_log: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Available config actions.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as YAML.
    ///
    /// Without a path, prints the defaults.
    Show(ConfigArgs),

    /// Check a config file and report the first problem found.
    Validate(ConfigArgs),
}

/// Arguments for the `config show` and `config validate` commands.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Path to the config file.
    pub path: Option<PathBuf>,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Default log filter for the requested verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
