//! Clusterlock: cluster-wide named locks over a group transport.
//!
//! This is the main entry point for the `clusterlock` CLI. It installs the
//! log subscriber, parses arguments, dispatches to the appropriate command
//! handler, and handles errors with proper exit codes.

mod cli;
mod commands;

use cli::Cli;
use clusterlock::exit_codes;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Logs go to stderr so command output stays machine readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match commands::dispatch(cli.command) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
