//! CLI command handlers.

use clap::Subcommand;

pub mod config;
pub mod diagnostics;
pub mod root;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a configuration file without starting the daemon.
    Config {
        #[command(subcommand)]
        action: config::ConfigAction,
    },
    /// Connect to the container runtime and print diagnostic information.
    Diagnostics,
}

/// Process exit code, per §6: 0 on clean shutdown, non-zero on fatal
/// init failure.
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Clean,
    FatalInit,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        match code {
            ExitCode::Clean => 0,
            ExitCode::FatalInit => 1,
        }
    }
}
