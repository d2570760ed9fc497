//! autoheal daemon CLI entry point.

use anyhow::Result;
use clap::Parser;

mod cmd;

#[derive(Parser)]
#[command(name = "autoheal-daemon")]
#[command(about = "Supervises a container runtime and restarts unhealthy containers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<cmd::Commands>,

    /// Path to the system configuration file.
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(cmd::Commands::Config { action }) => {
            cmd::config::run(action).await?;
        }
        Some(cmd::Commands::Diagnostics) => {
            cmd::diagnostics::run(&cli.config).await?;
        }
        None => {
            let code = cmd::root::run(&cli.config).await?;
            std::process::exit(code.into());
        }
    }

    Ok(())
}
