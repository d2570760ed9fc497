//! `config validate`: load the system config and the persisted
//! configuration document, report problems, and exit without starting
//! the daemon.

use anyhow::Result;
use clap::Subcommand;
use tracing::info;

use autoheal_daemon::config::SystemConfig;
use autoheal_daemon::store::StateStore;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Load the config file and the persisted document, print a summary.
    Validate {
        /// Path to the system config file.
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

pub async fn run(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Validate { config } => validate(&config).await,
    }
}

async fn validate(config_path: &str) -> Result<()> {
    let system_config = SystemConfig::load(config_path)?;
    println!("system config: {} — OK", config_path);
    println!("  data_directory: {}", system_config.data_directory.display());
    println!("  admin: {}:{}", system_config.admin_host, system_config.admin_port);

    let store = StateStore::open(&system_config.data_directory)?;
    let document = store.get_config();
    println!("persisted configuration — OK");
    println!("  monitor.interval_seconds: {}", document.monitor.interval_seconds);
    println!("  restart.mode: {:?}", document.restart.mode);
    println!("  restart.max_restarts: {}", document.restart.max_restarts);
    println!("  selected: {}", document.selection.selected.len());
    println!("  excluded: {}", document.selection.excluded.len());
    println!("  quarantined: {}", document.quarantined.len());
    println!("  custom_probes: {}", document.custom_probes.len());

    info!("configuration validated successfully");
    Ok(())
}
