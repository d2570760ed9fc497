//! Configuration: the static system settings loaded once at startup, and
//! the dynamic [`Configuration`] document persisted by the state store.
//!
//! Split the same way the teacher splits a static `SystemConfiguration`
//! (paths, sockets) from request-driven, mutable state — except here the
//! "mutable state" is itself the governed document from spec §3 rather
//! than a panel-synced server list.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::health::Probe;

/// Settings read once from a TOML file at process start. Unlike
/// [`Configuration`], this is never mutated at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    /// Directory holding the persisted `config`/`events`/`quarantine`/
    /// `maintenance` documents.
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,

    /// Docker socket override; `None` uses the platform default.
    #[serde(default)]
    pub docker_socket: Option<String>,

    /// Log verbosity when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Admin façade bind address.
    #[serde(default = "default_admin_host")]
    pub admin_host: String,

    /// Admin façade bind port.
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
            docker_socket: None,
            log_level: default_log_level(),
            admin_host: default_admin_host(),
            admin_port: default_admin_port(),
        }
    }
}

fn default_data_directory() -> PathBuf {
    PathBuf::from(".autoheal/data")
}

fn default_log_level() -> String {
    "info".into()
}

fn default_admin_host() -> String {
    "0.0.0.0".into()
}

fn default_admin_port() -> u16 {
    8912
}

impl SystemConfig {
    /// Load from a TOML file; resolve relative paths against the file's
    /// parent directory, the same way the teacher resolves `system.*`
    /// paths against the config file location.
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file: {}", path))?;

        let mut config: SystemConfig =
            toml::from_str(&content).with_context(|| "failed to parse configuration")?;

        let base_dir = config_path
            .parent()
            .and_then(|p| if p.as_os_str().is_empty() { None } else { Some(p) })
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        if config.data_directory.is_relative() {
            config.data_directory = base_dir.join(&config.data_directory);
        }

        Ok(config)
    }
}

/// `monitor` sub-document (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub interval_seconds: u64,
    pub enrollment_label_key: String,
    pub enrollment_label_value: String,
    pub include_all: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            enrollment_label_key: "autoheal".into(),
            enrollment_label_value: "true".into(),
            include_all: false,
        }
    }
}

/// Restart mode: which signals trigger a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartMode {
    OnFailure,
    Health,
    Both,
}

/// `restart.backoff` sub-document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub enabled: bool,
    pub initial_seconds: u64,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_seconds: 5,
            multiplier: 2.0,
        }
    }
}

/// `restart` sub-document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    pub mode: RestartMode,
    pub cooldown_seconds: u64,
    pub max_restarts: u32,
    pub window_seconds: u64,
    pub backoff: BackoffConfig,
    pub respect_manual_stop: bool,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            mode: RestartMode::OnFailure,
            cooldown_seconds: 60,
            max_restarts: 3,
            window_seconds: 3600,
            backoff: BackoffConfig::default(),
            respect_manual_stop: true,
        }
    }
}

/// `selection` sub-document: membership lists plus the persisted restart
/// counters (kept here, not in a separate document, because I1 ties their
/// mutation together under the same lock).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub selected: HashSet<String>,
    pub excluded: HashSet<String>,
    pub restart_counts: HashMap<String, u32>,
}

/// `filters` sub-document: glob patterns on names, `key=value` pairs on
/// labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiltersConfig {
    pub whitelist_names: Vec<String>,
    pub blacklist_names: Vec<String>,
    pub whitelist_labels: Vec<String>,
    pub blacklist_labels: Vec<String>,
}

/// One entry in the external monitor's stable_id ↔ friendly-name mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorMapping {
    pub stable_id: String,
    pub external_name: String,
    pub auto_mapped: bool,
}

/// `external_monitor` sub-document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalMonitorConfig {
    pub enabled: bool,
    pub url: String,
    /// HTTP Basic credentials; username is commonly empty, with the
    /// password field carrying an API key (§6).
    pub username: String,
    pub password: String,
    pub auto_restart_on_down: bool,
    pub mappings: Vec<MonitorMapping>,
}

/// `maintenance` sub-document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Alerting decision, independent of the notification sink's transport
/// (§1 treats the sink as out of scope; this is the *decision* of whether
/// to additionally alert on quarantine events, recovered from
/// `original_source/app/config/config_manager.py`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub webhook: Option<String>,
    pub notify_on_quarantine: bool,
}

/// The single persisted configuration document (spec §3). The state store
/// (C2) is the only component allowed to mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub monitor: MonitorConfig,
    pub restart: RestartConfig,
    pub selection: SelectionConfig,
    pub filters: FiltersConfig,
    pub custom_probes: HashMap<String, Probe>,
    pub external_monitor: ExternalMonitorConfig,
    pub maintenance: MaintenanceConfig,
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub quarantined: HashSet<String>,
    /// Pauses the sweep entirely, distinct from maintenance mode which
    /// only suppresses restarts (SPEC_FULL §3).
    #[serde(default = "default_monitoring_active")]
    pub monitoring_active: bool,
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
}

fn default_monitoring_active() -> bool {
    true
}

fn default_max_log_entries() -> usize {
    200
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            restart: RestartConfig::default(),
            selection: SelectionConfig::default(),
            filters: FiltersConfig::default(),
            custom_probes: HashMap::new(),
            external_monitor: ExternalMonitorConfig::default(),
            maintenance: MaintenanceConfig::default(),
            alerts: AlertsConfig::default(),
            quarantined: HashSet::new(),
            monitoring_active: true,
            max_log_entries: 200,
        }
    }
}

impl Configuration {
    /// I1: a stable_id is in `selected` XOR `excluded`. Adds to `selected`
    /// and removes from `excluded`.
    pub fn select(&mut self, stable_id: &str) {
        self.selection.selected.insert(stable_id.to_string());
        self.selection.excluded.remove(stable_id);
    }

    /// I1: a stable_id is in `selected` XOR `excluded`. Adds to `excluded`
    /// and removes from `selected`.
    pub fn exclude(&mut self, stable_id: &str) {
        self.selection.excluded.insert(stable_id.to_string());
        self.selection.selected.remove(stable_id);
    }
}

