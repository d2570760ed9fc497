//! State Store (C2)
//!
//! Single in-memory authoritative document guarded by one lock; every
//! mutation snapshots the document and writes it to durable storage using
//! write-temp-then-rename, the same atomic-write idiom the teacher uses
//! in `backup/backup.rs` (`.tmp` suffix + `tokio::fs::rename`), applied
//! here to JSON documents instead of archives.
//!
//! Per-domain files (config, events, quarantine, maintenance) are
//! separated on disk for operational clarity; the atomicity guarantee is
//! per-file, matching §4.2.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::{Configuration, MaintenanceConfig};
use crate::events::Event;
use crate::health::Probe;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("data directory and its fallback are both unwritable")]
    Unwritable,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// On-disk shape of the `events` file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct EventsDoc {
    events: VecDeque<Event>,
}

/// On-disk shape of the `quarantine` file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct QuarantineDoc {
    quarantined: std::collections::HashSet<String>,
}

/// On-disk shape of the `config` file: everything in [`Configuration`]
/// except the event log and quarantine set, which live in their own
/// files.
#[derive(Debug, Serialize, Deserialize)]
struct ConfigDoc {
    monitor: crate::config::MonitorConfig,
    restart: crate::config::RestartConfig,
    selection: crate::config::SelectionConfig,
    filters: crate::config::FiltersConfig,
    custom_probes: std::collections::HashMap<String, Probe>,
    external_monitor: crate::config::ExternalMonitorConfig,
    alerts: crate::config::AlertsConfig,
    monitoring_active: bool,
    max_log_entries: usize,
}

impl From<&Configuration> for ConfigDoc {
    fn from(c: &Configuration) -> Self {
        Self {
            monitor: c.monitor.clone(),
            restart: c.restart.clone(),
            selection: c.selection.clone(),
            filters: c.filters.clone(),
            custom_probes: c.custom_probes.clone(),
            external_monitor: c.external_monitor.clone(),
            alerts: c.alerts.clone(),
            monitoring_active: c.monitoring_active,
            max_log_entries: c.max_log_entries,
        }
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => T::default(),
    }
}

/// Narrow, idempotent façade over the persisted document, matching
/// §4.2's operation list. Components never touch the files directly.
pub struct StateStore {
    data_dir: PathBuf,
    inner: RwLock<Configuration>,
    events: RwLock<VecDeque<Event>>,
}

impl StateStore {
    /// Open (or seed) the store at `data_dir`. Falls back to a
    /// working-directory location if `data_dir` is not writable, per
    /// §4.2, and only returns [`StoreError::Unwritable`] if both fail.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        let resolved_dir = match std::fs::create_dir_all(data_dir) {
            Ok(()) => data_dir.to_path_buf(),
            Err(e) => {
                warn!(
                    "data directory {} not writable ({}); falling back to ./autoheal-data",
                    data_dir.display(),
                    e
                );
                let fallback = PathBuf::from("./autoheal-data");
                std::fs::create_dir_all(&fallback).map_err(|_| StoreError::Unwritable)?;
                fallback
            }
        };

        let config_path = resolved_dir.join("config");
        let events_path = resolved_dir.join("events");
        let quarantine_path = resolved_dir.join("quarantine");
        let maintenance_path = resolved_dir.join("maintenance");

        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                let doc: ConfigDoc = serde_json::from_str(&content)?;
                Configuration {
                    monitor: doc.monitor,
                    restart: doc.restart,
                    selection: doc.selection,
                    filters: doc.filters,
                    custom_probes: doc.custom_probes,
                    external_monitor: doc.external_monitor,
                    alerts: doc.alerts,
                    maintenance: MaintenanceConfig::default(),
                    quarantined: Default::default(),
                    monitoring_active: doc.monitoring_active,
                    max_log_entries: doc.max_log_entries,
                }
            }
            Err(_) => Configuration::default(),
        };

        let quarantine_doc: QuarantineDoc = read_or_default(&quarantine_path);
        config.quarantined = quarantine_doc.quarantined;

        config.maintenance = read_or_default(&maintenance_path);

        let events_doc: EventsDoc = read_or_default(&events_path);

        let store = Self {
            data_dir: resolved_dir,
            inner: RwLock::new(config),
            events: RwLock::new(events_doc.events),
        };

        if !events_path.exists() {
            let events_snapshot = store.events.read().clone();
            store.persist_events(&events_snapshot)?;
        }

        Ok(store)
    }

    fn persist_config(&self, config: &Configuration) -> StoreResult<()> {
        let doc = ConfigDoc::from(config);
        let bytes = serde_json::to_vec_pretty(&doc)?;
        write_atomic(&self.data_dir.join("config"), &bytes)?;
        Ok(())
    }

    fn persist_quarantine(&self, quarantined: &std::collections::HashSet<String>) -> StoreResult<()> {
        let doc = QuarantineDoc {
            quarantined: quarantined.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        write_atomic(&self.data_dir.join("quarantine"), &bytes)?;
        Ok(())
    }

    fn persist_maintenance(&self, maintenance: &MaintenanceConfig) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(maintenance)?;
        write_atomic(&self.data_dir.join("maintenance"), &bytes)?;
        Ok(())
    }

    fn persist_events(&self, events: &VecDeque<Event>) -> StoreResult<()> {
        let doc = EventsDoc {
            events: events.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        write_atomic(&self.data_dir.join("events"), &bytes)?;
        Ok(())
    }

    /// Log-and-continue wrapper for persistence failures (§7): the
    /// mutation always survives in memory even if the write fails.
    fn log_persist_failure(result: StoreResult<()>) {
        if let Err(e) = result {
            warn!("persistence failure (state remains correct in memory): {}", e);
        }
    }

    // ---- config ----

    pub fn get_config(&self) -> Configuration {
        self.inner.read().clone()
    }

    /// Apply a mutation to the document and persist the config file.
    /// Rejects the mutation (leaving in-memory state untouched) if
    /// `validate` returns an error, per the config-validation-failure
    /// taxonomy entry in §7.
    pub fn update_config<F>(&self, mutator: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Configuration) -> StoreResult<()>,
    {
        let mut guard = self.inner.write();
        let mut candidate = guard.clone();
        mutator(&mut candidate)?;
        *guard = candidate.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_config(&candidate));
        Ok(())
    }

    // ---- events ----

    pub fn add_event(&self, event: Event) {
        let max = self.inner.read().max_log_entries;
        let mut guard = self.events.write();
        guard.push_back(event);
        while guard.len() > max {
            guard.pop_front();
        }
        let snapshot = guard.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_events(&snapshot));
    }

    pub fn get_events(&self, n: usize) -> Vec<Event> {
        let guard = self.events.read();
        guard.iter().rev().take(n).cloned().collect::<Vec<_>>().into_iter().rev().collect()
    }

    pub fn clear_events(&self) {
        let mut guard = self.events.write();
        guard.clear();
        drop(guard);
        Self::log_persist_failure(self.persist_events(&VecDeque::new()));
    }

    // ---- restart counters (Q1: total count, never windowed) ----

    pub fn record_restart(&self, stable_id: &str) -> u32 {
        let mut guard = self.inner.write();
        let count = guard
            .selection
            .restart_counts
            .entry(stable_id.to_string())
            .or_insert(0);
        *count += 1;
        let new_count = *count;
        let snapshot = guard.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_config(&snapshot));
        new_count
    }

    /// Ignores any notion of a time window, matching
    /// `config_manager.get_restart_count`'s behavior (Q1): this returns
    /// the raw persisted total, not a sliding-window count.
    pub fn get_restart_count(&self, stable_id: &str) -> u32 {
        self.inner
            .read()
            .selection
            .restart_counts
            .get(stable_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn clear_restarts(&self, stable_id: &str) {
        let mut guard = self.inner.write();
        guard.selection.restart_counts.remove(stable_id);
        let snapshot = guard.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_config(&snapshot));
    }

    /// Q2: garbage collection of restart counters is intentionally
    /// disabled, matching `cleanup_restart_counts`'s no-op body in the
    /// source ("DISABLED to preserve manual entries"). Kept as an
    /// explicit no-op rather than omitted so the decision is visible.
    pub fn cleanup_restart_counts(&self) {}

    // ---- quarantine ----

    pub fn is_quarantined(&self, stable_id: &str) -> bool {
        self.inner.read().quarantined.contains(stable_id)
    }

    /// Idempotent: quarantining an already-quarantined id is a no-op.
    pub fn quarantine(&self, stable_id: &str) {
        let mut guard = self.inner.write();
        if !guard.quarantined.insert(stable_id.to_string()) {
            return;
        }
        let snapshot = guard.quarantined.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_quarantine(&snapshot));
    }

    /// Idempotent: unquarantining an absent id is a no-op.
    pub fn unquarantine(&self, stable_id: &str) {
        let mut guard = self.inner.write();
        if !guard.quarantined.remove(stable_id) {
            return;
        }
        let snapshot = guard.quarantined.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_quarantine(&snapshot));
    }

    // ---- custom probes ----

    pub fn get_probe(&self, stable_id: &str) -> Option<Probe> {
        self.inner.read().custom_probes.get(stable_id).cloned()
    }

    pub fn set_probe(&self, stable_id: &str, probe: Probe) {
        let mut guard = self.inner.write();
        guard.custom_probes.insert(stable_id.to_string(), probe);
        let snapshot = guard.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_config(&snapshot));
    }

    pub fn remove_probe(&self, stable_id: &str) {
        let mut guard = self.inner.write();
        guard.custom_probes.remove(stable_id);
        let snapshot = guard.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_config(&snapshot));
    }

    // ---- maintenance ----

    pub fn enable_maintenance(&self) {
        let mut guard = self.inner.write();
        guard.maintenance.enabled = true;
        guard.maintenance.started_at = Some(chrono::Utc::now());
        let snapshot = guard.maintenance.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_maintenance(&snapshot));
    }

    pub fn disable_maintenance(&self) {
        let mut guard = self.inner.write();
        guard.maintenance.enabled = false;
        guard.maintenance.started_at = None;
        let snapshot = guard.maintenance.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_maintenance(&snapshot));
    }

    pub fn is_maintenance_enabled(&self) -> bool {
        self.inner.read().maintenance.enabled
    }

    // ---- selection ----

    /// Add to `selected`, enforcing I1 by removing from `excluded`.
    pub fn select(&self, stable_id: &str) {
        let mut guard = self.inner.write();
        guard.select(stable_id);
        let snapshot = guard.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_config(&snapshot));
    }

    /// Add to `excluded`, enforcing I1 by removing from `selected`.
    pub fn exclude(&self, stable_id: &str) {
        let mut guard = self.inner.write();
        guard.exclude(stable_id);
        let snapshot = guard.clone();
        drop(guard);
        Self::log_persist_failure(self.persist_config(&snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn seeds_defaults_when_absent() {
        let (_dir, store) = temp_store();
        let config = store.get_config();
        assert_eq!(config.max_log_entries, 200);
    }

    #[test]
    fn restart_counter_is_total_not_windowed() {
        let (_dir, store) = temp_store();
        store.record_restart("app_api");
        store.record_restart("app_api");
        assert_eq!(store.get_restart_count("app_api"), 2);
    }

    #[test]
    fn quarantine_is_idempotent() {
        let (_dir, store) = temp_store();
        store.quarantine("app_api");
        store.quarantine("app_api");
        assert!(store.is_quarantined("app_api"));
        store.unquarantine("app_api");
        store.unquarantine("app_api");
        assert!(!store.is_quarantined("app_api"));
    }

    #[test]
    fn select_then_exclude_then_select_ends_selected() {
        let (_dir, store) = temp_store();
        store.select("app_api");
        store.exclude("app_api");
        store.select("app_api");
        let config = store.get_config();
        assert!(config.selection.selected.contains("app_api"));
        assert!(!config.selection.excluded.contains("app_api"));
    }

    #[test]
    fn excluding_a_selected_container_actually_excludes_it() {
        let (_dir, store) = temp_store();
        store.select("app_api");
        store.exclude("app_api");
        let config = store.get_config();
        assert!(config.selection.excluded.contains("app_api"));
        assert!(!config.selection.selected.contains("app_api"));
    }

    #[test]
    fn event_log_is_capped() {
        let (_dir, store) = temp_store();
        store
            .update_config(|c| {
                c.max_log_entries = 3;
                Ok(())
            })
            .unwrap();
        for i in 0..5 {
            store.add_event(Event::new(
                "app_api",
                "api-1",
                crate::events::EventKind::Restart,
                i,
                crate::events::EventStatus::Success,
                "test",
            ));
        }
        assert_eq!(store.get_events(100).len(), 3);
    }

    #[test]
    fn config_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = StateStore::open(dir.path()).unwrap();
            store.select("app_api");
            store.quarantine("app_api");
        }
        let reopened = StateStore::open(dir.path()).unwrap();
        let config = reopened.get_config();
        assert!(config.selection.selected.contains("app_api"));
        assert!(reopened.is_quarantined("app_api"));
    }

    #[test]
    fn counter_persists_across_re_creation_of_container() {
        let (_dir, store) = temp_store();
        store.record_restart("app_api");
        // simulate re-creation: stable_id unchanged, runtime id differs
        assert_eq!(store.get_restart_count("app_api"), 1);
        store.record_restart("app_api");
        assert_eq!(store.get_restart_count("app_api"), 2);
    }
}
