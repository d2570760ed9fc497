//! Core façade: the single object the admin layer and `main.rs` depend
//! on. Owns every shared component and exposes only the narrow surface
//! the admin HTTP layer actually needs, per the redesign note in spec §9
//! ("components should be owned by an explicit `Core`/`App` struct
//! passed by reference, not singletons").

use std::sync::Arc;

use crate::config::Configuration;
use crate::error::{DaemonError, Result};
use crate::events::Event;
use crate::external_monitor::ExternalMonitorCache;
use crate::health::Probe;
use crate::runtime::RuntimeAdapter;
use crate::scheduler::RestartScheduler;
use crate::store::StateStore;
use crate::EventBus;

/// A container row as surfaced to the admin layer: identity plus the
/// locally tracked state that makes the API useful (§6 `GET containers`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContainerSummary {
    pub stable_id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub monitored: bool,
    pub quarantined: bool,
    pub restart_count: u32,
    pub external_status: Option<String>,
}

/// Aggregate counts for `GET status` (§6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusSummary {
    pub monitoring_active: bool,
    pub maintenance_enabled: bool,
    pub total_containers: usize,
    pub monitored_containers: usize,
    pub quarantined_containers: usize,
}

/// Owns every long-lived component; cheap to clone (everything inside is
/// an `Arc`).
#[derive(Clone)]
pub struct Core {
    pub runtime: Arc<dyn RuntimeAdapter>,
    pub store: Arc<StateStore>,
    pub events: Arc<EventBus>,
    pub scheduler: Arc<RestartScheduler>,
    pub external_cache: Arc<ExternalMonitorCache>,
}

impl Core {
    pub fn new(
        runtime: Arc<dyn RuntimeAdapter>,
        store: Arc<StateStore>,
        events: Arc<EventBus>,
        scheduler: Arc<RestartScheduler>,
        external_cache: Arc<ExternalMonitorCache>,
    ) -> Self {
        Self {
            runtime,
            store,
            events,
            scheduler,
            external_cache,
        }
    }

    pub async fn status(&self) -> Result<StatusSummary> {
        let config = self.store.get_config();
        let containers = self
            .runtime
            .list(true)
            .await
            .map_err(DaemonError::Runtime)?;
        let monitored_containers = containers
            .iter()
            .filter(|c| {
                let stable_id = crate::identity::stable_id(c);
                crate::selection::is_monitored(&config, &stable_id, c)
            })
            .count();

        Ok(StatusSummary {
            monitoring_active: config.monitoring_active,
            maintenance_enabled: config.maintenance.enabled,
            total_containers: containers.len(),
            monitored_containers,
            quarantined_containers: config.quarantined.len(),
        })
    }

    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let config = self.store.get_config();
        let containers = self
            .runtime
            .list(true)
            .await
            .map_err(DaemonError::Runtime)?;

        let mut summaries = Vec::with_capacity(containers.len());
        for container in containers {
            let stable_id = crate::identity::stable_id(&container);
            let monitored = crate::selection::is_monitored(&config, &stable_id, &container);
            let external_status = self
                .external_cache
                .status(&stable_id)
                .map(|s| format!("{:?}", s).to_lowercase());
            summaries.push(ContainerSummary {
                name: container.name.clone(),
                image: container.image.clone(),
                state: format!("{:?}", container.state).to_lowercase(),
                monitored,
                quarantined: config.quarantined.contains(&stable_id),
                restart_count: config.selection.restart_counts.get(&stable_id).copied().unwrap_or(0),
                external_status,
                stable_id,
            });
        }
        Ok(summaries)
    }

    pub fn get_config(&self) -> Configuration {
        self.store.get_config()
    }

    pub fn set_selection(&self, stable_id: &str, enabled: bool) {
        if enabled {
            self.store.select(stable_id);
        } else {
            self.store.exclude(stable_id);
        }
    }

    pub async fn restart_now(&self, id_or_name: &str) -> Result<()> {
        let container = self
            .runtime
            .inspect(id_or_name)
            .await
            .map_err(DaemonError::Runtime)?;
        self.runtime
            .restart(&container.id, std::time::Duration::from_secs(10))
            .await
            .map_err(DaemonError::Runtime)?;
        Ok(())
    }

    pub fn unquarantine(&self, stable_id: &str) {
        self.store.unquarantine(stable_id);
        self.store.clear_restarts(stable_id);
        self.scheduler.reset(stable_id);
    }

    pub fn get_events(&self, limit: usize) -> Vec<Event> {
        self.store.get_events(limit)
    }

    pub fn clear_events(&self) {
        self.store.clear_events();
    }

    pub fn enable_maintenance(&self) {
        self.store.enable_maintenance();
    }

    pub fn disable_maintenance(&self) {
        self.store.disable_maintenance();
    }

    pub fn set_probe(&self, stable_id: &str, probe: Probe) {
        self.store.set_probe(stable_id, probe);
    }

    pub fn remove_probe(&self, stable_id: &str) {
        self.store.remove_probe(stable_id);
    }

    pub fn update_config<F>(&self, mutator: F) -> Result<()>
    where
        F: FnOnce(&mut Configuration) -> crate::store::StoreResult<()>,
    {
        self.store
            .update_config(mutator)
            .map_err(|e| DaemonError::Validation(e.to_string()))
    }
}
