//! External Monitor Poller (C9)
//!
//! Periodically fetches a name→status map from an external uptime monitor
//! and exposes `status(stable_id)` through an O(1) cache. Ported from
//! `uptime_kuma_monitor.py`'s polling loop; the reference wire format is
//! Prometheus text exposition, per §6.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::{Configuration, MonitorMapping};
use crate::store::StateStore;

/// Status values the external monitor reports, per §6's Prometheus
/// exposition format (`monitor_status{monitor_name="NAME",...} VALUE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Down,
    Up,
    Pending,
    Maintenance,
}

impl MonitorStatus {
    fn from_value(value: f64) -> Option<Self> {
        match value as i64 {
            0 => Some(MonitorStatus::Down),
            1 => Some(MonitorStatus::Up),
            2 => Some(MonitorStatus::Pending),
            3 => Some(MonitorStatus::Maintenance),
            _ => None,
        }
    }
}

/// O(1) cache of stable_id → external status, keyed via the configured
/// mappings. Failure to refresh leaves the cache untouched (§4.9, §7): a
/// stale cache cannot drive a restart from data that was never updated.
#[derive(Default)]
pub struct ExternalMonitorCache {
    by_stable_id: DashMap<String, MonitorStatus>,
}

impl ExternalMonitorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_down(&self, stable_id: &str) -> bool {
        matches!(self.by_stable_id.get(stable_id).map(|v| *v), Some(MonitorStatus::Down))
    }

    pub fn set_status(&self, stable_id: &str, status: MonitorStatus) {
        self.by_stable_id.insert(stable_id.to_string(), status);
    }

    pub fn status(&self, stable_id: &str) -> Option<MonitorStatus> {
        self.by_stable_id.get(stable_id).map(|v| *v)
    }
}

/// Parse a Prometheus-style text exposition body into friendly_name →
/// status. Lines that don't match `monitor_status{monitor_name="NAME",...} VALUE`
/// are ignored, matching the reference implementation's leniency toward
/// other exported series.
pub fn parse_monitor_status(body: &str) -> HashMap<String, MonitorStatus> {
    let mut result = HashMap::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !line.starts_with("monitor_status{") {
            continue;
        }
        let Some(brace_end) = line.find('}') else {
            continue;
        };
        let labels = &line[..=brace_end];
        let value_part = line[brace_end + 1..].trim();
        let Ok(value) = value_part.parse::<f64>() else {
            continue;
        };
        let Some(name) = extract_label(labels, "monitor_name") else {
            continue;
        };
        if let Some(status) = MonitorStatus::from_value(value) {
            result.insert(name, status);
        }
    }
    result
}

fn extract_label(labels: &str, key: &str) -> Option<String> {
    let needle = format!("{}=\"", key);
    let start = labels.find(&needle)? + needle.len();
    let end = labels[start..].find('"')? + start;
    Some(labels[start..end].to_string())
}

/// Resolve the stable_id ↔ friendly-name mapping for one poll cycle.
fn friendly_name_for(mappings: &[MonitorMapping], stable_id: &str) -> Option<String> {
    mappings
        .iter()
        .find(|m| m.stable_id == stable_id)
        .map(|m| m.external_name.clone())
}

/// `should_restart_from_external` (§4.9): true iff the integration is
/// enabled, auto-restart is on, the stable_id is mapped, and the cached
/// status is down.
pub fn should_restart_from_external(
    config: &Configuration,
    cache: &ExternalMonitorCache,
    stable_id: &str,
) -> bool {
    if !config.external_monitor.enabled || !config.external_monitor.auto_restart_on_down {
        return false;
    }
    if friendly_name_for(&config.external_monitor.mappings, stable_id).is_none() {
        return false;
    }
    cache.is_down(stable_id)
}

/// Fetch the monitor status page and refresh the cache. Never propagates
/// a fetch error to the caller; it logs and leaves the cache as-is (§7).
pub async fn poll_once(
    client: &reqwest::Client,
    store: &StateStore,
    cache: &Arc<ExternalMonitorCache>,
) {
    let config = store.get_config();
    if !config.external_monitor.enabled || config.external_monitor.url.is_empty() {
        return;
    }

    let response = client
        .get(&config.external_monitor.url)
        .basic_auth(&config.external_monitor.username, Some(&config.external_monitor.password))
        .send()
        .await;

    let body = match response {
        Ok(resp) => match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("external monitor fetch failed to read body: {}", e);
                return;
            }
        },
        Err(e) => {
            warn!("external monitor unreachable: {}", e);
            return;
        }
    };

    let statuses = parse_monitor_status(&body);
    debug!(count = statuses.len(), "external monitor statuses parsed");

    for mapping in &config.external_monitor.mappings {
        if let Some(status) = statuses.get(&mapping.external_name) {
            cache.set_status(&mapping.stable_id, *status);
        }
    }
}

/// Auto-seed a mapping by case-insensitive match of container name to
/// monitor friendly name, as the reference implementation does when a
/// container is first enrolled.
pub fn auto_seed_mapping(container_name: &str, friendly_names: &[String]) -> Option<MonitorMapping> {
    friendly_names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(container_name))
        .map(|name| MonitorMapping {
            stable_id: container_name.to_string(),
            external_name: name.clone(),
            auto_mapped: true,
        })
}
