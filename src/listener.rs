//! Runtime Event Listener (C8)
//!
//! Subscribes to `container.start` events and auto-enrolls containers
//! carrying the enrollment label. The event stream itself is read on a
//! dedicated task behind a bounded channel (see `RuntimeAdapter::events`
//! and `runtime::docker::DockerRuntime::events`); this module only
//! consumes that channel and owns the reconnect policy.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::{emit, Event, EventKind, EventStatus};
use crate::runtime::{Container, RuntimeAdapter};
use crate::store::StateStore;
use crate::EventBus;

const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(10);

/// Decide whether `container` should be auto-enrolled, per §4.8's steps
/// 1-5, and do so if so. Shared by the initial sweep and the live stream
/// so both paths apply exactly the same rule.
fn maybe_auto_enroll(store: &StateStore, events: &EventBus, container: &Container) {
    let config = store.get_config();

    let matches_enrollment = container
        .labels
        .get(&config.monitor.enrollment_label_key)
        .map(|v| v == &config.monitor.enrollment_label_value)
        .unwrap_or(false);
    if !matches_enrollment {
        return;
    }

    let stable_id = crate::identity::stable_id(container);

    if config.selection.excluded.contains(&stable_id) {
        info!(stable_id, "auto-enrollment skipped: excluded");
        return;
    }
    if config.selection.selected.contains(&stable_id) {
        return;
    }

    store.select(&stable_id);
    emit(
        store,
        events,
        Event::new(
            &stable_id,
            &container.name,
            EventKind::AutoMonitor,
            0,
            EventStatus::Enabled,
            "auto-enrolled via start event",
        ),
    );
    info!(stable_id, container = %container.name, "auto-enrolled");
}

/// One-shot reconciliation over currently running containers, run once at
/// startup before the live stream is consulted (§4.8).
pub async fn initial_sweep(runtime: &dyn RuntimeAdapter, store: &StateStore, events: &EventBus) {
    let containers = match runtime.list(false).await {
        Ok(c) => c,
        Err(e) => {
            warn!("initial sweep: failed to list containers: {}", e);
            return;
        }
    };
    for container in &containers {
        maybe_auto_enroll(store, events, container);
    }
}

/// Run the listener until `shutdown` is cancelled. Reconnects with a
/// fixed delay if the event subscription fails or the stream ends.
pub async fn run(
    runtime: Arc<dyn RuntimeAdapter>,
    store: Arc<StateStore>,
    events: Arc<EventBus>,
    shutdown: CancellationToken,
) {
    initial_sweep(runtime.as_ref(), store.as_ref(), events.as_ref()).await;

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let mut rx = match runtime.events("start").await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("event listener: subscribe failed ({}), retrying in 10s", e);
                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                    _ = shutdown.cancelled() => return,
                }
            }
        };

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(evt) => {
                            match runtime.inspect(&evt.container_id).await {
                                Ok(container) => maybe_auto_enroll(store.as_ref(), events.as_ref(), &container),
                                Err(e) => warn!("event listener: inspect failed: {}", e),
                            }
                        }
                        None => {
                            warn!("event listener: stream closed, reconnecting in 10s");
                            break;
                        }
                    }
                }
                _ = shutdown.cancelled() => return,
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown.cancelled() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sample_container;

    #[test]
    fn auto_enrolls_when_label_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let events = EventBus::new();
        let mut container = sample_container("c1", "api");
        container
            .labels
            .insert("autoheal".to_string(), "true".to_string());

        maybe_auto_enroll(&store, &events, &container);

        let config = store.get_config();
        assert!(config.selection.selected.contains("api"));
        assert_eq!(store.get_events(10).len(), 1);
    }

    #[test]
    fn skips_excluded_container() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let events = EventBus::new();
        store.exclude("api");
        let mut container = sample_container("c1", "api");
        container
            .labels
            .insert("autoheal".to_string(), "true".to_string());

        maybe_auto_enroll(&store, &events, &container);

        let config = store.get_config();
        assert!(!config.selection.selected.contains("api"));
    }

    #[test]
    fn no_duplicate_enrollment_event() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let events = EventBus::new();
        let mut container = sample_container("c1", "api");
        container
            .labels
            .insert("autoheal".to_string(), "true".to_string());

        maybe_auto_enroll(&store, &events, &container);
        maybe_auto_enroll(&store, &events, &container);

        assert_eq!(store.get_events(10).len(), 1);
    }
}
