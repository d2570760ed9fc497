//! The sweep: the periodic tick that drives C3 → C4 → C7 → C5 → C6 → C10
//! over every container the runtime reports (§2, §4.7).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{Event, EventKind, EventStatus};
use crate::external_monitor::ExternalMonitorCache;
use crate::health;
use crate::identity::stable_id;
use crate::runtime::{ContainerState, RuntimeAdapter};
use crate::scheduler::RestartScheduler;
use crate::selection::is_monitored;
use crate::store::StateStore;
use crate::EventBus;

/// Run one sweep over every container the runtime currently reports.
/// Never propagates a per-container error (§7): a failure to inspect or
/// evaluate one container is logged and the sweep moves to the next.
pub async fn run_once(
    runtime: &dyn RuntimeAdapter,
    store: &StateStore,
    events: &EventBus,
    scheduler: &RestartScheduler,
    external_cache: &ExternalMonitorCache,
    shutdown: &CancellationToken,
) {
    let config = store.get_config();
    if !config.monitoring_active {
        return;
    }

    let containers = match runtime.list(true).await {
        Ok(c) => c,
        Err(e) => {
            warn!("sweep: failed to list containers: {}", e);
            return;
        }
    };

    for container in &containers {
        let stable_id = stable_id(container);

        if config.quarantined.contains(&stable_id) {
            if container.state != ContainerState::Running {
                continue;
            }
            let verdict = health::evaluate(runtime, &config, &stable_id, container, external_cache).await;
            if !verdict.needs_restart {
                store.unquarantine(&stable_id);
                store.clear_restarts(&stable_id);
                scheduler.reset(&stable_id);
                let count = store.get_restart_count(&stable_id);
                crate::events::emit(
                    store,
                    events,
                    Event::new(
                        &stable_id,
                        &container.name,
                        EventKind::AutoUnquarantine,
                        count,
                        EventStatus::Enabled,
                        "auto-released: evaluator reports healthy",
                    ),
                );
            }
            continue;
        }

        if !is_monitored(&config, &stable_id, container) {
            continue;
        }

        let verdict = health::evaluate(runtime, &config, &stable_id, container, external_cache).await;
        debug!(stable_id = %stable_id, needs_restart = verdict.needs_restart, reason = %verdict.reason, "evaluated");
        if !verdict.needs_restart {
            continue;
        }

        scheduler
            .handle_needs_restart(
                runtime,
                store,
                events,
                &config,
                &stable_id,
                &container.id,
                &container.name,
                &verdict.reason,
                shutdown,
            )
            .await;
    }
}

/// Long-lived sweep task: ticks every `interval_seconds`, cancellable via
/// `shutdown`.
pub async fn run(
    runtime: Arc<dyn RuntimeAdapter>,
    store: Arc<StateStore>,
    events: Arc<EventBus>,
    scheduler: Arc<RestartScheduler>,
    external_cache: Arc<ExternalMonitorCache>,
    shutdown: CancellationToken,
) {
    loop {
        let interval = store.get_config().monitor.interval_seconds.max(1);

        run_once(
            runtime.as_ref(),
            store.as_ref(),
            events.as_ref(),
            scheduler.as_ref(),
            external_cache.as_ref(),
            &shutdown,
        )
        .await;

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(interval)) => {}
            _ = shutdown.cancelled() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RestartMode;
    use crate::runtime::NativeHealth;
    use crate::testutil::sample_container;

    #[tokio::test]
    async fn crash_looping_container_is_quarantined_after_max_restarts() {
        let mut container = sample_container("c1", "api");
        container.state = ContainerState::Exited;
        container.exit_code = 1;
        let runtime = crate::testutil::FakeRuntime::new().with_container(container);

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        store
            .update_config(|c| {
                c.monitor.include_all = true;
                c.restart.mode = RestartMode::OnFailure;
                c.restart.max_restarts = 2;
                c.restart.cooldown_seconds = 0;
                c.restart.backoff.enabled = false;
                Ok(())
            })
            .unwrap();

        let events = EventBus::new();
        let scheduler = RestartScheduler::new();
        let cache = ExternalMonitorCache::new();
        let shutdown = CancellationToken::new();

        for _ in 0..3 {
            run_once(&runtime, &store, &events, &scheduler, &cache, &shutdown).await;
        }

        assert!(store.is_quarantined("api"));
    }

    #[tokio::test]
    async fn quarantined_container_releases_once_healthy() {
        let mut container = sample_container("c1", "api");
        container.state = ContainerState::Running;
        container.native_health = Some(NativeHealth {
            status: crate::runtime::NativeHealthStatus::Healthy,
            failing_streak: 0,
        });
        let runtime = crate::testutil::FakeRuntime::new().with_container(container);

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        store.quarantine("api");
        store
            .update_config(|c| {
                c.monitor.include_all = true;
                c.restart.mode = RestartMode::Health;
                Ok(())
            })
            .unwrap();

        let events = EventBus::new();
        let scheduler = RestartScheduler::new();
        let cache = ExternalMonitorCache::new();
        let shutdown = CancellationToken::new();

        run_once(&runtime, &store, &events, &scheduler, &cache, &shutdown).await;

        assert!(!store.is_quarantined("api"));
    }

    #[tokio::test]
    async fn monitoring_inactive_skips_sweep_entirely() {
        let mut container = sample_container("c1", "api");
        container.state = ContainerState::Exited;
        container.exit_code = 1;
        let runtime = crate::testutil::FakeRuntime::new().with_container(container);

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        store
            .update_config(|c| {
                c.monitor.include_all = true;
                c.monitoring_active = false;
                Ok(())
            })
            .unwrap();

        let events = EventBus::new();
        let scheduler = RestartScheduler::new();
        let cache = ExternalMonitorCache::new();
        let shutdown = CancellationToken::new();

        run_once(&runtime, &store, &events, &scheduler, &cache, &shutdown).await;

        assert_eq!(store.get_restart_count("api"), 0);
    }

    #[tokio::test]
    async fn manual_stop_respected_with_restart_mode_onfailure() {
        let mut container = sample_container("c1", "api");
        container.state = ContainerState::Exited;
        container.exit_code = 0;
        let runtime = crate::testutil::FakeRuntime::new().with_container(container);

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        store
            .update_config(|c| {
                c.monitor.include_all = true;
                c.restart.mode = RestartMode::OnFailure;
                c.restart.respect_manual_stop = true;
                Ok(())
            })
            .unwrap();

        let events = EventBus::new();
        let scheduler = RestartScheduler::new();
        let cache = ExternalMonitorCache::new();
        let shutdown = CancellationToken::new();

        run_once(&runtime, &store, &events, &scheduler, &cache, &shutdown).await;

        assert_eq!(store.get_restart_count("api"), 0);
    }
}
