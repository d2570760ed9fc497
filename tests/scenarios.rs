//! End-to-end scenarios from the testable-properties section: drive the
//! public surface (`Core`, the sweep tick, the listener's enrollment
//! rule) against a `FakeRuntime` the way an operator's container fleet
//! would actually exercise it, rather than re-checking individual
//! components in isolation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use autoheal_daemon::config::RestartMode;
use autoheal_daemon::core::Core;
use autoheal_daemon::events::EventKind;
use autoheal_daemon::external_monitor::{ExternalMonitorCache, MonitorStatus};
use autoheal_daemon::runtime::{ContainerState, RuntimeAdapter};
use autoheal_daemon::scheduler::RestartScheduler;
use autoheal_daemon::store::StateStore;
use autoheal_daemon::sweep;
use autoheal_daemon::testutil::{sample_container, FakeRuntime};
use autoheal_daemon::EventBus;

fn fresh_store() -> (tempfile::TempDir, Arc<StateStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StateStore::open(dir.path()).unwrap());
    (dir, store)
}

fn make_core(runtime: Arc<dyn RuntimeAdapter>, store: Arc<StateStore>) -> (Core, Arc<EventBus>) {
    let events = Arc::new(EventBus::new());
    let scheduler = Arc::new(RestartScheduler::new());
    let cache = Arc::new(ExternalMonitorCache::new());
    let core = Core::new(runtime, store, events.clone(), scheduler, cache);
    (core, events)
}

#[tokio::test]
async fn crash_loop_triggers_quarantine() {
    let mut container = sample_container("c1", "worker");
    container.state = ContainerState::Exited;
    container.exit_code = 137;
    let runtime: Arc<dyn RuntimeAdapter> = Arc::new(FakeRuntime::new().with_container(container));

    let (_dir, store) = fresh_store();
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

    let (core, _events) = make_core(runtime, store.clone());
    let shutdown = CancellationToken::new();

    for _ in 0..3 {
        sweep::run_once(
            core.runtime.as_ref(),
            core.store.as_ref(),
            core.events.as_ref(),
            core.scheduler.as_ref(),
            core.external_cache.as_ref(),
            &shutdown,
        )
        .await;
    }

    assert!(store.is_quarantined("worker"));

    let events = store.get_events(10);
    let restarts: Vec<_> = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Restart))
        .collect();
    assert_eq!(restarts.len(), 2);
    assert!(restarts.iter().all(|e| e.message.contains("exit:137")));
    let quarantines: Vec<_> = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Quarantine))
        .collect();
    assert_eq!(quarantines.len(), 1);
}

#[tokio::test]
async fn auto_unquarantine_on_self_heal() {
    let mut container = sample_container("c1", "worker");
    container.state = ContainerState::Running;
    container.native_health = Some(autoheal_daemon::runtime::NativeHealth {
        status: autoheal_daemon::runtime::NativeHealthStatus::Healthy,
        failing_streak: 0,
    });
    let runtime: Arc<dyn RuntimeAdapter> = Arc::new(FakeRuntime::new().with_container(container));

    let (_dir, store) = fresh_store();
    store.quarantine("worker");
    store.record_restart("worker");
    store.record_restart("worker");
    store
        .update_config(|c| {
            c.monitor.include_all = true;
            c.restart.mode = RestartMode::Health;
            Ok(())
        })
        .unwrap();

    let (core, _events) = make_core(runtime, store.clone());
    let shutdown = CancellationToken::new();

    sweep::run_once(
        core.runtime.as_ref(),
        core.store.as_ref(),
        core.events.as_ref(),
        core.scheduler.as_ref(),
        core.external_cache.as_ref(),
        &shutdown,
    )
    .await;

    assert!(!store.is_quarantined("worker"));
    assert_eq!(store.get_restart_count("worker"), 0);
    let events = store.get_events(10);
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, EventKind::AutoUnquarantine)));
}

#[tokio::test]
async fn compose_recreation_preserves_restart_counter() {
    let (_dir, store) = fresh_store();
    store
        .update_config(|c| {
            c.monitor.include_all = true;
            c.restart.mode = RestartMode::OnFailure;
            c.restart.max_restarts = 5;
            c.restart.cooldown_seconds = 0;
            c.restart.backoff.enabled = false;
            Ok(())
        })
        .unwrap();

    let mut labels = std::collections::HashMap::new();
    labels.insert("com.docker.compose.project".to_string(), "app".to_string());
    labels.insert("com.docker.compose.service".to_string(), "api".to_string());

    let mut first = sample_container("runtime-id-1", "app_api_1");
    first.labels = labels.clone();
    first.state = ContainerState::Exited;
    first.exit_code = 1;
    let runtime: Arc<dyn RuntimeAdapter> = Arc::new(FakeRuntime::new().with_container(first));

    let (core, _events) = make_core(runtime, store.clone());
    let shutdown = CancellationToken::new();

    sweep::run_once(
        core.runtime.as_ref(),
        core.store.as_ref(),
        core.events.as_ref(),
        core.scheduler.as_ref(),
        core.external_cache.as_ref(),
        &shutdown,
    )
    .await;
    assert_eq!(store.get_restart_count("app_api"), 1);

    // Container deleted and re-created under a new runtime id, same labels.
    let mut second = sample_container("runtime-id-2", "app_api_1");
    second.labels = labels;
    second.state = ContainerState::Exited;
    second.exit_code = 1;
    let runtime2: Arc<dyn RuntimeAdapter> = Arc::new(FakeRuntime::new().with_container(second));

    let (core2, _events2) = make_core(runtime2, store.clone());
    sweep::run_once(
        core2.runtime.as_ref(),
        core2.store.as_ref(),
        core2.events.as_ref(),
        core2.scheduler.as_ref(),
        core2.external_cache.as_ref(),
        &shutdown,
    )
    .await;

    assert_eq!(store.get_restart_count("app_api"), 2);
}

#[tokio::test]
async fn manual_stop_is_not_restarted() {
    let mut container = sample_container("c1", "worker");
    container.state = ContainerState::Exited;
    container.exit_code = 0;
    let runtime: Arc<dyn RuntimeAdapter> = Arc::new(FakeRuntime::new().with_container(container));

    let (_dir, store) = fresh_store();
    store
        .update_config(|c| {
            c.monitor.include_all = true;
            c.restart.mode = RestartMode::OnFailure;
            c.restart.respect_manual_stop = true;
            Ok(())
        })
        .unwrap();

    let (core, _events) = make_core(runtime, store.clone());
    let shutdown = CancellationToken::new();

    sweep::run_once(
        core.runtime.as_ref(),
        core.store.as_ref(),
        core.events.as_ref(),
        core.scheduler.as_ref(),
        core.external_cache.as_ref(),
        &shutdown,
    )
    .await;

    assert_eq!(store.get_restart_count("worker"), 0);
    assert!(store.get_events(10).is_empty());

    let summaries = core.list_containers().await.unwrap();
    let worker = summaries.iter().find(|s| s.stable_id == "worker").unwrap();
    assert!(worker.monitored);
    assert_eq!(worker.restart_count, 0);
}

#[tokio::test]
async fn external_monitor_down_drives_restart_with_cooldown() {
    let mut container = sample_container("c1", "api");
    container.state = ContainerState::Running;
    let runtime: Arc<dyn RuntimeAdapter> = Arc::new(FakeRuntime::new().with_container(container));

    let (_dir, store) = fresh_store();
    store.select("api");
    store
        .update_config(|c| {
            c.restart.mode = RestartMode::OnFailure;
            c.restart.cooldown_seconds = 3600;
            c.restart.backoff.enabled = false;
            c.external_monitor.enabled = true;
            c.external_monitor.auto_restart_on_down = true;
            c.external_monitor.mappings.push(autoheal_daemon::config::MonitorMapping {
                stable_id: "api".into(),
                external_name: "API".into(),
                auto_mapped: false,
            });
            Ok(())
        })
        .unwrap();

    let events = Arc::new(EventBus::new());
    let scheduler = Arc::new(RestartScheduler::new());
    let cache = Arc::new(ExternalMonitorCache::new());
    cache.set_status("api", MonitorStatus::Down);

    let core = Core::new(runtime, store.clone(), events.clone(), scheduler, cache);
    let shutdown = CancellationToken::new();

    sweep::run_once(
        core.runtime.as_ref(),
        core.store.as_ref(),
        core.events.as_ref(),
        core.scheduler.as_ref(),
        core.external_cache.as_ref(),
        &shutdown,
    )
    .await;
    assert_eq!(store.get_restart_count("api"), 1);
    let restart_events = store.get_events(10);
    assert!(restart_events
        .iter()
        .any(|e| matches!(e.kind, EventKind::Restart) && e.message.contains("external:down")));

    // Second cycle within the cooldown window must not restart again.
    sweep::run_once(
        core.runtime.as_ref(),
        core.store.as_ref(),
        core.events.as_ref(),
        core.scheduler.as_ref(),
        core.external_cache.as_ref(),
        &shutdown,
    )
    .await;
    assert_eq!(store.get_restart_count("api"), 1);
}

#[tokio::test]
async fn event_auto_enrollment_no_duplicate_across_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = StateStore::open(dir.path()).unwrap();
        let events = EventBus::new();
        let mut container = sample_container("c1", "worker");
        container
            .labels
            .insert("autoheal".to_string(), "true".to_string());
        autoheal_daemon::listener::initial_sweep(
            &FakeRuntime::new().with_container(container),
            &store,
            &events,
        )
        .await;
        assert_eq!(store.get_events(10).len(), 1);
    }

    // Simulate the daemon restarting: a fresh StateStore reopened from the
    // same data directory, then the same container observed again.
    let store = StateStore::open(dir.path()).unwrap();
    let events = EventBus::new();
    let mut container = sample_container("c1", "worker");
    container
        .labels
        .insert("autoheal".to_string(), "true".to_string());
    autoheal_daemon::listener::initial_sweep(
        &FakeRuntime::new().with_container(container),
        &store,
        &events,
    )
    .await;

    // Already selected from the prior run: no second enrollment event.
    assert_eq!(store.get_events(10).len(), 1);
    assert!(store.get_config().selection.selected.contains("worker"));
}
