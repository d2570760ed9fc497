//! Restart Scheduler (C6)
//!
//! Enforces cooldown, exponential backoff, and the max-restarts →
//! quarantine transition; issues the restart and records the outcome.
//! I4 (at most one restart in flight per stable_id) is implemented with a
//! keyed lock — one [`Locker`] per stable_id, the same semaphore-backed
//! mutual-exclusion primitive as `system/locker.rs`, generalized from a
//! single global lock to a `DashMap` of per-id lockers per the redesign
//! note in spec §9.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Configuration;
use crate::events::{emit, Event, EventKind, EventStatus};
use crate::runtime::RuntimeAdapter;
use crate::store::StateStore;
use crate::system::locker::Locker;
use crate::EventBus;

const RESTART_TIMEOUT: Duration = Duration::from_secs(10);

/// In-memory, per-stable_id scheduling state: lost on process restart,
/// reconstructible from the next sweep's cooldown/backoff decisions.
#[derive(Clone, Copy)]
struct SchedulerState {
    last_restart_at: Option<Instant>,
    next_backoff_seconds: u64,
}

impl SchedulerState {
    fn new(initial_backoff: u64) -> Self {
        Self {
            last_restart_at: None,
            next_backoff_seconds: initial_backoff,
        }
    }
}

/// Owns the keyed lockers and per-id scheduling state for every stable_id
/// seen so far.
pub struct RestartScheduler {
    lockers: DashMap<String, Arc<Locker>>,
    state: Mutex<HashMap<String, SchedulerState>>,
}

impl RestartScheduler {
    pub fn new() -> Self {
        Self {
            lockers: DashMap::new(),
            state: Mutex::new(HashMap::new()),
        }
    }

    fn locker_for(&self, stable_id: &str) -> Arc<Locker> {
        self.lockers
            .entry(stable_id.to_string())
            .or_insert_with(|| Arc::new(Locker::new()))
            .clone()
    }

    /// Clear per-id scheduler state, called on auto-unquarantine so a
    /// released container starts its backoff clean (§4.7).
    pub fn reset(&self, stable_id: &str) {
        self.state.lock().remove(stable_id);
    }

    /// Drive one restart decision for `stable_id`, per §4.6. Returns
    /// without acting if maintenance is enabled, the cooldown hasn't
    /// elapsed, or another restart for the same stable_id is already in
    /// flight (I4).
    pub async fn handle_needs_restart(
        &self,
        runtime: &dyn RuntimeAdapter,
        store: &StateStore,
        events: &EventBus,
        config: &Configuration,
        stable_id: &str,
        container_id: &str,
        container_name: &str,
        reason: &str,
        shutdown: &CancellationToken,
    ) {
        if config.maintenance.enabled {
            return;
        }

        let locker = self.locker_for(stable_id);
        let _guard = match locker.try_acquire() {
            Ok(guard) => guard,
            Err(_) => {
                // A restart for this stable_id is already in flight.
                return;
            }
        };

        {
            let state = self.state.lock();
            if let Some(s) = state.get(stable_id) {
                if let Some(last) = s.last_restart_at {
                    if last.elapsed() < Duration::from_secs(config.restart.cooldown_seconds) {
                        return;
                    }
                }
            }
        }

        let count = store.get_restart_count(stable_id);
        if count >= config.restart.max_restarts {
            store.quarantine(stable_id);
            emit(
                store,
                events,
                Event::new(
                    stable_id,
                    container_name,
                    EventKind::Quarantine,
                    count,
                    EventStatus::Quarantined,
                    format!("max_restarts ({}) reached", config.restart.max_restarts),
                ),
            );
            info!(stable_id, count, "quarantined after exceeding max_restarts");
            return;
        }

        if config.restart.backoff.enabled {
            let sleep_for = {
                let state = self.state.lock();
                state
                    .get(stable_id)
                    .map(|s| s.next_backoff_seconds)
                    .unwrap_or(config.restart.backoff.initial_seconds)
            };
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(sleep_for)) => {}
                _ = shutdown.cancelled() => return,
            }
        }

        let restart_result = runtime.restart(container_id, RESTART_TIMEOUT).await;
        let now = Instant::now();
        let new_count = store.record_restart(stable_id);

        let mut state = self.state.lock();
        let entry = state
            .entry(stable_id.to_string())
            .or_insert_with(|| SchedulerState::new(config.restart.backoff.initial_seconds));
        entry.last_restart_at = Some(now);

        match restart_result {
            Ok(()) => {
                entry.next_backoff_seconds = config.restart.backoff.initial_seconds;
                drop(state);
                emit(
                    store,
                    events,
                    Event::new(
                        stable_id,
                        container_name,
                        EventKind::Restart,
                        new_count,
                        EventStatus::Success,
                        format!("restarted (attempt {}): {}", new_count, reason),
                    ),
                );
            }
            Err(e) => {
                entry.next_backoff_seconds =
                    ((entry.next_backoff_seconds as f64) * config.restart.backoff.multiplier) as u64;
                drop(state);
                warn!(stable_id, error = %e, "restart failed");
                emit(
                    store,
                    events,
                    Event::new(
                        stable_id,
                        container_name,
                        EventKind::Restart,
                        new_count,
                        EventStatus::Failure,
                        format!("restart failed: {} ({})", e, reason),
                    ),
                );
            }
        }
    }
}

impl Default for RestartScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{sample_container, FakeRuntime};

    #[tokio::test]
    async fn second_failure_quarantines_with_max_restarts_one() {
        let runtime = FakeRuntime::new();
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let scheduler = RestartScheduler::new();
        let events = EventBus::new();
        let shutdown = CancellationToken::new();

        let mut config = Configuration::default();
        config.restart.max_restarts = 1;
        config.restart.cooldown_seconds = 0;
        config.restart.backoff.enabled = false;

        scheduler
            .handle_needs_restart(&runtime, &store, &events, &config, "app_api", "c1", "api", "exit:1", &shutdown)
            .await;
        assert!(!store.is_quarantined("app_api"));
        assert_eq!(store.get_restart_count("app_api"), 1);
        let restart_events = store.get_events(10);
        assert!(restart_events.last().unwrap().message.contains("exit:1"));

        scheduler
            .handle_needs_restart(&runtime, &store, &events, &config, "app_api", "c1", "api", "exit:1", &shutdown)
            .await;
        assert!(store.is_quarantined("app_api"));
    }

    #[tokio::test]
    async fn maintenance_suppresses_restart() {
        let runtime = FakeRuntime::new();
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let scheduler = RestartScheduler::new();
        let events = EventBus::new();
        let shutdown = CancellationToken::new();

        let mut config = Configuration::default();
        config.maintenance.enabled = true;

        scheduler
            .handle_needs_restart(&runtime, &store, &events, &config, "app_api", "c1", "api", "exit:1", &shutdown)
            .await;
        assert_eq!(store.get_restart_count("app_api"), 0);
    }

    #[tokio::test]
    async fn cooldown_drops_second_attempt_silently() {
        let runtime = FakeRuntime::new();
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let scheduler = RestartScheduler::new();
        let events = EventBus::new();
        let shutdown = CancellationToken::new();

        let mut config = Configuration::default();
        config.restart.cooldown_seconds = 3600;
        config.restart.backoff.enabled = false;
        config.restart.max_restarts = 100;

        scheduler
            .handle_needs_restart(&runtime, &store, &events, &config, "app_api", "c1", "api", "exit:1", &shutdown)
            .await;
        scheduler
            .handle_needs_restart(&runtime, &store, &events, &config, "app_api", "c1", "api", "exit:1", &shutdown)
            .await;
        assert_eq!(store.get_restart_count("app_api"), 1);
    }

    #[test]
    fn sample_container_has_expected_name() {
        let c = sample_container("c1", "api");
        assert_eq!(c.name, "api");
    }
}
