//! Test doubles shared across unit and integration tests.
//!
//! [`FakeRuntime`] is an in-memory [`RuntimeAdapter`] backed by a
//! `DashMap`, the same concurrent-map idiom used for the real keyed
//! scheduler state, so tests can mutate container state from outside an
//! `&self` method without a `Mutex<Vec<_>>` rebuild on every call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::runtime::{
    Container, ContainerState, RuntimeAdapter, RuntimeError, RuntimeEvent, RuntimeResult,
};

/// A container with sane defaults for tests that only care about a
/// handful of fields.
pub fn sample_container(id: &str, name: &str) -> Container {
    Container {
        id: id.to_string(),
        name: name.to_string(),
        image: "example/image:latest".to_string(),
        state: ContainerState::Running,
        exit_code: 0,
        labels: HashMap::new(),
        native_health: None,
        primary_address: Some("172.18.0.9".to_string()),
    }
}

/// In-memory runtime adapter. Every restart increments a counter so tests
/// can assert on call counts without inspecting the container list.
pub struct FakeRuntime {
    containers: DashMap<String, Container>,
    restart_calls: AtomicI64,
    fail_restarts: std::sync::atomic::AtomicBool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            containers: DashMap::new(),
            restart_calls: AtomicI64::new(0),
            fail_restarts: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn with_container(self, container: Container) -> Self {
        self.containers.insert(container.id.clone(), container);
        self
    }

    pub fn restart_call_count(&self) -> i64 {
        self.restart_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_restarts(&self, fail: bool) {
        self.fail_restarts.store(fail, Ordering::SeqCst);
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeAdapter for FakeRuntime {
    async fn list(&self, _all: bool) -> RuntimeResult<Vec<Container>> {
        Ok(self.containers.iter().map(|e| e.value().clone()).collect())
    }

    async fn inspect(&self, id_or_name: &str) -> RuntimeResult<Container> {
        self.containers
            .iter()
            .find(|e| e.key() == id_or_name || e.value().name == id_or_name)
            .map(|e| e.value().clone())
            .ok_or_else(|| RuntimeError::NotFound(id_or_name.to_string()))
    }

    async fn restart(&self, container_id: &str, _timeout: Duration) -> RuntimeResult<()> {
        self.restart_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_restarts.load(Ordering::SeqCst) {
            return Err(RuntimeError::Other("simulated restart failure".into()));
        }
        if let Some(mut entry) = self.containers.get_mut(container_id) {
            entry.state = ContainerState::Running;
            entry.exit_code = 0;
        }
        Ok(())
    }

    async fn exec(&self, _container_id: &str, _argv: &[String]) -> RuntimeResult<(i64, String)> {
        Ok((0, String::new()))
    }

    async fn events(&self, _event_filter: &str) -> RuntimeResult<mpsc::Receiver<RuntimeEvent>> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn ping(&self) -> RuntimeResult<()> {
        Ok(())
    }

    async fn probe_http(
        &self,
        _container: &Container,
        _url: &str,
        _expected_status: u16,
        _timeout: Duration,
    ) -> RuntimeResult<bool> {
        Ok(true)
    }

    async fn probe_tcp(
        &self,
        _container: &Container,
        _port: u16,
        _timeout: Duration,
    ) -> RuntimeResult<bool> {
        Ok(true)
    }

    async fn probe_exec(
        &self,
        _container: &Container,
        _argv: &[String],
        _timeout: Duration,
    ) -> RuntimeResult<bool> {
        Ok(true)
    }
}
