//! Runtime Adapter (C1)
//!
//! Abstracts the container runtime: list, inspect, restart, exec, the
//! event stream, and the TCP/HTTP/exec probes used by the health evaluator.
//! Modeled on the `ProcessEnvironment` trait, generalized from a
//! single-container handle to a runtime-wide adapter since the sweep needs
//! to enumerate every container, not just one it already owns.

pub mod docker;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for runtime adapter operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("operation timed out")]
    Timeout,

    #[error("container has no reachable network address")]
    Unreachable,

    #[error("{0}")]
    Other(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Lifecycle state of a container, as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Starting,
    Running,
    Exited,
    Stopped,
    Dead,
    Restarting,
    Paused,
}

impl ContainerState {
    /// States the health evaluator treats as "the container has stopped".
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ContainerState::Exited | ContainerState::Stopped | ContainerState::Dead
        )
    }
}

/// Native Docker healthcheck status, if the image defines one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeHealthStatus {
    Healthy,
    Unhealthy,
    Starting,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NativeHealth {
    pub status: NativeHealthStatus,
    pub failing_streak: u32,
}

/// A container as observed by the runtime adapter, per §3.
#[derive(Debug, Clone)]
pub struct Container {
    /// Runtime-assigned id (opaque, changes on re-creation).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub exit_code: i64,
    pub labels: HashMap<String, String>,
    pub native_health: Option<NativeHealth>,
    /// Primary network address, if one can be resolved, used by probes to
    /// rewrite loopback-relative endpoints.
    pub primary_address: Option<String>,
}

/// A single runtime event delivered by [`RuntimeAdapter::events`].
#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    pub kind: String,
    pub container_id: String,
}

/// Abstracts the container runtime so the healing logic is agnostic of the
/// underlying technology. A `DockerRuntime` backs this with `bollard`; a
/// [`crate::testutil::FakeRuntime`] backs it in tests.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// List containers. `all=false` restricts to running containers.
    async fn list(&self, all: bool) -> RuntimeResult<Vec<Container>>;

    /// Inspect a single container by id or name, refreshing its state.
    async fn inspect(&self, id_or_name: &str) -> RuntimeResult<Container>;

    /// Restart a container with a bounded timeout.
    async fn restart(&self, container_id: &str, timeout: Duration) -> RuntimeResult<()>;

    /// Execute a command inside the container, returning (exit_code, stdout).
    async fn exec(&self, container_id: &str, argv: &[String]) -> RuntimeResult<(i64, String)>;

    /// Subscribe to `type=container` runtime events, filtered by `event`.
    /// Returns a receiver fed by a dedicated blocking reader task so the
    /// caller's event loop is never blocked on the subscription itself.
    async fn events(&self, event_filter: &str) -> RuntimeResult<mpsc::Receiver<RuntimeEvent>>;

    /// Verify connectivity to the runtime; used to detect and recover a
    /// severed connection between sweeps.
    async fn ping(&self) -> RuntimeResult<()>;

    /// Probe an HTTP endpoint on the container. Loopback hosts in `url`
    /// are substituted with the container's discovered primary address.
    async fn probe_http(
        &self,
        container: &Container,
        url: &str,
        expected_status: u16,
        timeout: Duration,
    ) -> RuntimeResult<bool>;

    /// Probe a TCP port on the container.
    async fn probe_tcp(
        &self,
        container: &Container,
        port: u16,
        timeout: Duration,
    ) -> RuntimeResult<bool>;

    /// Run a command inside the container and treat exit code 0 as healthy.
    async fn probe_exec(
        &self,
        container: &Container,
        argv: &[String],
        timeout: Duration,
    ) -> RuntimeResult<bool>;
}

/// Rewrites a loopback host (`localhost`, `127.0.0.1`) in `endpoint` with
/// the container's discovered primary address, so operators can write
/// probes relative to the container itself.
pub fn resolve_loopback(endpoint: &str, primary_address: Option<&str>) -> RuntimeResult<String> {
    let needs_resolution = endpoint.contains("localhost") || endpoint.contains("127.0.0.1");
    if !needs_resolution {
        return Ok(endpoint.to_string());
    }
    let addr = primary_address.ok_or(RuntimeError::Unreachable)?;
    Ok(endpoint
        .replace("127.0.0.1", addr)
        .replace("localhost", addr))
}
