//! Health Evaluator (C5) and the [`Probe`] discriminated union.
//!
//! Ported from `monitoring_engine.py::_evaluate_container_health` and its
//! custom-probe dispatch. Represented as a tagged enum, not a dictionary
//! of optional fields, per the redesign note in spec §9.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{Configuration, RestartMode};
use crate::external_monitor::ExternalMonitorCache;
use crate::runtime::{Container, ContainerState, NativeHealthStatus, RuntimeAdapter};

/// A custom health probe, configured per stable_id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Probe {
    Http {
        endpoint: String,
        expected_status: u16,
        timeout_seconds: u64,
        retries: u32,
    },
    Tcp {
        port: u16,
        timeout_seconds: u64,
        retries: u32,
    },
    Exec {
        argv: Vec<String>,
        timeout_seconds: u64,
        retries: u32,
    },
    /// No custom probe configured; defers entirely to the runtime's
    /// native healthcheck.
    Native,
}

impl Probe {
    fn retries(&self) -> u32 {
        match self {
            Probe::Http { retries, .. } => *retries,
            Probe::Tcp { retries, .. } => *retries,
            Probe::Exec { retries, .. } => *retries,
            Probe::Native => 0,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Probe::Http { .. } => "http",
            Probe::Tcp { .. } => "tcp",
            Probe::Exec { .. } => "exec",
            Probe::Native => "native",
        }
    }

    /// Execute the probe against a container, retrying up to
    /// `retries` times. A timeout or transport error counts as a
    /// failure for non-native kinds (§4.5).
    async fn execute(&self, runtime: &dyn RuntimeAdapter, container: &Container) -> bool {
        let attempts = 1 + self.retries();
        for _ in 0..attempts {
            let ok = match self {
                Probe::Http {
                    endpoint,
                    expected_status,
                    timeout_seconds,
                    ..
                } => runtime
                    .probe_http(
                        container,
                        endpoint,
                        *expected_status,
                        Duration::from_secs(*timeout_seconds),
                    )
                    .await
                    .unwrap_or(false),
                Probe::Tcp {
                    port,
                    timeout_seconds,
                    ..
                } => runtime
                    .probe_tcp(container, *port, Duration::from_secs(*timeout_seconds))
                    .await
                    .unwrap_or(false),
                Probe::Exec {
                    argv,
                    timeout_seconds,
                    ..
                } => runtime
                    .probe_exec(container, argv, Duration::from_secs(*timeout_seconds))
                    .await
                    .unwrap_or(false),
                Probe::Native => return true,
            };
            if ok {
                return true;
            }
        }
        false
    }
}

/// Resolve a custom probe for a container, honoring the legacy
/// lookup-by-name/runtime-id fallback from Q3. Reads only; callers that
/// persist new probes always key by stable_id.
pub fn resolve_custom_probe<'a>(
    config: &'a Configuration,
    stable_id: &str,
    container: &Container,
) -> Option<&'a Probe> {
    config
        .custom_probes
        .get(stable_id)
        .or_else(|| config.custom_probes.get(&container.name))
        .or_else(|| config.custom_probes.get(&container.id))
}

/// `(needs_restart, reason)` verdict produced by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub needs_restart: bool,
    pub reason: String,
}

impl Verdict {
    fn no(reason: impl Into<String>) -> Self {
        Self {
            needs_restart: false,
            reason: reason.into(),
        }
    }

    fn yes(reason: impl Into<String>) -> Self {
        Self {
            needs_restart: true,
            reason: reason.into(),
        }
    }
}

/// Evaluate whether a container needs a restart, per §4.5.
///
/// All probe dispatch happens here, off the sweep's own scheduling
/// concern; the evaluator itself has no side effects beyond the probe
/// I/O it performs.
pub async fn evaluate(
    runtime: &dyn RuntimeAdapter,
    config: &Configuration,
    stable_id: &str,
    container: &Container,
    external_cache: &ExternalMonitorCache,
) -> Verdict {
    if container.state == ContainerState::Starting {
        return Verdict::no("starting");
    }

    let mode = config.restart.mode;

    if container.state.is_terminal() && matches!(mode, RestartMode::OnFailure | RestartMode::Both)
    {
        if container.exit_code == 0 && config.restart.respect_manual_stop {
            return Verdict::no("manual stop");
        }
        return Verdict::yes(format!("exit:{}", container.exit_code));
    }

    if matches!(mode, RestartMode::Health | RestartMode::Both) {
        if let Some(probe) = resolve_custom_probe(config, stable_id, container) {
            if !matches!(probe, Probe::Native) {
                let healthy = probe.execute(runtime, container).await;
                if !healthy {
                    return Verdict::yes(format!("custom:{}", probe.kind_name()));
                }
            } else if let Some(native) = &container.native_health {
                if native.status == NativeHealthStatus::Unhealthy {
                    return Verdict::yes("native:unhealthy");
                }
            }
        } else if let Some(native) = &container.native_health {
            if native.status == NativeHealthStatus::Unhealthy {
                return Verdict::yes("native:unhealthy");
            }
        }
    }

    if crate::external_monitor::should_restart_from_external(config, external_cache, stable_id) {
        return Verdict::yes("external:down");
    }

    Verdict::no("")
}
