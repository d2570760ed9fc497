//! Docker-backed implementation of [`RuntimeAdapter`].
//!
//! Grounded in `environment/docker/environment.rs` and
//! `environment/docker/container.rs`'s use of `bollard` for container
//! lifecycle calls, generalized from a single owned container to listing
//! and inspecting the whole fleet.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, RestartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    Container, ContainerState, NativeHealth, NativeHealthStatus, RuntimeAdapter, RuntimeError,
    RuntimeEvent, RuntimeResult,
};

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect(socket: Option<&str>) -> RuntimeResult<Self> {
        let docker = match socket {
            Some(path) => Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)?,
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(Self { docker })
    }

    fn parse_state(raw: &str) -> ContainerState {
        match raw {
            "created" | "starting" => ContainerState::Starting,
            "running" => ContainerState::Running,
            "exited" => ContainerState::Exited,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Stopped,
        }
    }

    fn primary_address(
        networks: Option<&bollard::models::NetworkSettings>,
    ) -> Option<String> {
        let nets = networks?.networks.as_ref()?;
        nets.values().find_map(|n| n.ip_address.clone()).filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl RuntimeAdapter for DockerRuntime {
    async fn list(&self, all: bool) -> RuntimeResult<Vec<Container>> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let id = match summary.id {
                Some(id) => id,
                None => continue,
            };
            match self.inspect(&id).await {
                Ok(c) => containers.push(c),
                Err(e) => warn!("failed to inspect {}: {}", id, e),
            }
        }
        Ok(containers)
    }

    async fn inspect(&self, id_or_name: &str) -> RuntimeResult<Container> {
        let details = self
            .docker
            .inspect_container(id_or_name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match &e {
                bollard::errors::Error::DockerResponseServerError { status_code, .. }
                    if *status_code == 404 =>
                {
                    RuntimeError::NotFound(id_or_name.to_string())
                }
                _ => RuntimeError::Docker(e),
            })?;

        let id = details.id.clone().unwrap_or_else(|| id_or_name.to_string());
        let name = details
            .name
            .clone()
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string();

        let state = details.state.as_ref();
        let raw_status = state.and_then(|s| s.status).map(|s| s.to_string().to_lowercase());
        let parsed_state = raw_status
            .as_deref()
            .map(Self::parse_state)
            .unwrap_or(ContainerState::Stopped);
        let exit_code = state.and_then(|s| s.exit_code).unwrap_or(0);

        let labels: HashMap<String, String> = details
            .config
            .as_ref()
            .and_then(|c| c.labels.clone())
            .unwrap_or_default();

        let image = details
            .config
            .as_ref()
            .and_then(|c| c.image.clone())
            .unwrap_or_default();

        let native_health = state.and_then(|s| s.health.as_ref()).map(|h| {
            let status = match h.status {
                Some(bollard::models::HealthStatusEnum::HEALTHY) => NativeHealthStatus::Healthy,
                Some(bollard::models::HealthStatusEnum::UNHEALTHY) => {
                    NativeHealthStatus::Unhealthy
                }
                _ => NativeHealthStatus::Starting,
            };
            NativeHealth {
                status,
                failing_streak: h.failing_streak.unwrap_or(0) as u32,
            }
        });

        let primary_address = Self::primary_address(details.network_settings.as_ref());

        Ok(Container {
            id,
            name,
            image,
            state: parsed_state,
            exit_code,
            labels,
            native_health,
            primary_address,
        })
    }

    async fn restart(&self, container_id: &str, timeout: Duration) -> RuntimeResult<()> {
        let options = RestartContainerOptions {
            t: timeout.as_secs() as isize,
        };
        self.docker
            .restart_container(container_id, Some(options))
            .await?;
        Ok(())
    }

    async fn exec(&self, container_id: &str, argv: &[String]) -> RuntimeResult<(i64, String)> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(argv.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut stdout = String::new();
        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(Ok(chunk)) = output.next().await {
                stdout.push_str(&chunk.to_string());
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        Ok((inspect.exit_code.unwrap_or(-1), stdout))
    }

    async fn events(&self, event_filter: &str) -> RuntimeResult<mpsc::Receiver<RuntimeEvent>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        filters.insert("event".to_string(), vec![event_filter.to_string()]);

        let mut stream = self.docker.events(Some(EventsOptions::<String> {
            filters,
            ..Default::default()
        }));

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(ev) => {
                        let container_id = ev
                            .actor
                            .and_then(|a| a.id)
                            .unwrap_or_default();
                        let kind = ev
                            .action
                            .unwrap_or_default();
                        if tx
                            .send(RuntimeEvent { kind, container_id })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("docker event stream error: {}", e);
                        return;
                    }
                }
            }
            debug!("docker event stream ended");
        });

        Ok(rx)
    }

    async fn ping(&self) -> RuntimeResult<()> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn probe_http(
        &self,
        container: &Container,
        url: &str,
        expected_status: u16,
        timeout: Duration,
    ) -> RuntimeResult<bool> {
        let resolved = super::resolve_loopback(url, container.primary_address.as_deref())?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        match client.get(&resolved).send().await {
            Ok(resp) => Ok(resp.status().as_u16() == expected_status),
            Err(_) => Ok(false),
        }
    }

    async fn probe_tcp(
        &self,
        container: &Container,
        port: u16,
        timeout: Duration,
    ) -> RuntimeResult<bool> {
        let addr = container
            .primary_address
            .as_deref()
            .ok_or(RuntimeError::Unreachable)?;
        let target = format!("{}:{}", addr, port);
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&target)).await {
            Ok(Ok(_)) => Ok(true),
            _ => Ok(false),
        }
    }

    async fn probe_exec(
        &self,
        container: &Container,
        argv: &[String],
        timeout: Duration,
    ) -> RuntimeResult<bool> {
        match tokio::time::timeout(timeout, self.exec(&container.id, argv)).await {
            Ok(Ok((exit_code, _))) => Ok(exit_code == 0),
            Ok(Err(_)) | Err(_) => Ok(false),
        }
    }
}

impl From<reqwest::Error> for RuntimeError {
    fn from(e: reqwest::Error) -> Self {
        RuntimeError::Other(e.to_string())
    }
}
