//! Main daemon command: bootstraps every long-lived task and serves the
//! admin façade until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use autoheal_daemon::config::SystemConfig;
use autoheal_daemon::core::Core;
use autoheal_daemon::events::EventBus;
use autoheal_daemon::external_monitor::{self, ExternalMonitorCache};
use autoheal_daemon::listener;
use autoheal_daemon::runtime::docker::DockerRuntime;
use autoheal_daemon::runtime::RuntimeAdapter;
use autoheal_daemon::scheduler::RestartScheduler;
use autoheal_daemon::store::StateStore;
use autoheal_daemon::sweep;
use autoheal_daemon::admin;

use crate::cmd::ExitCode;

/// Run the daemon. Returns the process exit code, per §6: 0 on clean
/// shutdown, non-zero on fatal init failure.
pub async fn run(config_path: &str) -> Result<ExitCode> {
    let system_config = match SystemConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load system configuration: {}", e);
            return Ok(ExitCode::FatalInit);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("autoheal_daemon={}", system_config.log_level).into()),
        )
        .init();

    info!("starting autoheal daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("data directory: {}", system_config.data_directory.display());

    let runtime: Arc<dyn RuntimeAdapter> =
        match DockerRuntime::connect(system_config.docker_socket.as_deref()) {
            Ok(r) => Arc::new(r),
            Err(e) => {
                error!("failed to connect to the container runtime: {}", e);
                return Ok(ExitCode::FatalInit);
            }
        };

    if let Err(e) = runtime.ping().await {
        error!("container runtime unreachable at startup: {}", e);
        return Ok(ExitCode::FatalInit);
    }

    let store = match StateStore::open(&system_config.data_directory) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("state store unavailable: {}", e);
            return Ok(ExitCode::FatalInit);
        }
    };

    let events = Arc::new(EventBus::new());
    let scheduler = Arc::new(RestartScheduler::new());
    let external_cache = Arc::new(ExternalMonitorCache::new());
    let shutdown = CancellationToken::new();

    let core = Core::new(
        runtime.clone(),
        store.clone(),
        events.clone(),
        scheduler.clone(),
        external_cache.clone(),
    );

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(sweep::run(
        runtime.clone(),
        store.clone(),
        events.clone(),
        scheduler.clone(),
        external_cache.clone(),
        shutdown.clone(),
    )));

    tasks.push(tokio::spawn(listener::run(
        runtime.clone(),
        store.clone(),
        events.clone(),
        shutdown.clone(),
    )));

    {
        let store = store.clone();
        let external_cache = external_cache.clone();
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            let client = reqwest::Client::new();
            loop {
                external_monitor::poll_once(&client, &store, &external_cache).await;
                let interval = store.get_config().monitor.interval_seconds.max(1);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
                    _ = shutdown.cancelled() => return,
                }
            }
        }));
    }

    let bind_addr = format!("{}:{}", system_config.admin_host, system_config.admin_port);
    let listener_socket = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind admin façade on {}", bind_addr))?;
    info!("admin façade listening on {}", bind_addr);

    let app = admin::build_router(core);
    let admin_shutdown = shutdown.clone();
    let admin_task = tokio::spawn(async move {
        axum::serve(listener_socket, app)
            .with_graceful_shutdown(async move { admin_shutdown.cancelled().await })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("received shutdown signal");
        }
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
    for task in tasks {
        let _ = task.await;
    }
    let _ = admin_task.await;

    info!("daemon stopped");
    Ok(ExitCode::Clean)
}
