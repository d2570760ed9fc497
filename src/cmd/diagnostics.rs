//! `diagnostics`: connect to the container runtime and print what the
//! daemon would see, without starting any long-lived task.

use anyhow::Result;
use bollard::Docker;

use autoheal_daemon::config::SystemConfig;

pub async fn run(config_path: &str) -> Result<()> {
    println!("autoheal daemon diagnostics");
    println!("===========================\n");

    let system_config = SystemConfig::load(config_path).unwrap_or_default();
    println!("Configuration:");
    println!("  data directory: {}", system_config.data_directory.display());
    println!("  admin bind: {}:{}", system_config.admin_host, system_config.admin_port);

    println!("\nContainer runtime:");
    let connection = match system_config.docker_socket.as_deref() {
        Some(path) => Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION),
        None => Docker::connect_with_local_defaults(),
    };
    match connection {
        Ok(docker) => {
            match docker.version().await {
                Ok(version) => {
                    println!("  version: {}", version.version.unwrap_or_default());
                    println!("  api version: {}", version.api_version.unwrap_or_default());
                    println!(
                        "  os/arch: {}/{}",
                        version.os.unwrap_or_default(),
                        version.arch.unwrap_or_default()
                    );
                }
                Err(e) => println!("  error getting version: {}", e),
            }

            match docker.info().await {
                Ok(info) => {
                    println!("  containers: {}", info.containers.unwrap_or(0));
                    println!("    running: {}", info.containers_running.unwrap_or(0));
                    println!("    paused: {}", info.containers_paused.unwrap_or(0));
                    println!("    stopped: {}", info.containers_stopped.unwrap_or(0));
                    println!("  storage driver: {}", info.driver.unwrap_or_default());
                }
                Err(e) => println!("  error getting info: {}", e),
            }
        }
        Err(e) => {
            println!("  error connecting to the runtime: {}", e);
            println!("  make sure the container runtime is running and accessible.");
        }
    }

    println!("\ndiagnostics complete.");
    Ok(())
}
