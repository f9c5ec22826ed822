use std::collections::HashSet;

use log::{error, info, warn};

use crate::config::AppConfig;
use crate::domain::model::{ImageIdentity, LocalImage};
use crate::domain::port::ContainerRuntime;

pub mod docker;
pub mod docker_cli;
pub mod health;
pub mod notify;
pub mod snapshot;

/// Pick the runtime strategy once at startup: the native client if its
/// socket answers a ping, otherwise the `docker` command-line client. When
/// both probes fail the command-line strategy is still installed so that a
/// pass completes with per-container failures instead of aborting.
pub async fn connect_runtime(config: &AppConfig) -> Box<dyn ContainerRuntime> {
    match docker::DockerRuntime::connect(&config.docker_socket) {
        Ok(runtime) => match runtime.ping().await {
            Ok(()) => {
                info!("Container engine reachable on {}", config.docker_socket);
                return Box::new(runtime);
            }
            Err(e) => warn!("Engine probe on {} failed: {}", config.docker_socket, e),
        },
        Err(e) => warn!("Native engine client initialization failed: {}", e),
    }

    let cli = docker_cli::CliRuntime::new();
    match cli.ping().await {
        Ok(()) => info!("Falling back to the docker command-line client"),
        Err(e) => error!(
            "No container engine reachable; operations will fail until one is: {}",
            e
        ),
    }
    Box::new(cli)
}

/// Garbage-collection candidate filter shared by both runtime strategies,
/// so structured and parsed-text listings agree on what is removable.
/// Untagged images (usually parent layers of retained images) are skipped.
pub(crate) fn select_unreferenced(
    images: Vec<LocalImage>,
    referenced: &HashSet<ImageIdentity>,
) -> Vec<LocalImage> {
    images
        .into_iter()
        .filter(|image| !image.tags.is_empty() && !referenced.contains(&image.id))
        .collect()
}
