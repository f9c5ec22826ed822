//! Native runtime strategy backed by the bollard client.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::{CreateImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::secret::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::TryStreamExt;

use crate::domain::model::{
    ContainerSnapshot, ImageIdentity, LocalImage, PortMapping, RunSpec,
};
use crate::domain::port::{ContainerRuntime, RuntimeError, RuntimeResult};

const STOP_GRACE_SECS: i64 = 10;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect(socket: &str) -> Result<Self, anyhow::Error> {
        let docker = Docker::connect_with_socket(socket, 120, API_DEFAULT_VERSION)
            .context("Can't connect to docker socket")?;
        Ok(DockerRuntime { docker })
    }
}

fn is_status(err: &bollard::errors::Error, status: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == status
    )
}

fn engine_err(err: bollard::errors::Error) -> RuntimeError {
    RuntimeError::Engine(err.into())
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> RuntimeResult<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))
    }

    async fn container_image_identity(&self, name: &str) -> RuntimeResult<Option<ImageIdentity>> {
        match self.docker.inspect_container(name, None).await {
            Ok(detail) => Ok(detail.image.map(ImageIdentity)),
            Err(e) if is_status(&e, 404) => Ok(None),
            Err(e) => Err(engine_err(e)),
        }
    }

    async fn pull_image(&self, reference: &str) -> RuntimeResult<ImageIdentity> {
        self.docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: reference,
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| RuntimeError::Pull {
                reference: reference.to_string(),
                message: e.to_string(),
            })?;
        self.image_identity(reference)
            .await?
            .ok_or_else(|| RuntimeError::Pull {
                reference: reference.to_string(),
                message: "image missing after pull".into(),
            })
    }

    async fn image_identity(&self, reference: &str) -> RuntimeResult<Option<ImageIdentity>> {
        match self.docker.inspect_image(reference).await {
            Ok(image) => Ok(image.id.map(ImageIdentity)),
            Err(e) if is_status(&e, 404) => Ok(None),
            Err(e) => Err(engine_err(e)),
        }
    }

    async fn container_spec(&self, name: &str) -> RuntimeResult<ContainerSnapshot> {
        let detail = match self.docker.inspect_container(name, None).await {
            Ok(detail) => detail,
            Err(e) if is_status(&e, 404) => return Err(RuntimeError::NotFound(name.into())),
            Err(e) => return Err(engine_err(e)),
        };
        let config = detail.config.unwrap_or_default();
        // Prefer the reference the container was created from; the engine
        // image ID still restores the same content if the tag is gone.
        let image = config
            .image
            .or(detail.image)
            .ok_or_else(|| RuntimeError::Engine(anyhow::anyhow!("{name} has no image")))?;
        let ports = detail
            .host_config
            .and_then(|host| host.port_bindings)
            .map(|bindings| bindings_to_ports(&bindings))
            .unwrap_or_default();
        Ok(ContainerSnapshot {
            name: name.into(),
            image,
            ports,
            env: config.env.unwrap_or_default(),
        })
    }

    async fn stop_and_remove(&self, name: &str) -> RuntimeResult<()> {
        match self
            .docker
            .stop_container(name, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
        {
            Ok(()) => {}
            // 304: already stopped, 404: already gone. Both count as done.
            Err(e) if is_status(&e, 304) || is_status(&e, 404) => {}
            Err(e) => return Err(engine_err(e)),
        }
        match self
            .docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(engine_err(e)),
        }
    }

    async fn run(&self, spec: &RunSpec) -> RuntimeResult<()> {
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        for port in &spec.ports {
            let key = format!("{}/tcp", port.container);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings
                .entry(key)
                .or_insert_with(|| Some(Vec::new()))
                .get_or_insert_with(Vec::new)
                .push(PortBinding {
                    host_ip: None,
                    host_port: Some(port.host.to_string()),
                });
        }

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.as_str(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(engine_err)?;
        self.docker
            .start_container(spec.name.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(engine_err)
    }

    async fn unreferenced_images(&self) -> RuntimeResult<Vec<LocalImage>> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(engine_err)?;
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(engine_err)?;

        let referenced: HashSet<ImageIdentity> = containers
            .into_iter()
            .filter_map(|container| container.image_id.map(ImageIdentity))
            .collect();
        let local = images
            .into_iter()
            .map(|image| LocalImage {
                id: ImageIdentity(image.id),
                tags: image
                    .repo_tags
                    .into_iter()
                    .filter(|tag| !tag.contains("<none>"))
                    .collect(),
            })
            .collect();
        Ok(super::select_unreferenced(local, &referenced))
    }

    async fn remove_image(&self, image: &LocalImage) -> RuntimeResult<()> {
        self.docker
            .remove_image(
                &image.id.0,
                Some(RemoveImageOptions {
                    force: true,
                    ..Default::default()
                }),
                None,
            )
            .await
            .map(|_| ())
            .map_err(engine_err)
    }
}

fn bindings_to_ports(
    bindings: &HashMap<String, Option<Vec<PortBinding>>>,
) -> Vec<PortMapping> {
    let mut ports = Vec::new();
    for (container_port, binds) in bindings {
        let Some(container) = container_port
            .split('/')
            .next()
            .and_then(|p| p.parse::<u16>().ok())
        else {
            continue;
        };
        for bind in binds.iter().flatten() {
            if let Some(host) = bind.host_port.as_ref().and_then(|p| p.parse::<u16>().ok()) {
                ports.push(PortMapping { host, container });
            }
        }
    }
    // Inspect responses hand back an unordered map.
    ports.sort_by_key(|p| (p.container, p.host));
    ports
}
