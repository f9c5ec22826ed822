//! Fallback runtime strategy driving the `docker` command-line client.
//! Used when no daemon socket answers at startup; every operation mirrors
//! the native strategy's behavior over parsed command output.

use std::collections::HashSet;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use itertools::Itertools;
use log::debug;
use tokio::process::Command;

use crate::domain::model::{
    ContainerSnapshot, ImageIdentity, LocalImage, PortMapping, RunSpec,
};
use crate::domain::port::{ContainerRuntime, RuntimeError, RuntimeResult};

const STOP_GRACE_SECS: u32 = 10;

pub struct CliRuntime;

impl CliRuntime {
    pub fn new() -> Self {
        CliRuntime
    }

    async fn docker(&self, args: &[&str]) -> RuntimeResult<String> {
        debug!("docker {}", args.join(" "));
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("docker binary: {e}")))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(RuntimeError::Engine(anyhow!(
                "docker {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn ping(&self) -> RuntimeResult<()> {
        match self.docker(&["version", "--format", "{{.Server.Version}}"]).await {
            Ok(_) => Ok(()),
            Err(RuntimeError::Unavailable(e)) => Err(RuntimeError::Unavailable(e)),
            Err(e) => Err(RuntimeError::Unavailable(e.to_string())),
        }
    }

    async fn container_image_identity(&self, name: &str) -> RuntimeResult<Option<ImageIdentity>> {
        // A failed inspect means "no such container" for our purposes.
        match self
            .docker(&["inspect", "--format", "{{.Image}}", name])
            .await
        {
            Ok(id) if !id.is_empty() => Ok(Some(ImageIdentity(id))),
            Ok(_) => Ok(None),
            Err(RuntimeError::Unavailable(e)) => Err(RuntimeError::Unavailable(e)),
            Err(_) => Ok(None),
        }
    }

    async fn pull_image(&self, reference: &str) -> RuntimeResult<ImageIdentity> {
        self.docker(&["pull", reference])
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
        match self
            .docker(&["image", "inspect", "--format", "{{.Id}}", reference])
            .await
        {
            Ok(id) if !id.is_empty() => Ok(Some(ImageIdentity(id))),
            Ok(_) => Ok(None),
            Err(RuntimeError::Unavailable(e)) => Err(RuntimeError::Unavailable(e)),
            Err(_) => Ok(None),
        }
    }

    async fn container_spec(&self, name: &str) -> RuntimeResult<ContainerSnapshot> {
        let raw = self.docker(&["inspect", name]).await.map_err(|e| match e {
            RuntimeError::Unavailable(e) => RuntimeError::Unavailable(e),
            _ => RuntimeError::NotFound(name.into()),
        })?;
        parse_inspect(name, &raw).map_err(RuntimeError::Engine)
    }

    async fn stop_and_remove(&self, name: &str) -> RuntimeResult<()> {
        // Already-stopped and already-absent both count as success.
        let grace = STOP_GRACE_SECS.to_string();
        if let Err(e) = self.docker(&["stop", "--time", &grace, name]).await {
            debug!("docker stop {name}: {e}");
        }
        if let Err(e) = self.docker(&["rm", name]).await {
            debug!("docker rm {name}: {e}");
        }
        Ok(())
    }

    async fn run(&self, spec: &RunSpec) -> RuntimeResult<()> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            spec.name.clone(),
            "--restart".into(),
            "unless-stopped".into(),
        ];
        for port in &spec.ports {
            args.push("-p".into());
            args.push(port.to_string());
        }
        for var in &spec.env {
            args.push("-e".into());
            args.push(var.clone());
        }
        args.push(spec.image.clone());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.docker(&args).await.map(|_| ())
    }

    async fn unreferenced_images(&self) -> RuntimeResult<Vec<LocalImage>> {
        let listing = self
            .docker(&[
                "images",
                "--no-trunc",
                "--format",
                "{{.ID}}\t{{.Repository}}:{{.Tag}}",
            ])
            .await?;
        let images = parse_image_listing(&listing);

        let ids = self.docker(&["ps", "-aq", "--no-trunc"]).await?;
        let mut referenced: HashSet<ImageIdentity> = HashSet::new();
        if !ids.is_empty() {
            let mut args = vec!["inspect", "--format", "{{.Image}}"];
            args.extend(ids.lines());
            referenced = self
                .docker(&args)
                .await?
                .lines()
                .map(|id| ImageIdentity(id.trim().to_string()))
                .unique()
                .collect();
        }
        Ok(super::select_unreferenced(images, &referenced))
    }

    async fn remove_image(&self, image: &LocalImage) -> RuntimeResult<()> {
        self.docker(&["rmi", "-f", &image.id.0]).await.map(|_| ())
    }
}

/// Extract the functional configuration from `docker inspect` JSON.
fn parse_inspect(name: &str, raw: &str) -> Result<ContainerSnapshot, anyhow::Error> {
    let documents: serde_json::Value =
        serde_json::from_str(raw).context("unparseable docker inspect output")?;
    let detail = documents
        .get(0)
        .ok_or_else(|| anyhow!("docker inspect returned nothing for {name}"))?;

    let image = detail
        .pointer("/Config/Image")
        .and_then(|v| v.as_str())
        .or_else(|| detail.get("Image").and_then(|v| v.as_str()))
        .ok_or_else(|| anyhow!("{name} has no image in inspect output"))?
        .to_string();

    let env = detail
        .pointer("/Config/Env")
        .and_then(|v| v.as_array())
        .map(|vars| {
            vars.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let mut ports = Vec::new();
    if let Some(bindings) = detail
        .pointer("/HostConfig/PortBindings")
        .and_then(|v| v.as_object())
    {
        for (container_port, binds) in bindings {
            let Some(container) = container_port
                .split('/')
                .next()
                .and_then(|p| p.parse::<u16>().ok())
            else {
                continue;
            };
            for bind in binds.as_array().into_iter().flatten() {
                if let Some(host) = bind
                    .get("HostPort")
                    .and_then(|v| v.as_str())
                    .and_then(|p| p.parse::<u16>().ok())
                {
                    ports.push(PortMapping { host, container });
                }
            }
        }
    }
    ports.sort_by_key(|p| (p.container, p.host));

    Ok(ContainerSnapshot { name: name.into(), image, ports, env })
}

/// Parse `docker images --format '{{.ID}}\t{{.Repository}}:{{.Tag}}'`
/// output, grouping tags per image ID in listing order.
fn parse_image_listing(listing: &str) -> Vec<LocalImage> {
    let mut images: Vec<LocalImage> = Vec::new();
    for line in listing.lines() {
        let Some((id, tag)) = line.split_once('\t') else { continue };
        let id = id.trim();
        if id.is_empty() {
            continue;
        }
        let tag = tag.trim();
        let tags: Vec<String> = if tag.contains("<none>") {
            Vec::new()
        } else {
            vec![tag.to_string()]
        };
        match images.iter_mut().find(|image| image.id.0 == id) {
            Some(image) => image.tags.extend(tags),
            None => images.push(LocalImage { id: ImageIdentity(id.to_string()), tags }),
        }
    }
    images
}
