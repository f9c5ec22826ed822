use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One entry of the managed-container list. Supplied by the configuration
/// store and read-only to the update engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedContainer {
    pub name: String,
    /// Desired registry reference (repository + tag).
    pub image: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default)]
    pub health_check_url: Option<String>,
    #[serde(default)]
    pub rollback_on_failure: bool,
    /// Recreation hint for the command-line runtime path, which cannot
    /// recover structured port metadata once the container is gone.
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub env: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

/// A host:container TCP port pair, written as `"8080:80"` in configuration
/// and snapshots, matching docker's own `-p` syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl FromStr for PortMapping {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (host, container) = value
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("expected host:container, got {value:?}"))?;
        Ok(PortMapping {
            host: host.trim().parse()?,
            container: container.trim().parse()?,
        })
    }
}

impl TryFrom<String> for PortMapping {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortMapping> for String {
    fn from(value: PortMapping) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

/// Content identifier of an image build (engine image ID or digest).
/// Tags are mutable and cannot answer "has this changed?", so equality is
/// only ever decided on this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageIdentity(pub String);

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Functional configuration of a container captured immediately before it
/// is stopped for replacement. One record per name, overwrite-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub name: String,
    /// Exact image reference the container was created from.
    pub image: String,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub env: Vec<String>,
}

/// Everything the runtime needs to create and start a container. Replacement
/// and rollback both go through this; the restart policy is always
/// `unless-stopped`.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    pub ports: Vec<PortMapping>,
    pub env: Vec<String>,
}

impl RunSpec {
    pub fn for_update(container: &ManagedContainer) -> Self {
        RunSpec {
            name: container.name.clone(),
            image: container.image.clone(),
            ports: container.ports.clone(),
            env: container.env.clone(),
        }
    }

    pub fn from_snapshot(snapshot: &ContainerSnapshot) -> Self {
        RunSpec {
            name: snapshot.name.clone(),
            image: snapshot.image.clone(),
            ports: snapshot.ports.clone(),
            env: snapshot.env.clone(),
        }
    }
}

/// A locally stored image as seen by the garbage collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    pub id: ImageIdentity,
    pub tags: Vec<String>,
}

impl LocalImage {
    /// Preferred label for logs and notifications.
    pub fn label(&self) -> &str {
        self.tags.first().map(String::as_str).unwrap_or(&self.id.0)
    }
}

/// Terminal classification of one orchestration run for one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Entry excluded by `enabled`/`auto_update`, not an error.
    Skipped,
    UpToDate,
    Updated,
    PullFailed,
    StartFailed,
    HealthFailed,
    RolledBack,
    RollbackFailed,
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpdateOutcome::Skipped => "skipped",
            UpdateOutcome::UpToDate => "up-to-date",
            UpdateOutcome::Updated => "updated",
            UpdateOutcome::PullFailed => "pull-failed",
            UpdateOutcome::StartFailed => "start-failed",
            UpdateOutcome::HealthFailed => "health-failed",
            UpdateOutcome::RolledBack => "rolled-back",
            UpdateOutcome::RollbackFailed => "rollback-failed",
        };
        f.write_str(label)
    }
}

/// Global flags consumed once per pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalPolicy {
    pub cleanup_unused_images: bool,
    /// Accepted for forward compatibility; tag retention is not enforced yet
    /// and the garbage collector logs a warning when this is set.
    pub cleanup_keep_last_n: Option<u32>,
}
