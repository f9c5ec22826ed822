use anyhow::Error;
use async_trait::async_trait;

use super::model::{ContainerSnapshot, ImageIdentity, LocalImage, RunSpec};

/// Failures surfaced by a container runtime strategy. The orchestrator maps
/// these to per-container outcomes; it never inspects which strategy
/// produced them.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("container engine unavailable: {0}")]
    Unavailable(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("pull failed for {reference}: {message}")]
    Pull { reference: String, message: String },
    #[error(transparent)]
    Engine(#[from] Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Uniform capability set over a container engine. Implemented by the native
/// client strategy and the command-line fallback; both must behave
/// identically for every operation even though one works on structured
/// responses and the other on parsed text.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Availability probe used once at startup for strategy selection.
    async fn ping(&self) -> RuntimeResult<()>;

    /// Identity of the image currently backing the named container, or
    /// `None` when no such container exists.
    async fn container_image_identity(&self, name: &str) -> RuntimeResult<Option<ImageIdentity>>;

    /// Pull a reference from its registry and resolve the identity it now
    /// points at. Pulling is also what refreshes a floating tag locally.
    async fn pull_image(&self, reference: &str) -> RuntimeResult<ImageIdentity>;

    /// Identity of a locally stored reference, `None` when not present.
    async fn image_identity(&self, reference: &str) -> RuntimeResult<Option<ImageIdentity>>;

    /// Live functional configuration of the named container, captured for
    /// the snapshot store.
    async fn container_spec(&self, name: &str) -> RuntimeResult<ContainerSnapshot>;

    /// Stop (bounded grace period) and remove the named container. A
    /// container that is already stopped or absent counts as success.
    async fn stop_and_remove(&self, name: &str) -> RuntimeResult<()>;

    /// Create and start a container with restart policy `unless-stopped`.
    async fn run(&self, spec: &RunSpec) -> RuntimeResult<()>;

    /// Tagged local images with zero referencing containers, running or
    /// stopped.
    async fn unreferenced_images(&self) -> RuntimeResult<Vec<LocalImage>>;

    /// Forced image removal.
    async fn remove_image(&self, image: &LocalImage) -> RuntimeResult<()>;
}

/// Per-name persistence of pre-update container configuration. Writes are
/// atomic and overwrite-only; records are consumed read-only by rollback.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &ContainerSnapshot) -> Result<(), Error>;

    async fn load(&self, name: &str) -> Result<Option<ContainerSnapshot>, Error>;
}

/// Liveness verification of a freshly started container. Stateless per
/// invocation.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self, url: &str) -> bool;
}

/// Best-effort outbound alert sink. Delivery failures are logged by the
/// implementation and never propagated into orchestration.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}
