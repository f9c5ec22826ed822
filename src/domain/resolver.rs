use log::warn;

use super::model::{ImageIdentity, ManagedContainer};
use super::port::{ContainerRuntime, RuntimeError};

/// Result of comparing a container's running image against its desired
/// reference, by content identity.
#[derive(Debug)]
pub enum ImageStatus {
    UpToDate {
        identity: ImageIdentity,
    },
    Outdated {
        /// Identity backing the running container; `None` when the container
        /// is absent or could not be inspected.
        current: Option<ImageIdentity>,
        desired: ImageIdentity,
    },
    /// Hard stop for this container's cycle. Never collapsed into "no
    /// update needed".
    PullFailed { error: RuntimeError },
}

/// Decide whether `container` needs replacing. The desired reference is
/// pulled first so that a floating tag resolves to whatever the registry
/// currently publishes, then identities are compared. Tag strings never
/// participate in the decision.
pub async fn needs_update(
    runtime: &dyn ContainerRuntime,
    container: &ManagedContainer,
) -> ImageStatus {
    let desired = match runtime.pull_image(&container.image).await {
        Ok(identity) => identity,
        Err(error) => return ImageStatus::PullFailed { error },
    };

    let current = match runtime.container_image_identity(&container.name).await {
        Ok(current) => current,
        Err(e) => {
            // Treated as "container absent": the replacement path recreates
            // it under the desired image either way.
            warn!("Could not inspect current image of {}: {}", container.name, e);
            None
        }
    };

    match current {
        Some(identity) if identity == desired => ImageStatus::UpToDate { identity },
        current => ImageStatus::Outdated { current, desired },
    }
}
