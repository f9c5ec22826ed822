//! Update orchestration: drives each managed container through
//! check -> snapshot -> replace -> verify, with rollback on failure, then
//! garbage-collects unreferenced images once per pass.

use log::{error, info, warn};

use model::{GlobalPolicy, ManagedContainer, RunSpec, UpdateOutcome};
use port::{ContainerRuntime, HealthChecker, Notifier, SnapshotStore};
use resolver::ImageStatus;

pub mod model;
pub mod port;
pub mod resolver;
#[cfg(test)]
pub(crate) mod testkit;

/// The orchestrator and its collaborators, constructed once in `main` and
/// handed the managed-container list for a single run-to-completion pass.
pub struct UpdateService {
    pub runtime: Box<dyn ContainerRuntime>,
    pub snapshots: Box<dyn SnapshotStore>,
    pub health: Box<dyn HealthChecker>,
    pub notifier: Box<dyn Notifier>,
}

/// Process every managed container sequentially, then run image cleanup.
/// A failure for one container never aborts the rest of the pass; the
/// caller receives one terminal outcome per entry.
pub async fn run_pass(
    service: &UpdateService,
    containers: &[ManagedContainer],
    policy: &GlobalPolicy,
) -> Vec<(String, UpdateOutcome)> {
    let mut outcomes = Vec::with_capacity(containers.len());
    for container in containers {
        if !container.enabled || !container.auto_update {
            info!("Skipping {} (disabled or manual updates)", container.name);
            outcomes.push((container.name.clone(), UpdateOutcome::Skipped));
            continue;
        }
        info!("Checking {}...", container.name);
        let outcome = update_container(service, container).await;
        outcomes.push((container.name.clone(), outcome));
    }

    if policy.cleanup_unused_images {
        cleanup_images(service, policy).await;
    }

    outcomes
}

async fn update_container(service: &UpdateService, container: &ManagedContainer) -> UpdateOutcome {
    info!("Pulling {}...", container.image);
    match resolver::needs_update(service.runtime.as_ref(), container).await {
        ImageStatus::PullFailed { error } => {
            error!("Pull failed for {}: {}", container.name, error);
            service
                .notifier
                .notify(&format!("❌ Pull failed for `{}`: `{}`", container.name, error))
                .await;
            UpdateOutcome::PullFailed
        }
        ImageStatus::UpToDate { identity } => {
            info!("{} already up to date ({})", container.name, identity);
            UpdateOutcome::UpToDate
        }
        ImageStatus::Outdated { current, desired } => {
            match current {
                Some(current) => info!(
                    "{} is outdated: {} -> {}",
                    container.name, current, desired
                ),
                None => info!("{} is not running, deploying {}", container.name, desired),
            }
            replace_container(service, container).await
        }
    }
}

/// The destructive leg of an update. Once stop-and-remove has executed
/// there is no cancellation path: the engine always proceeds to attempt a
/// start, and on failure restores from the snapshot when policy asks for it.
async fn replace_container(
    service: &UpdateService,
    container: &ManagedContainer,
) -> UpdateOutcome {
    // Snapshot before anything destructive. Best-effort: losing the
    // snapshot degrades rollback, it does not block the update.
    match service.runtime.container_spec(&container.name).await {
        Ok(spec) => match service.snapshots.save(&spec).await {
            Ok(()) => info!("Saved snapshot for {}", container.name),
            Err(e) => error!("Snapshot save failed for {}: {}", container.name, e),
        },
        Err(e) => warn!("Could not capture configuration of {}: {}", container.name, e),
    }

    if let Err(e) = service.runtime.stop_and_remove(&container.name).await {
        warn!("Could not stop/remove old {}: {}", container.name, e);
    }

    if let Err(e) = service.runtime.run(&RunSpec::for_update(container)).await {
        error!("Start failed for {}: {}", container.name, e);
        service
            .notifier
            .notify(&format!("❌ Start failed for `{}`: `{}`", container.name, e))
            .await;
        return fail_update(service, container, UpdateOutcome::StartFailed).await;
    }
    info!("Started updated {}", container.name);

    if let Some(url) = container.health_check_url.as_deref().filter(|u| !u.is_empty()) {
        info!("Health checking {} at {}...", container.name, url);
        if !service.health.check(url).await {
            error!("Health check failed for {}", container.name);
            service
                .notifier
                .notify(&format!("💔 Health check failed for `{}`", container.name))
                .await;
            return fail_update(service, container, UpdateOutcome::HealthFailed).await;
        }
    }

    service
        .notifier
        .notify(&format!("🎉 Successfully updated `{}`", container.name))
        .await;
    UpdateOutcome::Updated
}

/// Terminal handling after a failed start or health check: roll back when
/// the entry asks for it, otherwise report the bare failure.
async fn fail_update(
    service: &UpdateService,
    container: &ManagedContainer,
    without_rollback: UpdateOutcome,
) -> UpdateOutcome {
    if !container.rollback_on_failure {
        return without_rollback;
    }
    match rollback(service, &container.name).await {
        Ok(()) => {
            service
                .notifier
                .notify(&format!("↩️ Rolled back `{}` due to failure.", container.name))
                .await;
            UpdateOutcome::RolledBack
        }
        Err(e) => {
            // The named container may be absent at this point; this is the
            // one outcome needing operator attention beyond the usual alert.
            error!("Rollback failed for {}: {}", container.name, e);
            service
                .notifier
                .notify(&format!("🚨 Rollback failed for `{}`: `{}`", container.name, e))
                .await;
            UpdateOutcome::RollbackFailed
        }
    }
}

/// Recreate a container from its last snapshot. Restores functional
/// configuration only, never the previous container's identity.
pub async fn rollback(service: &UpdateService, name: &str) -> Result<(), anyhow::Error> {
    let snapshot = service
        .snapshots
        .load(name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no snapshot recorded for {name}"))?;
    // A failed replacement may still occupy the name (for example after a
    // health-check failure). Clearing it is tolerant of absence.
    service.runtime.stop_and_remove(name).await?;
    service
        .runtime
        .run(&RunSpec::from_snapshot(&snapshot))
        .await?;
    info!("Rolled back {} to {}", name, snapshot.image);
    Ok(())
}

/// Remove tagged images with zero referencing containers. Best-effort per
/// image; one failure never aborts the remaining candidates.
async fn cleanup_images(service: &UpdateService, policy: &GlobalPolicy) {
    if let Some(n) = policy.cleanup_keep_last_n {
        warn!(
            "cleanup_keep_last_n = {} is configured but tag retention is not implemented yet; \
             every unreferenced image is a removal candidate",
            n
        );
    }
    let candidates = match service.runtime.unreferenced_images().await {
        Ok(candidates) => candidates,
        Err(e) => {
            error!("Image cleanup failed: {}", e);
            return;
        }
    };
    for image in candidates {
        match service.runtime.remove_image(&image).await {
            Ok(()) => info!("Removed unused image: {}", image.label()),
            Err(e) => warn!("Could not remove image {}: {}", image.label(), e),
        }
    }
}
