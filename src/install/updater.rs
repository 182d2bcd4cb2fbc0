use crate::error::{Error, Result};
use crate::install::installer::Installer;
use crate::install::manage::PackageRegistry;
use crate::lock::PackageLock;
use crate::manifest::try_read_manifest;
use crate::package_id::PackageIdentity;
use crate::types::{UpdateOptions, UpdateOutcome};
use crate::version::needs_update;
use tokio_util::sync::CancellationToken;

/// Moves installed packages to the newest release on their channel.
pub struct Updater {
    installer: Installer,
}

impl Updater {
    pub fn new(installer: Installer) -> Self {
        Self { installer }
    }

    pub async fn update(
        &self,
        id: &PackageIdentity,
        opts: &UpdateOptions,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome> {
        let settings = self.installer.settings();
        let _lock = PackageLock::acquire(&settings.package_root, id)?;

        let install_dir = id.install_dir(&settings.package_root);
        let current = try_read_manifest(&install_dir)?.ok_or_else(|| Error::NotInstalled {
            package: id.full_name(),
        })?;

        // A pin blocks every update that is not forced, single or sweep.
        if current.pinned && !opts.force {
            tracing::info!("{} is pinned at {}, skipping", id, current.version);
            return Ok(UpdateOutcome::PinnedSkip {
                version: current.version,
            });
        }

        let resolution = self
            .installer
            .resolver()
            .resolve(id, current.install_type, None, opts.strict)
            .await?;

        if !needs_update(&current.version, resolution.version())? {
            tracing::info!("{} is already up to date ({})", id, current.version);
            return Ok(UpdateOutcome::AlreadyUpToDate {
                version: current.version,
            });
        }

        tracing::info!(
            "Updating {} {} -> {}",
            id,
            current.version,
            resolution.version()
        );

        let result = self
            .installer
            .install_resolved(id, &resolution, None, opts.verify, Some(&current), cancel)
            .await?;

        Ok(UpdateOutcome::Updated {
            previous_version: current.version,
            result,
        })
    }

    /// Update every installed package; one failure does not stop the rest.
    pub async fn update_all(
        &self,
        opts: &UpdateOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<(PackageIdentity, Result<UpdateOutcome>)>> {
        let registry = PackageRegistry::new(self.installer.settings.clone());
        let mut outcomes = Vec::new();

        for manifest in registry.list()? {
            if cancel.is_cancelled() {
                break;
            }
            let id = manifest.identity();
            let outcome = self.update(&id, opts, cancel).await;
            if let Err(e) = &outcome {
                tracing::warn!("Failed to update {}: {}", id, e);
            }
            outcomes.push((id, outcome));
        }

        Ok(outcomes)
    }
}
