use crate::config::Settings;
use crate::error::{Error, Result};
use crate::install::links::unlink_executables;
use crate::lock::PackageLock;
use crate::manifest::{try_read_manifest, Manifest};
use crate::package_id::PackageIdentity;
use crate::process::{find_running, ProcessInspector, SystemProcesses};
use crate::staging::prune_if_empty;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Fail with [`Error::Conflict`] if any executable `manifest` declares is running.
pub(crate) fn ensure_not_running(
    inspector: &dyn ProcessInspector,
    install_dir: &Path,
    manifest: &Manifest,
) -> Result<()> {
    let executables = manifest.executable_paths(install_dir);
    match find_running(inspector, &executables)? {
        Some((path, pid)) => Err(Error::Conflict { path, pid }),
        None => Ok(()),
    }
}

pub struct Uninstaller {
    settings: Arc<Settings>,
    processes: Arc<dyn ProcessInspector>,
}

impl Uninstaller {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            processes: Arc::new(SystemProcesses),
        }
    }

    pub fn with_process_inspector(mut self, processes: Arc<dyn ProcessInspector>) -> Self {
        self.processes = processes;
        self
    }

    /// Remove an installed package.
    ///
    /// Nothing is deleted while any of its executables is running.
    pub fn uninstall(&self, id: &PackageIdentity) -> Result<()> {
        let lock = PackageLock::acquire(&self.settings.package_root, id)?;

        let install_dir = id.install_dir(&self.settings.package_root);
        let manifest = try_read_manifest(&install_dir)?.ok_or_else(|| Error::NotInstalled {
            package: id.full_name(),
        })?;

        ensure_not_running(self.processes.as_ref(), &install_dir, &manifest)?;

        if let Some(bin_root) = &self.settings.bin_root {
            if let Err(e) = unlink_executables(bin_root, &install_dir, &manifest) {
                tracing::warn!("Failed to remove links for {}: {}", id, e);
            }
        }

        tracing::info!("Removing directory: {}", install_dir.display());
        fs::remove_dir_all(&install_dir)?;

        prune_if_empty(&id.owner_dir(&self.settings.package_root));
        lock.remove();
        tracing::info!("{} {} removed", id, manifest.version);
        Ok(())
    }
}
