use crate::config::Settings;
use crate::download::{discover_executables, extract_archive, make_executable, ArchiveKind};
use crate::error::{Error, Result};
use crate::install::github::ReleaseProvider;
use crate::install::links::sync_links;
use crate::install::uninstaller::ensure_not_running;
use crate::lock::PackageLock;
use crate::manifest::{try_read_manifest, write_manifest, Manifest};
use crate::package_id::PackageIdentity;
use crate::platform::{get_system_info, is_unsupported_archive, select_best, RULES};
use crate::process::{ProcessInspector, SystemProcesses};
use crate::staging::StagingArea;
use crate::types::{AssetCandidate, InstallOptions, InstallResult, PlatformInfo, VerifyLevel};
use crate::verify::check_asset;
use crate::version::{Resolution, VersionResolver};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Scratch subdirectory of the staging area holding the raw download.
const DOWNLOAD_DIR_NAME: &str = ".download";

/// Fresh installs: resolve, download, verify, extract, record, promote.
#[derive(Clone)]
pub struct Installer {
    pub(crate) settings: Arc<Settings>,
    pub(crate) provider: Arc<dyn ReleaseProvider>,
    pub(crate) processes: Arc<dyn ProcessInspector>,
    pub(crate) platform: PlatformInfo,
}

impl Installer {
    pub fn new(settings: Arc<Settings>, provider: Arc<dyn ReleaseProvider>) -> Self {
        Self {
            settings,
            provider,
            processes: Arc::new(SystemProcesses),
            platform: get_system_info(),
        }
    }

    /// Target a platform other than the host.
    pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_process_inspector(mut self, processes: Arc<dyn ProcessInspector>) -> Self {
        self.processes = processes;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn resolver(&self) -> VersionResolver {
        VersionResolver::new(self.provider.clone())
    }

    /// Install `id`, replacing any existing install of it.
    ///
    /// Nothing at the install path changes unless every step up to promotion
    /// succeeds.
    pub async fn install(
        &self,
        id: &PackageIdentity,
        opts: &InstallOptions,
        cancel: &CancellationToken,
    ) -> Result<InstallResult> {
        let _lock = PackageLock::acquire(&self.settings.package_root, id)?;

        let resolution = self
            .resolver()
            .resolve(id, opts.channel, opts.version.as_deref(), opts.strict)
            .await?;

        let install_dir = id.install_dir(&self.settings.package_root);
        let previous = match try_read_manifest(&install_dir) {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!("Ignoring unreadable manifest for {}: {}", id, e);
                None
            }
        };

        self.install_resolved(
            id,
            &resolution,
            opts.asset.as_deref(),
            opts.verify,
            previous.as_ref(),
            cancel,
        )
        .await
    }

    /// Install an already-resolved release. The caller holds the package lock.
    pub(crate) async fn install_resolved(
        &self,
        id: &PackageIdentity,
        resolution: &Resolution,
        asset_name: Option<&str>,
        verify: VerifyLevel,
        previous: Option<&Manifest>,
        cancel: &CancellationToken,
    ) -> Result<InstallResult> {
        let root = &self.settings.package_root;
        let install_dir = id.install_dir(root);
        let version = resolution.version();

        // Replacing an install removes its binaries, so they must not be running.
        if let Some(previous) = previous {
            ensure_not_running(self.processes.as_ref(), &install_dir, previous)?;
        }

        let asset = self.pick_asset(id, resolution, asset_name)?;
        if is_unsupported_archive(&RULES, &asset.name) {
            return Err(Error::extraction(
                asset.name.as_str(),
                "unsupported archive format",
            ));
        }
        tracing::info!("Installing {} {} from {}", id, version, asset.name);

        let staging = StagingArea::create(root, id)?;
        let executables = self.stage(id, &asset, verify, staging.path(), cancel).await?;

        if executables.is_empty() {
            tracing::warn!("No executables found in {} {}", id, version);
        }

        let mut manifest = Manifest::new(id, version, resolution.install_type, executables);
        manifest.pinned = previous.map(|p| p.pinned).unwrap_or(false);
        write_manifest(&manifest, staging.path())?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let final_path = staging.promote()?;

        if let Some(bin_root) = &self.settings.bin_root {
            if let Err(e) = sync_links(bin_root, &final_path, previous, &manifest) {
                tracing::warn!("Failed to link executables for {}: {}", id, e);
            }
        }

        tracing::info!(
            "Successfully installed {} {} to {}",
            id,
            version,
            final_path.display()
        );

        Ok(InstallResult {
            path: final_path,
            version: version.to_string(),
            install_type: resolution.install_type,
            executables: manifest.executables,
            installed_at: manifest.last_updated,
        })
    }

    fn pick_asset(
        &self,
        id: &PackageIdentity,
        resolution: &Resolution,
        asset_name: Option<&str>,
    ) -> Result<AssetCandidate> {
        let release = &resolution.release;

        if let Some(name) = asset_name {
            return release.find_asset(name).cloned().ok_or_else(|| {
                Error::resolution(
                    format!("{} {}", id, release.tag_name),
                    format!("asset '{}' not found in release assets", name),
                )
            });
        }

        select_best(&release.assets, &self.platform)?.ok_or_else(|| {
            Error::resolution(
                format!("{} {}", id, release.tag_name),
                format!(
                    "no asset for {}/{} among {} candidate(s)",
                    self.platform.os,
                    self.platform.arch,
                    release.assets.len()
                ),
            )
        })
    }

    /// Fill `staging_dir` with the installed tree; returns its executables.
    async fn stage(
        &self,
        id: &PackageIdentity,
        asset: &AssetCandidate,
        verify: VerifyLevel,
        staging_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let download_dir = staging_dir.join(DOWNLOAD_DIR_NAME);
        fs::create_dir_all(&download_dir)?;
        let download_path = download_dir.join(safe_file_name(&asset.name));

        self.provider
            .download_asset(asset, &download_path, cancel)
            .await?;

        check_asset(&download_path, asset, verify)?;

        let executables = match ArchiveKind::from_name(&asset.name) {
            Some(kind) => {
                extract_archive(&download_path, staging_dir, kind)?;
                fs::remove_dir_all(&download_dir)?;

                let found = discover_executables(staging_dir, &self.platform)?;
                for exe in &found {
                    make_executable(&staging_dir.join(exe), &self.platform)?;
                }
                found
            }
            None => {
                let binary_name = if self.platform.is_windows() && !id.repo.ends_with(".exe") {
                    format!("{}.exe", id.repo)
                } else {
                    id.repo.clone()
                };
                let target = staging_dir.join(&binary_name);
                fs::rename(&download_path, &target)?;
                fs::remove_dir_all(&download_dir)?;
                make_executable(&target, &self.platform)?;
                tracing::debug!("Installed direct executable as {}", binary_name);
                vec![binary_name]
            }
        };

        Ok(executables)
    }
}

/// Asset names come from the network; keep only the final path segment.
fn safe_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("asset");
    base.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("app-linux-amd64.tar.gz"), "app-linux-amd64.tar.gz");
        assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
        assert_eq!(safe_file_name("..\\evil.exe"), "evil.exe");
        assert_eq!(safe_file_name(".."), "asset");
    }
}
