//! Read-side queries and in-place manifest edits (pin, channel).

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::lock::{PackageLock, LOCKS_DIR_NAME};
use crate::manifest::{read_manifest, try_read_manifest, write_manifest, Manifest};
use crate::package_id::PackageIdentity;
use crate::staging::is_staging_name;
use crate::types::InstallType;
use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;

pub struct PackageRegistry {
    settings: Arc<Settings>,
}

impl PackageRegistry {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Every installed package, sorted by owner then repo.
    ///
    /// Safe to run alongside mutating operations: staging directories are
    /// skipped and a manifest vanishing mid-scan counts as "not installed".
    pub fn list(&self) -> Result<Vec<Manifest>> {
        let root = &self.settings.package_root;
        let owners = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut manifests = Vec::new();
        for owner in owners.flatten() {
            let owner_name = owner.file_name().to_string_lossy().to_string();
            if owner_name == LOCKS_DIR_NAME || owner_name.starts_with('.') {
                continue;
            }
            let Ok(repos) = fs::read_dir(owner.path()) else {
                continue;
            };

            for repo in repos.flatten() {
                let repo_name = repo.file_name().to_string_lossy().to_string();
                if is_staging_name(&repo_name) || !repo.path().is_dir() {
                    continue;
                }
                match try_read_manifest(&repo.path()) {
                    Ok(Some(manifest)) => manifests.push(manifest),
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Skipping {}/{}: {}", owner_name, repo_name, e),
                }
            }
        }

        manifests.sort_by(|a, b| (&a.owner, &a.repo).cmp(&(&b.owner, &b.repo)));
        Ok(manifests)
    }

    pub fn info(&self, id: &PackageIdentity) -> Result<Manifest> {
        try_read_manifest(&id.install_dir(&self.settings.package_root))?.ok_or_else(|| {
            Error::NotInstalled {
                package: id.full_name(),
            }
        })
    }

    pub fn pin(&self, id: &PackageIdentity) -> Result<Manifest> {
        self.edit(id, |m| m.pinned = true)
    }

    pub fn unpin(&self, id: &PackageIdentity) -> Result<Manifest> {
        self.edit(id, |m| m.pinned = false)
    }

    /// Record the channel future updates follow. Nothing is downloaded.
    pub fn switch_channel(&self, id: &PackageIdentity, channel: InstallType) -> Result<Manifest> {
        self.edit(id, |m| m.install_type = channel)
    }

    /// Apply `change` under the package lock and persist the (migrated) result.
    fn edit(&self, id: &PackageIdentity, change: impl FnOnce(&mut Manifest)) -> Result<Manifest> {
        let _lock = PackageLock::acquire(&self.settings.package_root, id)?;
        let install_dir = id.install_dir(&self.settings.package_root);

        if !install_dir.join(crate::manifest::MANIFEST_FILE_NAME).exists() {
            return Err(Error::NotInstalled {
                package: id.full_name(),
            });
        }

        let mut manifest = read_manifest(&install_dir)?;
        // Flag edits leave `last_updated` alone; it tracks installs only.
        change(&mut manifest);
        write_manifest(&manifest, &install_dir)?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::CURRENT_SCHEMA_VERSION;
    use crate::staging::STAGING_PREFIX;
    use tempfile::tempdir;

    fn install(root: &std::path::Path, owner: &str, repo: &str) -> Manifest {
        let id = PackageIdentity::new(owner, repo);
        let dir = id.install_dir(root);
        fs::create_dir_all(&dir).unwrap();
        let manifest = Manifest::new(&id, "v1.0.0", InstallType::Release, vec![]);
        write_manifest(&manifest, &dir).unwrap();
        manifest
    }

    fn registry(root: &std::path::Path) -> PackageRegistry {
        PackageRegistry::new(Arc::new(Settings::with_package_root(root)))
    }

    #[test]
    fn test_list_sorted_and_skips_noise() {
        let root = tempdir().unwrap();
        install(root.path(), "zeta", "tool");
        install(root.path(), "acme", "b");
        install(root.path(), "acme", "a");
        fs::create_dir_all(root.path().join("acme").join(format!("{}b-x1", STAGING_PREFIX))).unwrap();
        fs::create_dir_all(root.path().join("acme").join("no-manifest")).unwrap();
        fs::create_dir_all(root.path().join(LOCKS_DIR_NAME).join("acme")).unwrap();

        let names: Vec<String> = registry(root.path())
            .list()
            .unwrap()
            .iter()
            .map(|m| format!("{}/{}", m.owner, m.repo))
            .collect();
        assert_eq!(names, vec!["acme/a", "acme/b", "zeta/tool"]);
    }

    #[test]
    fn test_list_missing_root_is_empty() {
        let root = tempdir().unwrap();
        let registry = registry(&root.path().join("absent"));
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_pin_unpin_persist() {
        let root = tempdir().unwrap();
        install(root.path(), "acme", "app");
        let registry = registry(root.path());
        let id = PackageIdentity::new("acme", "app");

        assert!(registry.pin(&id).unwrap().pinned);
        assert!(registry.info(&id).unwrap().pinned);
        assert!(!registry.unpin(&id).unwrap().pinned);
        assert!(!registry.info(&id).unwrap().pinned);
    }

    #[test]
    fn test_flag_edits_keep_last_updated() {
        let root = tempdir().unwrap();
        let installed = install(root.path(), "acme", "app");
        let registry = registry(root.path());
        let id = PackageIdentity::new("acme", "app");

        registry.pin(&id).unwrap();
        registry.switch_channel(&id, InstallType::PreRelease).unwrap();
        registry.unpin(&id).unwrap();

        let manifest = registry.info(&id).unwrap();
        assert_eq!(manifest.last_updated, installed.last_updated);
        assert_eq!(manifest.install_type, InstallType::PreRelease);
    }

    #[test]
    fn test_switch_channel_persists_and_migrates() {
        let root = tempdir().unwrap();
        let id = PackageIdentity::new("acme", "app");
        let dir = id.install_dir(root.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(crate::manifest::MANIFEST_FILE_NAME),
            r#"{"schema_version":1,"owner":"acme","repo":"app","version":"v1.0.0",
                "install_type":"release","executables":[],"last_updated":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let registry = registry(root.path());
        let edited = registry.switch_channel(&id, InstallType::PreRelease).unwrap();
        assert_eq!(edited.last_updated.to_rfc3339(), "2024-01-01T00:00:00+00:00");

        let text = fs::read_to_string(dir.join(crate::manifest::MANIFEST_FILE_NAME)).unwrap();
        assert!(text.contains("\"prerelease\""));
        assert!(text.contains(&format!("\"schema_version\": {}", CURRENT_SCHEMA_VERSION)));
        assert!(text.contains("\"pinned\": false"));
    }

    #[test]
    fn test_edits_on_missing_package() {
        let root = tempdir().unwrap();
        let registry = registry(root.path());
        let id = PackageIdentity::new("acme", "ghost");
        assert!(matches!(registry.pin(&id), Err(Error::NotInstalled { .. })));
        assert!(matches!(registry.info(&id), Err(Error::NotInstalled { .. })));
    }

    #[test]
    fn test_edit_respects_lock() {
        let root = tempdir().unwrap();
        install(root.path(), "acme", "app");
        let id = PackageIdentity::new("acme", "app");
        let _held = PackageLock::acquire(root.path(), &id).unwrap();
        assert!(matches!(registry(root.path()).pin(&id), Err(Error::Busy { .. })));
    }
}
