//! Exposes installed executables on the user's PATH via the bin root.

use crate::error::Result;
use crate::manifest::Manifest;
use std::fs;
use std::path::{Path, PathBuf};

fn link_name(exe: &Path) -> Option<PathBuf> {
    exe.file_name().map(PathBuf::from)
}

/// Whether `entry` in the bin root was created for a package living in `install_dir`.
#[cfg(unix)]
fn owned_by(entry: &Path, _target: &Path, install_dir: &Path) -> bool {
    match fs::read_link(entry) {
        Ok(points_to) => points_to.starts_with(install_dir),
        Err(_) => false,
    }
}

/// Copies stand in for links here, so ownership means identical content.
#[cfg(not(unix))]
fn owned_by(entry: &Path, target: &Path, _install_dir: &Path) -> bool {
    match (
        crate::verify::hash_file(entry),
        crate::verify::hash_file(target),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn create_link(target: &Path, entry: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, entry)
}

#[cfg(not(unix))]
fn create_link(target: &Path, entry: &Path) -> std::io::Result<()> {
    fs::copy(target, entry).map(|_| ())
}

/// Link every executable of `manifest` into `bin_root`, replacing links
/// that already belong to this package. Returns the created entries.
pub fn link_executables(
    bin_root: &Path,
    install_dir: &Path,
    manifest: &Manifest,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(bin_root)?;
    let mut created = Vec::new();

    for exe in manifest.executable_paths(install_dir) {
        let Some(name) = link_name(&exe) else { continue };
        let entry = bin_root.join(name);

        if entry.symlink_metadata().is_ok() {
            if owned_by(&entry, &exe, install_dir) {
                fs::remove_file(&entry)?;
            } else {
                tracing::warn!(
                    "{} already exists and does not belong to {}/{}, not linking",
                    entry.display(),
                    manifest.owner,
                    manifest.repo
                );
                continue;
            }
        }

        create_link(&exe, &entry)?;
        tracing::info!("Linked {} -> {}", entry.display(), exe.display());
        created.push(entry);
    }

    Ok(created)
}

/// Remove bin-root entries pointing at `manifest`'s executables.
pub fn unlink_executables(bin_root: &Path, install_dir: &Path, manifest: &Manifest) -> Result<()> {
    for exe in manifest.executable_paths(install_dir) {
        let Some(name) = link_name(&exe) else { continue };
        let entry = bin_root.join(name);
        if entry.symlink_metadata().is_ok() && owned_by(&entry, &exe, install_dir) {
            fs::remove_file(&entry)?;
            tracing::debug!("Removed link {}", entry.display());
        }
    }
    Ok(())
}

/// Bring the bin root in line with `current`, dropping links for executables
/// the previous install had but the new one lacks.
pub fn sync_links(
    bin_root: &Path,
    install_dir: &Path,
    previous: Option<&Manifest>,
    current: &Manifest,
) -> Result<Vec<PathBuf>> {
    if let Some(previous) = previous {
        let stale = Manifest {
            executables: previous
                .executables
                .iter()
                .filter(|e| !current.executables.contains(e))
                .cloned()
                .collect(),
            ..previous.clone()
        };
        // The stale targets are gone already, so match on the link itself.
        for exe in stale.executable_paths(install_dir) {
            let Some(name) = link_name(&exe) else { continue };
            let entry = bin_root.join(name);
            if let Ok(points_to) = fs::read_link(&entry) {
                if points_to == exe {
                    fs::remove_file(&entry)?;
                }
            }
        }
    }
    link_executables(bin_root, install_dir, current)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::package_id::PackageIdentity;
    use crate::types::InstallType;
    use tempfile::tempdir;

    fn manifest(executables: &[&str]) -> Manifest {
        Manifest::new(
            &PackageIdentity::new("acme", "app"),
            "v1.0.0",
            InstallType::Release,
            executables.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_link_and_unlink() {
        let dir = tempdir().unwrap();
        let install = dir.path().join("pkgs/acme/app");
        let bin = dir.path().join("bin");
        fs::create_dir_all(install.join("bin")).unwrap();
        fs::write(install.join("bin/app"), b"x").unwrap();

        let m = manifest(&["bin/app"]);
        let created = link_executables(&bin, &install, &m).unwrap();
        assert_eq!(created, vec![bin.join("app")]);
        assert_eq!(fs::read_link(bin.join("app")).unwrap(), install.join("bin/app"));

        // Relinking the same package is fine.
        link_executables(&bin, &install, &m).unwrap();

        unlink_executables(&bin, &install, &m).unwrap();
        assert!(bin.join("app").symlink_metadata().is_err());
    }

    #[test]
    fn test_foreign_file_is_left_alone() {
        let dir = tempdir().unwrap();
        let install = dir.path().join("pkgs/acme/app");
        let bin = dir.path().join("bin");
        fs::create_dir_all(install.join("bin")).unwrap();
        fs::create_dir_all(&bin).unwrap();
        fs::write(install.join("bin/app"), b"x").unwrap();
        fs::write(bin.join("app"), b"someone else's").unwrap();

        let m = manifest(&["bin/app"]);
        assert!(link_executables(&bin, &install, &m).unwrap().is_empty());
        unlink_executables(&bin, &install, &m).unwrap();
        assert_eq!(fs::read(bin.join("app")).unwrap(), b"someone else's");
    }

    #[test]
    fn test_sync_drops_stale_links() {
        let dir = tempdir().unwrap();
        let install = dir.path().join("pkgs/acme/app");
        let bin = dir.path().join("bin");
        fs::create_dir_all(install.join("bin")).unwrap();
        fs::write(install.join("bin/app"), b"x").unwrap();
        fs::write(install.join("bin/old"), b"x").unwrap();

        let before = manifest(&["bin/app", "bin/old"]);
        link_executables(&bin, &install, &before).unwrap();
        fs::remove_file(install.join("bin/old")).unwrap();

        let after = manifest(&["bin/app"]);
        sync_links(&bin, &install, Some(&before), &after).unwrap();
        assert!(bin.join("old").symlink_metadata().is_err());
        assert!(bin.join("app").symlink_metadata().is_ok());
    }
}
