use crate::error::{Error, Result};
use crate::package_id::PackageIdentity;
use crate::staging::prune_if_empty;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Directory under the package root holding per-package lock files.
pub const LOCKS_DIR_NAME: &str = ".locks";

/// Exclusive advisory lock over one package, held for the duration of any
/// mutating operation. Released on drop.
///
/// The lock file lives outside the install tree so promotion and removal of
/// the install directory never touch it.
#[derive(Debug)]
pub struct PackageLock {
    file: File,
    path: PathBuf,
}

impl PackageLock {
    pub fn lock_path(package_root: &Path, id: &PackageIdentity) -> PathBuf {
        package_root
            .join(LOCKS_DIR_NAME)
            .join(&id.owner)
            .join(format!("{}.lock", id.repo))
    }

    /// Take the lock or fail immediately with [`Error::Busy`].
    pub fn acquire(package_root: &Path, id: &PackageIdentity) -> Result<Self> {
        let path = Self::lock_path(package_root, id);

        // An uninstall may delete the file between our open and our lock; a lock
        // on the unlinked file would not exclude anyone, so reopen.
        for _ in 0..3 {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;

            if let Err(e) = file.try_lock_exclusive() {
                tracing::debug!("Lock {} is held elsewhere: {}", path.display(), e);
                return Err(Error::Busy {
                    package: id.full_name(),
                });
            }

            if is_same_file(&file, &path) {
                tracing::trace!("Acquired {}", path.display());
                return Ok(Self { file, path });
            }
            tracing::debug!("{} was removed while locking, retrying", path.display());
        }

        Err(Error::Busy {
            package: id.full_name(),
        })
    }

    /// Release the lock and delete its file, for packages that no longer exist.
    pub fn remove(self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::debug!("Failed to remove {}: {}", self.path.display(), e);
        }
        if let Some(owner_dir) = self.path.parent() {
            prune_if_empty(owner_dir);
        }
    }
}

#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

impl Drop for PackageLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_fails_fast() {
        let root = tempdir().unwrap();
        let id = PackageIdentity::new("acme", "app");

        let held = PackageLock::acquire(root.path(), &id).unwrap();
        assert!(matches!(
            PackageLock::acquire(root.path(), &id),
            Err(Error::Busy { .. })
        ));

        drop(held);
        assert!(PackageLock::acquire(root.path(), &id).is_ok());
    }

    #[test]
    fn test_distinct_packages_do_not_contend() {
        let root = tempdir().unwrap();
        let _a = PackageLock::acquire(root.path(), &PackageIdentity::new("acme", "app")).unwrap();
        let _b = PackageLock::acquire(root.path(), &PackageIdentity::new("acme", "tool")).unwrap();
    }

    #[test]
    fn test_remove_deletes_lock_file() {
        let root = tempdir().unwrap();
        let id = PackageIdentity::new("acme", "app");
        let other = PackageLock::acquire(root.path(), &PackageIdentity::new("acme", "tool")).unwrap();

        PackageLock::acquire(root.path(), &id).unwrap().remove();
        assert!(!PackageLock::lock_path(root.path(), &id).exists());
        assert!(root.path().join(LOCKS_DIR_NAME).join("acme").exists());

        other.remove();
        assert!(!root.path().join(LOCKS_DIR_NAME).join("acme").exists());
        assert!(PackageLock::acquire(root.path(), &id).is_ok());
    }

    #[test]
    fn test_lock_lives_outside_install_tree() {
        let root = tempdir().unwrap();
        let id = PackageIdentity::new("acme", "app");
        let lock = PackageLock::lock_path(root.path(), &id);
        assert!(!lock.starts_with(id.install_dir(root.path())));
    }
}
