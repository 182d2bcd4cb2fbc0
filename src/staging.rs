//! Scratch directories for in-flight installs.
//!
//! A [`StagingArea`] is removed when dropped unless [`StagingArea::promote`]
//! moved its contents to the final install path, so every early return or
//! error leaves nothing behind.

use crate::error::Result;
use crate::package_id::PackageIdentity;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Reserved prefix for staging siblings; never listed as a package.
pub const STAGING_PREFIX: &str = ".ghpkg-staging-";

pub fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}

#[derive(Debug)]
pub struct StagingArea {
    dir: Option<TempDir>,
    path: PathBuf,
    owner_dir: PathBuf,
    target: PathBuf,
    label: String,
}

impl StagingArea {
    /// Create a uniquely named staging directory next to the package's install dir.
    pub fn create(package_root: &Path, id: &PackageIdentity) -> Result<Self> {
        let owner_dir = id.owner_dir(package_root);
        let label = format!("{}{}-", STAGING_PREFIX, id.repo);

        fs::create_dir_all(&owner_dir)?;
        let dir = match tempdir_in(&owner_dir, &label) {
            // A concurrent failed install of a sibling repo may have pruned the owner dir.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&owner_dir)?;
                tempdir_in(&owner_dir, &label)?
            }
            other => other?,
        };
        tracing::debug!("Created staging directory {}", dir.path().display());

        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
            owner_dir,
            target: id.install_dir(package_root),
            label,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Replace whatever is at the install path with the staged tree.
    ///
    /// The previous tree is moved aside first and restored if the staged tree
    /// cannot be moved into place.
    pub fn promote(self) -> Result<PathBuf> {
        let previous = if self.target.exists() {
            let holder = tempdir_in(&self.owner_dir, &format!("{}old-", self.label))?;
            let aside = holder.path().join(PREVIOUS_DIR_NAME);
            fs::rename(&self.target, &aside)?;
            Some((holder, aside))
        } else {
            None
        };

        if let Err(e) = move_dir(&self.path, &self.target) {
            if let Some((holder, aside)) = previous {
                tracing::warn!(
                    "Promotion of {} failed, restoring previous install",
                    self.target.display()
                );
                restore_previous(holder, &aside, &self.target);
            }
            return Err(e.into());
        }

        // Dropping the holder removes the previous tree.
        drop(previous);

        tracing::debug!("Promoted staging into {}", self.target.display());
        Ok(self.target.clone())
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        // Remove the staging tree first so a failed first install leaves no owner dir.
        drop(self.dir.take());
        prune_if_empty(&self.owner_dir);
    }
}

/// Name of the moved-aside install inside its holder directory.
const PREVIOUS_DIR_NAME: &str = "previous";

fn tempdir_in(dir: &Path, prefix: &str) -> io::Result<TempDir> {
    tempfile::Builder::new().prefix(prefix).tempdir_in(dir)
}

/// Put the moved-aside install back at `target`.
///
/// If that fails the holder is kept on disk instead of being deleted, and its
/// location is returned so the previous install can be recovered by hand.
fn restore_previous(holder: TempDir, aside: &Path, target: &Path) -> Option<PathBuf> {
    // Clear any partial copy before restoring.
    if target.exists() {
        if let Err(e) = fs::remove_dir_all(target) {
            tracing::warn!(
                "Failed to clear partial install at {}: {}",
                target.display(),
                e
            );
        }
    }

    match fs::rename(aside, target) {
        Ok(()) => None,
        Err(e) => {
            let kept = holder.into_path().join(PREVIOUS_DIR_NAME);
            tracing::error!(
                "Could not restore previous install to {}: {}; it was kept at {}",
                target.display(),
                e,
                kept.display()
            );
            Some(kept)
        }
    }
}

/// Remove `dir` if it exists and has no entries.
pub(crate) fn prune_if_empty(dir: &Path) {
    let is_empty = fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if is_empty {
        match fs::remove_dir(dir) {
            Ok(()) => tracing::debug!("Removed empty directory {}", dir.display()),
            Err(e) => tracing::debug!("Leaving {}: {}", dir.display(), e),
        }
    }
}

fn move_dir(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            tracing::warn!(
                "Staging and install directories are on different filesystems; \
                 falling back to a non-atomic copy into {}",
                to.display()
            );
            copy_dir(from, to)?;
            fs::remove_dir_all(from)
        }
        Err(e) => Err(e),
    }
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let dest = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            #[cfg(unix)]
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &dest)?;
            #[cfg(not(unix))]
            fs::copy(entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
