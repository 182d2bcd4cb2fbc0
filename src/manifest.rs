//! The per-package manifest: the sole record of what is installed.
//!
//! One JSON file lives at [`MANIFEST_FILE_NAME`] inside each install directory.
//! Older schema versions are migrated in memory on every read; the migrated
//! form only reaches disk when a caller writes the manifest back.

use crate::error::{Error, Result};
use crate::package_id::PackageIdentity;
use crate::types::InstallType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = ".ghpkg-manifest.json";

/// Schema history:
/// 1. initial layout, no `pinned`
/// 2. adds `pinned`
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,
    pub owner: String,
    pub repo: String,
    /// Release tag as published.
    pub version: String,
    #[serde(default)]
    pub install_type: InstallType,
    /// Install-root-relative, `/`-separated.
    #[serde(default)]
    pub executables: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
    pub last_updated: DateTime<Utc>,
    /// Fields written by newer versions; carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn legacy_schema_version() -> u32 {
    1
}

impl Manifest {
    pub fn new(
        id: &PackageIdentity,
        version: impl Into<String>,
        install_type: InstallType,
        executables: Vec<String>,
    ) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            owner: id.owner.clone(),
            repo: id.repo.clone(),
            version: version.into(),
            install_type,
            executables,
            pinned: false,
            last_updated: Utc::now(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(&self.owner, &self.repo)
    }

    /// Absolute paths of the declared executables under `install_dir`.
    pub fn executable_paths(&self, install_dir: &Path) -> Vec<PathBuf> {
        self.executables
            .iter()
            .map(|rel| {
                rel.split('/')
                    .filter(|s| !s.is_empty())
                    .fold(install_dir.to_path_buf(), |acc, part| acc.join(part))
            })
            .collect()
    }
}

pub fn manifest_path(install_dir: &Path) -> PathBuf {
    install_dir.join(MANIFEST_FILE_NAME)
}

/// Bring an older manifest up to [`CURRENT_SCHEMA_VERSION`].
fn migrate(mut manifest: Manifest) -> Manifest {
    if manifest.schema_version < 2 {
        tracing::debug!(
            "Migrating manifest for {}/{} from schema {}",
            manifest.owner,
            manifest.repo,
            manifest.schema_version
        );
        manifest.pinned = false;
        manifest.schema_version = 2;
    }
    manifest
}

/// Read and migrate the manifest in `install_dir`. Missing or corrupt files are errors.
pub fn read_manifest(install_dir: &Path) -> Result<Manifest> {
    let path = manifest_path(install_dir);
    let content = fs::read_to_string(&path).map_err(|e| Error::manifest(&path, e))?;
    let manifest: Manifest =
        serde_json::from_str(&content).map_err(|e| Error::manifest(&path, e))?;

    if manifest.schema_version > CURRENT_SCHEMA_VERSION {
        tracing::warn!(
            "Manifest {} has newer schema {} (this build understands {})",
            path.display(),
            manifest.schema_version,
            CURRENT_SCHEMA_VERSION
        );
    }

    Ok(migrate(manifest))
}

/// Like [`read_manifest`] but a missing file yields `None`.
pub fn try_read_manifest(install_dir: &Path) -> Result<Option<Manifest>> {
    match fs::metadata(manifest_path(install_dir)) {
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
        Ok(_) => {}
    }
    match read_manifest(install_dir) {
        Ok(manifest) => Ok(Some(manifest)),
        // Removed between the stat and the read.
        Err(_) if !manifest_path(install_dir).exists() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Serialize `manifest` into `install_dir`, replacing any previous file.
pub fn write_manifest(manifest: &Manifest, install_dir: &Path) -> Result<()> {
    let path = manifest_path(install_dir);
    let content =
        serde_json::to_string_pretty(manifest).map_err(|e| Error::manifest(&path, e))?;

    // Write-then-rename so readers never observe a half-written manifest.
    let tmp = install_dir.join(format!("{}.tmp", MANIFEST_FILE_NAME));
    fs::write(&tmp, content)?;
    fs::rename(&tmp, &path)?;
    tracing::debug!("Wrote manifest {}", path.display());
    Ok(())
}
