//! Rootless package manager for executables published as GitHub release assets.
//!
//! Every package is installed into `<package_root>/<owner>/<repo>/` next to a
//! small JSON manifest. Installs and updates build the new tree in a sibling
//! staging directory and only replace the live one once it is complete.

pub mod config;
pub mod download;
pub mod error;
pub mod install;
pub mod lock;
pub mod manifest;
pub mod package_id;
pub mod platform;
pub mod process;
pub mod staging;
pub mod types;
pub mod verify;
pub mod version;

pub use error::{Error, Result};
pub use install::{GitHubProvider, Installer, PackageRegistry, ReleaseProvider, Uninstaller, Updater};
pub use manifest::Manifest;
pub use package_id::PackageIdentity;
pub use types::{
    AssetCandidate, InstallOptions, InstallResult, InstallType, PlatformInfo, ReleaseRef,
    UpdateOptions, UpdateOutcome, VerifyLevel,
};
