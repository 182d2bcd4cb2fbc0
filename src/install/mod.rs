//! Installation and package management
//!
//! This module provides functionality for:
//! - Fetching release metadata and assets from GitHub
//! - Installing a package into its own directory via a staging area
//! - Updating installed packages along their recorded channel
//! - Removing packages, refusing while their executables run
//! - Listing, pinning and switching channels of installed packages

pub mod github;
pub mod installer;
pub mod links;
pub mod manage;
pub mod uninstaller;
pub mod updater;

pub use github::{GitHubProvider, ReleaseProvider};
pub use installer::Installer;
pub use manage::PackageRegistry;
pub use uninstaller::Uninstaller;
pub use updater::Updater;
