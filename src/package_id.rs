use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Owner/repo pair identifying an installed package. Case is kept as supplied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageIdentity {
    pub owner: String,
    pub repo: String,
}

impl PackageIdentity {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parse a package selector:
    /// - "owner/repo"
    /// - "owner/repo@v1.2.3" (explicit release tag)
    /// - "owner/repo@infisical-cli/v0.41.90" (tags may contain slashes)
    pub fn parse(selector: &str) -> Result<(Self, Option<String>), String> {
        if selector.is_empty() {
            return Err("Package identifier cannot be empty".to_string());
        }

        if selector.starts_with('-') {
            return Err(format!(
                "Invalid package identifier '{}'. It looks like a CLI flag.",
                selector
            ));
        }

        let (repo_part, version) = match selector.split_once('@') {
            Some((repo, version)) if !version.is_empty() => (repo, Some(version.to_string())),
            Some((repo, _)) => (repo, None),
            None => (selector, None),
        };

        let parts: Vec<&str> = repo_part.split('/').collect();
        match parts.as_slice() {
            [owner, repo] => {
                let id = PackageIdentity::new(*owner, *repo);
                id.validate()?;
                Ok((id, version))
            }
            _ => Err(format!(
                "Invalid repository format '{}', expected 'owner/repo'",
                repo_part
            )),
        }
    }

    fn validate(&self) -> Result<(), String> {
        for segment in [&self.owner, &self.repo] {
            if segment.is_empty() {
                return Err(format!("Invalid package identifier '{}'", self));
            }
            if segment == "." || segment == ".." || segment.contains(['\\', ':']) {
                return Err(format!(
                    "Invalid path segment '{}' in package identifier",
                    segment
                ));
            }
        }
        // Owners starting with '.' would collide with reserved directories.
        if self.owner.starts_with('.') {
            return Err(format!("Invalid owner '{}'", self.owner));
        }
        Ok(())
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// `<package-root>/<owner>`
    pub fn owner_dir(&self, package_root: &Path) -> PathBuf {
        package_root.join(&self.owner)
    }

    /// `<package-root>/<owner>/<repo>`
    pub fn install_dir(&self, package_root: &Path) -> PathBuf {
        self.owner_dir(package_root).join(&self.repo)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}
