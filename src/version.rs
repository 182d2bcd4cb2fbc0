//! Version ordering and release selection per channel.

use crate::error::{Error, Result};
use crate::install::github::ReleaseProvider;
use crate::package_id::PackageIdentity;
use crate::types::{InstallType, ReleaseRef};
use semver::{BuildMetadata, Version};
use std::cmp::Ordering;
use std::sync::Arc;

/// Parse a release tag as a semantic version. A leading `v` is ignored and
/// build metadata is dropped; anything else that does not parse is an error.
pub fn parse_version(tag: &str) -> Result<Version> {
    let clean = tag.trim();
    let clean = clean
        .strip_prefix('v')
        .or_else(|| clean.strip_prefix('V'))
        .unwrap_or(clean);

    let mut version = Version::parse(clean).map_err(|e| Error::InvalidVersion {
        version: tag.to_string(),
        reason: e.to_string(),
    })?;
    version.build = BuildMetadata::EMPTY;
    Ok(version)
}

/// Semantic-version precedence of two tags.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    Ok(parse_version(a)?.cmp(&parse_version(b)?))
}

/// Whether `target` should replace `current`. Identical tags never do.
pub fn needs_update(current: &str, target: &str) -> Result<bool> {
    if current == target {
        return Ok(false);
    }
    Ok(compare_versions(target, current)? == Ordering::Greater)
}

/// The release chosen for an operation and the channel it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub release: ReleaseRef,
    pub install_type: InstallType,
}

impl Resolution {
    pub fn version(&self) -> &str {
        &self.release.tag_name
    }
}

pub struct VersionResolver {
    provider: Arc<dyn ReleaseProvider>,
}

impl VersionResolver {
    pub fn new(provider: Arc<dyn ReleaseProvider>) -> Self {
        Self { provider }
    }

    /// Pick the release to target.
    ///
    /// - explicit tag: that release; the channel follows the release's own flag
    /// - `PreRelease`: newest pre-release, unless (non-strict) the latest stable
    ///   release is newer, in which case the package moves to `Release`
    /// - `Release`: the latest stable release
    pub async fn resolve(
        &self,
        id: &PackageIdentity,
        channel: InstallType,
        explicit: Option<&str>,
        strict: bool,
    ) -> Result<Resolution> {
        if let Some(tag) = explicit {
            let release = self.release_by_tag(id, tag).await?;
            let install_type = InstallType::for_release(&release);
            if install_type != channel {
                tracing::info!(
                    "{} {} is published on the {} channel, not {}",
                    id,
                    release.tag_name,
                    install_type,
                    channel
                );
            }
            return Ok(Resolution {
                release,
                install_type,
            });
        }

        match channel {
            InstallType::Release => {
                let release = self.provider.latest_release(id).await?.ok_or_else(|| {
                    Error::resolution(id.full_name(), "no stable release published")
                })?;
                Ok(Resolution {
                    release,
                    install_type: InstallType::Release,
                })
            }
            InstallType::PreRelease => self.resolve_prerelease(id, strict).await,
        }
    }

    async fn resolve_prerelease(&self, id: &PackageIdentity, strict: bool) -> Result<Resolution> {
        let prerelease = self.provider.latest_prerelease(id).await?;

        if strict {
            let release = prerelease.ok_or_else(|| {
                Error::resolution(id.full_name(), "no pre-release published")
            })?;
            return Ok(Resolution {
                release,
                install_type: InstallType::PreRelease,
            });
        }

        let stable = self.provider.latest_release(id).await?;
        match (prerelease, stable) {
            (Some(pre), Some(stable)) => {
                if compare_versions(&stable.tag_name, &pre.tag_name)? == Ordering::Greater {
                    tracing::info!(
                        "Stable {} is newer than pre-release {} for {}, switching to release channel",
                        stable.tag_name,
                        pre.tag_name,
                        id
                    );
                    Ok(Resolution {
                        release: stable,
                        install_type: InstallType::Release,
                    })
                } else {
                    Ok(Resolution {
                        release: pre,
                        install_type: InstallType::PreRelease,
                    })
                }
            }
            (Some(pre), None) => Ok(Resolution {
                release: pre,
                install_type: InstallType::PreRelease,
            }),
            (None, Some(stable)) => {
                tracing::info!("No pre-release for {}, using stable {}", id, stable.tag_name);
                Ok(Resolution {
                    release: stable,
                    install_type: InstallType::Release,
                })
            }
            (None, None) => Err(Error::resolution(id.full_name(), "no releases published")),
        }
    }

    /// Look up a tag, retrying with the `v` prefix toggled for numeric tags.
    async fn release_by_tag(&self, id: &PackageIdentity, tag: &str) -> Result<ReleaseRef> {
        if let Some(release) = self.provider.release_by_tag(id, tag).await? {
            return Ok(release);
        }

        let alternative = if let Some(rest) = tag.strip_prefix('v') {
            Some(rest.to_string()).filter(|r| r.starts_with(|c: char| c.is_ascii_digit()))
        } else if tag.starts_with(|c: char| c.is_ascii_digit()) && !tag.contains('/') {
            Some(format!("v{}", tag))
        } else {
            None
        };

        if let Some(alternative) = alternative {
            tracing::debug!("Tag {} not found, trying {}", tag, alternative);
            if let Some(release) = self.provider.release_by_tag(id, &alternative).await? {
                return Ok(release);
            }
        }

        Err(Error::NotFound {
            repo: id.full_name(),
            tag: tag.to_string(),
        })
    }
}
