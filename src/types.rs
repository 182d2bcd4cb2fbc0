use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Release channel an installed package follows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum InstallType {
    #[serde(rename = "release")]
    #[default]
    Release,
    #[serde(rename = "prerelease", alias = "pre-release")]
    PreRelease,
}

impl InstallType {
    pub fn for_release(release: &ReleaseRef) -> Self {
        if release.prerelease {
            InstallType::PreRelease
        } else {
            InstallType::Release
        }
    }
}

impl fmt::Display for InstallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallType::Release => write!(f, "release"),
            InstallType::PreRelease => write!(f, "prerelease"),
        }
    }
}

impl FromStr for InstallType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "release" | "stable" => Ok(InstallType::Release),
            "prerelease" | "pre-release" | "pre" => Ok(InstallType::PreRelease),
            other => Err(format!(
                "unknown channel '{}' (expected 'release' or 'prerelease')",
                other
            )),
        }
    }
}

/// How strictly a downloaded artifact is checked before it is installed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VerifyLevel {
    None,
    #[default]
    IfAvailable,
    Required,
}

impl fmt::Display for VerifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyLevel::None => write!(f, "none"),
            VerifyLevel::IfAvailable => write!(f, "if-available"),
            VerifyLevel::Required => write!(f, "required"),
        }
    }
}

impl FromStr for VerifyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "none" | "off" => Ok(VerifyLevel::None),
            "if-available" | "auto" => Ok(VerifyLevel::IfAvailable),
            "required" | "strict" => Ok(VerifyLevel::Required),
            other => Err(format!(
                "unknown verify level '{}' (expected none, if-available or required)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}

impl PlatformInfo {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

/// A single downloadable file attached to a release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetCandidate {
    pub name: String,
    /// Public download URL; ignores auth headers.
    pub browser_download_url: String,
    /// REST API URL; honours a bearer token, needed for private repositories.
    pub api_url: String,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseRef {
    pub tag_name: String,
    pub prerelease: bool,
    pub assets: Vec<AssetCandidate>,
}

impl ReleaseRef {
    pub fn find_asset(&self, name: &str) -> Option<&AssetCandidate> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// Caller-supplied knobs for a fresh install.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub channel: InstallType,
    /// Exact release tag to install instead of the channel's latest.
    pub version: Option<String>,
    /// Exact asset name to install instead of the resolver's pick.
    pub asset: Option<String>,
    pub verify: VerifyLevel,
    /// Keep a pre-release even when a newer stable release exists.
    pub strict: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Update even when the package is pinned.
    pub force: bool,
    pub strict: bool,
    pub verify: VerifyLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    pub path: PathBuf,
    pub version: String,
    pub install_type: InstallType,
    pub executables: Vec<String>,
    pub installed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated {
        previous_version: String,
        result: InstallResult,
    },
    AlreadyUpToDate {
        version: String,
    },
    PinnedSkip {
        version: String,
    },
}
