use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Release / asset selection
    #[error("No match for {subject}: {reason}")]
    Resolution { subject: String, reason: String },

    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Release '{tag}' not found in {repo}")]
    NotFound { repo: String, tag: String },

    // Network / provider failures, safe to retry
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Digest mismatch for {asset}: expected {expected}, got {actual}")]
    Verification {
        asset: String,
        expected: String,
        actual: String,
    },

    #[error("Cannot verify {asset}: {reason}")]
    Unverifiable { asset: String, reason: String },

    #[error("Failed to extract {archive}: {reason}")]
    Extraction { archive: String, reason: String },

    #[error("Manifest error at {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error("{} is in use by running process {pid}", path.display())]
    Conflict { path: PathBuf, pid: u32 },

    #[error("Another operation is in progress for {package}")]
    Busy { package: String },

    #[error("Package {package} is not installed")]
    NotInstalled { package: String },

    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may reasonably retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub(crate) fn resolution(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Resolution {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn extraction(archive: impl Into<String>, reason: impl ToString) -> Self {
        Error::Extraction {
            archive: archive.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn manifest(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Manifest {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
