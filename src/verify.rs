//! Content digests for downloaded artifacts.
//!
//! Digests are `algorithm:hex` strings, matching the `digest` field GitHub
//! attaches to release assets (e.g. `sha256:9f86d0...`).

use crate::error::{Error, Result};
use crate::types::{AssetCandidate, VerifyLevel};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub const SHA256_PREFIX: &str = "sha256:";

/// Stream a file through SHA-256 and return its prefixed digest.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{}{:x}", SHA256_PREFIX, hasher.finalize()))
}

/// Hash `path` and compare against `expected` by exact string equality.
///
/// Returns whether it matched together with the computed digest.
pub fn verify_file(path: &Path, expected: &str) -> Result<(bool, String)> {
    let actual = hash_file(path)?;
    Ok((actual == expected, actual))
}

/// Apply `level` to a downloaded asset. Errors abort the install.
pub fn check_asset(path: &Path, asset: &AssetCandidate, level: VerifyLevel) -> Result<()> {
    let expected = match (level, asset.digest.as_deref()) {
        (VerifyLevel::None, _) => return Ok(()),
        (VerifyLevel::IfAvailable, None) => {
            tracing::warn!(
                "No digest published for {}, skipping verification",
                asset.name
            );
            return Ok(());
        }
        (VerifyLevel::Required, None) => {
            return Err(Error::Unverifiable {
                asset: asset.name.clone(),
                reason: "release does not publish a digest for this asset".to_string(),
            })
        }
        (_, Some(expected)) => expected,
    };

    if !expected.starts_with(SHA256_PREFIX) {
        return Err(Error::Unverifiable {
            asset: asset.name.clone(),
            reason: format!("unsupported digest '{}'", expected),
        });
    }

    let (matched, actual) = verify_file(path, expected)?;
    if !matched {
        return Err(Error::Verification {
            asset: asset.name.clone(),
            expected: expected.to_string(),
            actual,
        });
    }

    tracing::info!("Verified {} ({})", asset.name, actual);
    Ok(())
}
