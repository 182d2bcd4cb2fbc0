//! Host platform detection and release asset selection.
//!
//! Selection is driven by [`RULES`], a declarative table of OS/arch name
//! tokens, per-OS extension preferences and penalty substrings, consumed by
//! the pure [`score_asset`] function.

use crate::download::ArchiveKind;
use crate::error::{Error, Result};
use crate::types::{AssetCandidate, PlatformInfo};

pub fn get_system_info() -> PlatformInfo {
    normalize_platform(std::env::consts::OS, std::env::consts::ARCH)
}

pub fn normalize_platform(os: &str, arch: &str) -> PlatformInfo {
    let os = match os {
        "macos" => "darwin",
        other => other,
    };

    let arch = match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" | "i686" => "386",
        other => other,
    };

    PlatformInfo::new(os, arch)
}

/// One entry of an extension preference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Suffix(&'static str),
    /// A file carrying no recognized suffix at all.
    RawBinary,
}

pub struct AssetRules {
    pub os_tokens: &'static [(&'static str, &'static [&'static str])],
    pub arch_tokens: &'static [(&'static str, &'static [&'static str])],
    /// Highest preference first.
    pub unix_extensions: &'static [Extension],
    pub windows_extensions: &'static [Extension],
    /// Substrings that cost a point on non-Windows targets.
    pub unix_penalties: &'static [(&'static str, i32)],
    /// Assets with these suffixes never qualify.
    pub ignored_suffixes: &'static [&'static str],
    /// Compression suffixes; an asset ending in one only qualifies if it is an
    /// archive the extractor understands.
    pub compressed_suffixes: &'static [&'static str],
    pub os_score: i32,
    pub arch_score: i32,
}

pub static RULES: AssetRules = AssetRules {
    os_tokens: &[
        ("linux", &["linux"]),
        ("darwin", &["macos", "darwin", "mac", "osx", "apple"]),
        ("windows", &["windows", "win64", "win32", "pc-windows"]),
        ("freebsd", &["freebsd"]),
    ],
    arch_tokens: &[
        ("amd64", &["amd64", "x86_64", "x86-64", "x64"]),
        ("arm64", &["arm64", "aarch64"]),
        ("arm", &["armv7", "armv6", "armhf", "armv7l"]),
        ("386", &["i386", "i686", "386"]),
    ],
    unix_extensions: &[
        Extension::Suffix(".tar.gz"),
        Extension::Suffix(".tgz"),
        Extension::Suffix(".tar.xz"),
        Extension::Suffix(".tar.bz2"),
        Extension::Suffix(".zip"),
        Extension::RawBinary,
        Extension::Suffix(".appimage"),
    ],
    windows_extensions: &[
        Extension::Suffix(".zip"),
        Extension::Suffix(".exe"),
        Extension::Suffix(".msi"),
        Extension::RawBinary,
    ],
    unix_penalties: &[("musl", -1)],
    ignored_suffixes: &[
        ".sha256", ".sha256sum", ".sha512", ".sha1", ".md5", ".sig", ".asc", ".pem", ".pub",
        ".sbom", ".spdx", ".intoto.jsonl", ".md", ".txt", ".json", ".xml", ".pom", ".yaml",
        ".yml", ".deb", ".rpm", ".apk", ".whl", ".dmg", ".pkg", ".vsix",
    ],
    compressed_suffixes: &[
        ".gz", ".tgz", ".xz", ".txz", ".bz2", ".tbz2", ".tbz", ".zst", ".tzst", ".lz", ".lzma",
        ".7z", ".rar", ".zip",
    ],
    os_score: 11,
    arch_score: 7,
};

/// Suffixes that count as "known" when deciding whether a name is a raw binary.
const KNOWN_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.bz2", ".tbz2", ".tbz", ".zip", ".exe", ".msi",
    ".appimage",
];

fn tokens_for<'a>(
    table: &'a [(&'static str, &'static [&'static str])],
    key: &str,
) -> Option<&'a [&'static str]> {
    table.iter().find(|(k, _)| *k == key).map(|(_, tokens)| *tokens)
}

fn extension_matches(name_lower: &str, ext: Extension) -> bool {
    match ext {
        Extension::Suffix(suffix) => name_lower.ends_with(suffix),
        Extension::RawBinary => !KNOWN_SUFFIXES.iter().any(|s| name_lower.ends_with(s)),
    }
}

/// Extension bonus: earlier entries in the preference list score higher.
fn extension_score(name_lower: &str, preferences: &[Extension]) -> i32 {
    preferences
        .iter()
        .position(|ext| extension_matches(name_lower, *ext))
        .map(|index| (preferences.len() - index) as i32)
        .unwrap_or(0)
}

/// Score one asset name for a platform. `None` means the asset does not qualify.
pub fn score_asset(rules: &AssetRules, name: &str, platform: &PlatformInfo) -> Result<Option<i32>> {
    let (os_tokens, arch_tokens) = platform_tokens(rules, platform)?;

    let name_lower = name.to_lowercase();

    if rules
        .ignored_suffixes
        .iter()
        .any(|suffix| name_lower.ends_with(suffix))
    {
        return Ok(None);
    }

    if is_unsupported_archive(rules, &name_lower) {
        tracing::trace!("Asset '{}' is compressed in a format we cannot extract", name);
        return Ok(None);
    }

    let os_match = os_tokens.iter().any(|t| name_lower.contains(t));
    let arch_match = arch_tokens.iter().any(|t| name_lower.contains(t));
    if !os_match || !arch_match {
        return Ok(None);
    }

    let mut score = 0;
    if os_match {
        score += rules.os_score;
    }
    if arch_match {
        score += rules.arch_score;
    }

    if platform.is_windows() {
        score += extension_score(&name_lower, rules.windows_extensions);
    } else {
        score += extension_score(&name_lower, rules.unix_extensions);
        for (needle, penalty) in rules.unix_penalties {
            if name_lower.contains(needle) {
                score += penalty;
            }
        }
    }

    Ok(Some(score))
}

/// Compressed, but not as an archive [`ArchiveKind`] can unpack.
pub fn is_unsupported_archive(rules: &AssetRules, name: &str) -> bool {
    let name_lower = name.to_lowercase();
    rules
        .compressed_suffixes
        .iter()
        .any(|suffix| name_lower.ends_with(suffix))
        && ArchiveKind::from_name(&name_lower).is_none()
}

/// Token lists for the platform; an OS or arch missing from the table is an error.
fn platform_tokens<'a>(
    rules: &'a AssetRules,
    platform: &PlatformInfo,
) -> Result<(&'a [&'static str], &'a [&'static str])> {
    let os_tokens = tokens_for(rules.os_tokens, &platform.os).ok_or_else(unsupported(platform))?;
    let arch_tokens =
        tokens_for(rules.arch_tokens, &platform.arch).ok_or_else(unsupported(platform))?;
    Ok((os_tokens, arch_tokens))
}

fn unsupported(platform: &PlatformInfo) -> impl FnOnce() -> Error + '_ {
    move || Error::UnsupportedPlatform {
        os: platform.os.clone(),
        arch: platform.arch.clone(),
    }
}

/// Return every qualifying candidate tied for the best score, in input order.
///
/// An empty result means nothing qualified; an unknown OS or architecture is
/// an error.
pub fn select_assets(
    candidates: &[AssetCandidate],
    platform: &PlatformInfo,
) -> Result<Vec<AssetCandidate>> {
    tracing::trace!(
        "Looking for assets matching OS: '{}', ARCH: '{}'",
        platform.os,
        platform.arch
    );
    platform_tokens(&RULES, platform)?;

    let mut scored = Vec::new();
    for candidate in candidates {
        match score_asset(&RULES, &candidate.name, platform)? {
            Some(score) => {
                tracing::trace!("Asset '{}' scored {}", candidate.name, score);
                scored.push((score, candidate));
            }
            None => tracing::trace!("Asset '{}' does not qualify", candidate.name),
        }
    }

    // Stable: ties keep their input order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let Some(best) = scored.first().map(|(score, _)| *score) else {
        return Ok(Vec::new());
    };

    Ok(scored
        .into_iter()
        .take_while(|(score, _)| *score == best)
        .map(|(_, candidate)| candidate.clone())
        .collect())
}

/// [`select_assets`] with the first-wins tie-break.
pub fn select_best(
    candidates: &[AssetCandidate],
    platform: &PlatformInfo,
) -> Result<Option<AssetCandidate>> {
    let ties = select_assets(candidates, platform)?;
    if ties.len() > 1 {
        tracing::debug!(
            "{} assets tied, picking '{}'",
            ties.len(),
            ties[0].name
        );
    }
    Ok(ties.into_iter().next())
}
