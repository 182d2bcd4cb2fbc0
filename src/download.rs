use crate::error::{Error, Result};
use crate::types::PlatformInfo;
use flate2::read::GzDecoder;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Send `request` and stream the response body into `local_path`.
///
/// Cancellation stops the transfer between chunks; the partial file is left
/// for the caller's staging area to discard.
pub async fn download_file(
    request: reqwest::RequestBuilder,
    local_path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let filename = local_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    tracing::info!("Downloading {}...", filename);

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        response = request.send() => response?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Transport(format!(
            "download of {} failed with status {}",
            filename, status
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = ProgressBar::new(total_size);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Downloading {}", filename));

    let mut file = fs::File::create(local_path)?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                pb.abandon_with_message("Download cancelled");
                return Err(Error::Cancelled);
            }
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }
    file.flush()?;

    pb.finish_with_message("Download complete");
    tracing::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    TarXz,
    TarBz2,
    Zip,
}

impl ArchiveKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(ArchiveKind::TarXz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Some(ArchiveKind::TarBz2)
        } else if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else {
            None
        }
    }
}

/// Extract `archive_path` into `extract_dir`, refusing any entry that would
/// land outside it.
pub fn extract_archive(archive_path: &Path, extract_dir: &Path, kind: ArchiveKind) -> Result<()> {
    let archive_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    tracing::info!("Extracting {}...", archive_name);

    fs::create_dir_all(extract_dir)?;
    let file = fs::File::open(archive_path)?;

    match kind {
        ArchiveKind::TarGz => unpack_tar(Archive::new(GzDecoder::new(file)), extract_dir, &archive_name),
        ArchiveKind::TarXz => unpack_tar(
            Archive::new(xz2::read::XzDecoder::new(file)),
            extract_dir,
            &archive_name,
        ),
        ArchiveKind::TarBz2 => unpack_tar(
            Archive::new(bzip2::read::BzDecoder::new(file)),
            extract_dir,
            &archive_name,
        ),
        ArchiveKind::Zip => extract_zip(file, extract_dir, &archive_name),
    }
}

fn unpack_tar<R: Read>(mut archive: Archive<R>, extract_dir: &Path, archive_name: &str) -> Result<()> {
    archive.set_preserve_permissions(true);
    let entries = archive
        .entries()
        .map_err(|e| Error::extraction(archive_name, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::extraction(archive_name, e))?;
        let path = entry
            .path()
            .map_err(|e| Error::extraction(archive_name, e))?
            .into_owned();

        if escapes_root(Path::new(""), &path) {
            return Err(Error::extraction(
                archive_name,
                format!("entry '{}' escapes the extraction directory", path.display()),
            ));
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let target = entry
                .link_name()
                .map_err(|e| Error::extraction(archive_name, e))?
                .map(|t| t.into_owned());
            if let Some(target) = target {
                // Symlink targets resolve from the link's directory, hard links from the root.
                let base = if entry_type.is_symlink() {
                    path.parent().map(Path::to_path_buf).unwrap_or_default()
                } else {
                    PathBuf::new()
                };
                if escapes_root(&base, &target) {
                    return Err(Error::extraction(
                        archive_name,
                        format!(
                            "link '{}' -> '{}' escapes the extraction directory",
                            path.display(),
                            target.display()
                        ),
                    ));
                }
            }
        }

        let unpacked = entry
            .unpack_in(extract_dir)
            .map_err(|e| Error::extraction(archive_name, e))?;
        if !unpacked {
            return Err(Error::extraction(
                archive_name,
                format!("entry '{}' was rejected", path.display()),
            ));
        }
    }

    Ok(())
}

fn extract_zip(file: fs::File, extract_dir: &Path, archive_name: &str) -> Result<()> {
    let mut archive =
        zip::ZipArchive::new(io::BufReader::new(file)).map_err(|e| Error::extraction(archive_name, e))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| Error::extraction(archive_name, e))?;

        let relative = match file.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                return Err(Error::extraction(
                    archive_name,
                    format!("entry '{}' escapes the extraction directory", file.name()),
                ))
            }
        };
        let outpath = extract_dir.join(&relative);

        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)?;
        io::copy(&mut file, &mut outfile).map_err(|e| Error::extraction(archive_name, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
    }

    Ok(())
}

/// Lexically resolve `target` against `base` (both relative to the archive
/// root) and report whether the result leaves the root.
fn escapes_root(base: &Path, target: &Path) -> bool {
    let mut depth: i64 = 0;
    for component in base.components().chain(target.components()) {
        match component {
            Component::Prefix(_) | Component::RootDir => return true,
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            Component::Normal(_) => depth += 1,
        }
    }
    false
}

/// Whether `head` starts with the executable signature of `os`.
pub fn has_native_magic(head: &[u8], os: &str) -> bool {
    const ELF: &[u8] = b"\x7fELF";
    const PE: &[u8] = b"MZ";
    const MACH_O: &[&[u8]] = &[
        &[0xfe, 0xed, 0xfa, 0xce],
        &[0xfe, 0xed, 0xfa, 0xcf],
        &[0xce, 0xfa, 0xed, 0xfe],
        &[0xcf, 0xfa, 0xed, 0xfe],
        &[0xca, 0xfe, 0xba, 0xbe],
    ];

    match os {
        "windows" => head.starts_with(PE),
        "darwin" => MACH_O.iter().any(|magic| head.starts_with(magic)),
        _ => head.starts_with(ELF),
    }
}

fn is_native_executable(path: &Path, os: &str) -> bool {
    let mut head = [0u8; 4];
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    match file.read(&mut head) {
        Ok(n) => has_native_magic(&head[..n], os),
        Err(_) => false,
    }
}

/// Find native executables under `install_root`, relative to it.
///
/// Only `bin/` is scanned when present; otherwise the whole tree.
pub fn discover_executables(install_root: &Path, platform: &PlatformInfo) -> Result<Vec<String>> {
    let bin_dir = install_root.join("bin");
    let scan_root = if bin_dir.is_dir() {
        bin_dir
    } else {
        install_root.to_path_buf()
    };

    let mut found = Vec::new();
    for entry in WalkDir::new(&scan_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_native_executable(path, &platform.os) {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(install_root) {
            found.push(relative_to_manifest_path(relative));
        }
    }

    tracing::debug!(
        "Discovered {} executable(s) under {}",
        found.len(),
        scan_root.display()
    );
    Ok(found)
}

/// Manifest paths always use `/`.
pub fn relative_to_manifest_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn make_executable(path: &Path, platform: &PlatformInfo) -> Result<()> {
    if platform.is_windows() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}
