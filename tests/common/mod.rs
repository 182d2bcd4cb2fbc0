#![allow(dead_code)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use ghpkg::config::Settings;
use ghpkg::process::{ProcessInspector, RunningProcess};
use ghpkg::{AssetCandidate, Error, Installer, PackageIdentity, PlatformInfo, ReleaseProvider, ReleaseRef};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Smallest file the Linux discovery accepts as an executable.
pub const ELF_STUB: &[u8] = b"\x7fELF\x02\x01\x01\x00stub";

pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}

/// A `.tar.gz` holding `entries` as regular files with mode 0755.
pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A `.tar.bz2` holding `entries` as regular files with mode 0755.
pub fn tar_bz2(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A `.zip` holding `entries` as files with unix mode 0755.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default().unix_permissions(0o755);
    for (path, data) in entries {
        writer.start_file(*path, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// In-memory release source: releases newest first, asset bytes by name.
#[derive(Default)]
pub struct FakeProvider {
    releases: Mutex<Vec<ReleaseRef>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    downloads: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a release whose assets carry correct digests.
    pub fn publish(&self, tag: &str, prerelease: bool, assets: &[(&str, Vec<u8>)]) {
        let candidates = assets
            .iter()
            .map(|(name, bytes)| {
                let candidate = asset(tag, name, Some(sha256_digest(bytes)));
                self.files
                    .lock()
                    .unwrap()
                    .insert(candidate.browser_download_url.clone(), bytes.clone());
                candidate
            })
            .collect();
        self.push(ReleaseRef {
            tag_name: tag.to_string(),
            prerelease,
            assets: candidates,
        });
    }

    /// Publish a release as-is; `files` provides the served bytes per asset name.
    pub fn publish_raw(&self, release: ReleaseRef, files: &[(&str, Vec<u8>)]) {
        for (name, bytes) in files {
            if let Some(a) = release.find_asset(name) {
                self.files
                    .lock()
                    .unwrap()
                    .insert(a.browser_download_url.clone(), bytes.clone());
            }
        }
        self.push(release);
    }

    fn push(&self, release: ReleaseRef) {
        self.releases.lock().unwrap().insert(0, release);
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

pub fn asset(tag: &str, name: &str, digest: Option<String>) -> AssetCandidate {
    AssetCandidate {
        name: name.to_string(),
        browser_download_url: format!("https://example.invalid/{}/{}", tag, name),
        api_url: format!("https://api.example.invalid/assets/{}/{}", tag, name),
        digest,
    }
}

#[async_trait]
impl ReleaseProvider for FakeProvider {
    async fn latest_release(&self, _id: &PackageIdentity) -> ghpkg::Result<Option<ReleaseRef>> {
        Ok(self
            .releases
            .lock()
            .unwrap()
            .iter()
            .find(|r| !r.prerelease)
            .cloned())
    }

    async fn release_by_tag(
        &self,
        _id: &PackageIdentity,
        tag: &str,
    ) -> ghpkg::Result<Option<ReleaseRef>> {
        Ok(self
            .releases
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.tag_name == tag)
            .cloned())
    }

    async fn list_releases(&self, _id: &PackageIdentity) -> ghpkg::Result<Vec<ReleaseRef>> {
        Ok(self.releases.lock().unwrap().clone())
    }

    async fn download_asset(
        &self,
        asset: &AssetCandidate,
        dest: &Path,
        _cancel: &CancellationToken,
    ) -> ghpkg::Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .files
            .lock()
            .unwrap()
            .get(&asset.browser_download_url)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("404 for {}", asset.name)))?;
        fs::write(dest, bytes)?;
        Ok(())
    }
}

/// Process table the test controls.
#[derive(Default)]
pub struct FakeProcesses {
    running: Mutex<Vec<RunningProcess>>,
}

impl FakeProcesses {
    pub fn start(&self, pid: u32, exe: &Path) {
        let exe = fs::canonicalize(exe).unwrap_or_else(|_| exe.to_path_buf());
        self.running.lock().unwrap().push(RunningProcess { pid, exe });
    }

    pub fn stop_all(&self) {
        self.running.lock().unwrap().clear();
    }
}

impl ProcessInspector for FakeProcesses {
    fn running_processes(&self) -> ghpkg::Result<Vec<RunningProcess>> {
        Ok(self.running.lock().unwrap().clone())
    }
}

/// A package root in a temp dir wired to a fake provider and process table.
pub struct Env {
    pub temp: TempDir,
    pub settings: Arc<Settings>,
    pub provider: Arc<FakeProvider>,
    pub processes: Arc<FakeProcesses>,
}

impl Env {
    pub fn new() -> Self {
        Self::with_bin_root(false)
    }

    pub fn with_bin_root(link: bool) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let mut settings = Settings::with_package_root(temp.path().join("packages"));
        if link {
            settings.bin_root = Some(temp.path().join("bin"));
        }
        Self {
            temp,
            settings: Arc::new(settings),
            provider: Arc::new(FakeProvider::new()),
            processes: Arc::new(FakeProcesses::default()),
        }
    }

    pub fn installer(&self) -> Installer {
        Installer::new(self.settings.clone(), self.provider.clone())
            .with_platform(PlatformInfo::new("linux", "amd64"))
            .with_process_inspector(self.processes.clone())
    }

    pub fn root(&self) -> &Path {
        &self.settings.package_root
    }

    pub fn install_dir(&self, id: &PackageIdentity) -> PathBuf {
        id.install_dir(self.root())
    }
}

/// Every file under `dir` with its bytes, for before/after comparisons.
pub fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(dir).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

/// Runs the built binary against an isolated config and package root.
pub struct TestContext {
    pub _temp_dir: TempDir,
    pub config_path: PathBuf,
    pub package_root: PathBuf,
    pub bin_path: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.json");
        let package_root = temp_dir.path().join("packages");
        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_ghpkg"));

        Self {
            _temp_dir: temp_dir,
            config_path,
            package_root,
            bin_path,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        cmd.env("GHPKG_CONFIG", &self.config_path);
        cmd.env("GHPKG_PACKAGE_ROOT", &self.package_root);
        cmd.env("GHPKG_BIN_ROOT", "");
        cmd.env("GHPKG_API_URL", "http://127.0.0.1:9");
        cmd.env_remove("GITHUB_TOKEN");
        cmd.env_remove("GH_TOKEN");
        cmd.env_remove("RUST_LOG");
        cmd
    }
}

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.status.success() {
            panic!(
                "Command failed with status {:?}\nstdout: {}\nstderr: {}",
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_failure(&self) -> &Self {
        assert!(
            !self.status.success(),
            "Command unexpectedly succeeded\nstdout: {}",
            self.stdout
        );
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Stderr did not contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
