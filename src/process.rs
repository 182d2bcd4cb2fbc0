//! Live process-table inspection used to keep running binaries from being
//! deleted underneath their processes.

use crate::error::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProcess {
    pub pid: u32,
    /// Resolved (symlink-followed) executable path.
    pub exe: PathBuf,
}

pub trait ProcessInspector: Send + Sync {
    fn running_processes(&self) -> Result<Vec<RunningProcess>>;
}

/// Reads the host's process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcesses;

impl ProcessInspector for SystemProcesses {
    fn running_processes(&self) -> Result<Vec<RunningProcess>> {
        list_processes()
    }
}

#[cfg(target_os = "linux")]
fn list_processes() -> Result<Vec<RunningProcess>> {
    let mut processes = Vec::new();
    for entry in std::fs::read_dir("/proc")?.flatten() {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        // Processes we cannot inspect (other users, kernel threads, exited) are skipped.
        if let Ok(exe) = std::fs::read_link(entry.path().join("exe")) {
            processes.push(RunningProcess { pid, exe });
        }
    }
    Ok(processes)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn list_processes() -> Result<Vec<RunningProcess>> {
    use std::process::Command;

    let output = Command::new("ps").args(["-axo", "pid=,comm="]).output()?;
    if !output.status.success() {
        return Err(std::io::Error::other(format!(
            "ps exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let (pid, comm) = line.split_once(char::is_whitespace)?;
            let comm = comm.trim();
            if !comm.starts_with('/') {
                return None;
            }
            let exe = std::fs::canonicalize(comm).unwrap_or_else(|_| PathBuf::from(comm));
            Some(RunningProcess {
                pid: pid.parse().ok()?,
                exe,
            })
        })
        .collect())
}

#[cfg(windows)]
fn list_processes() -> Result<Vec<RunningProcess>> {
    use std::process::Command;

    let output = Command::new("powershell")
        .args([
            "-NoProfile",
            "-Command",
            "Get-Process | Where-Object { $_.Path } | ForEach-Object { \"$($_.Id)`t$($_.Path)\" }",
        ])
        .output()?;
    if !output.status.success() {
        return Err(std::io::Error::other(format!(
            "process listing failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ))
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let (pid, path) = line.trim().split_once('\t')?;
            Some(RunningProcess {
                pid: pid.parse().ok()?,
                exe: PathBuf::from(path),
            })
        })
        .collect())
}

#[cfg(not(any(unix, windows)))]
fn list_processes() -> Result<Vec<RunningProcess>> {
    Ok(Vec::new())
}

/// Exact path comparison; case-insensitive on Windows.
pub fn same_executable(a: &Path, b: &Path) -> bool {
    if cfg!(windows) {
        a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
    } else {
        a == b
    }
}

/// First running process whose executable is one of `executables`.
pub fn find_running(
    inspector: &dyn ProcessInspector,
    executables: &[PathBuf],
) -> Result<Option<(PathBuf, u32)>> {
    let resolved: Vec<(PathBuf, PathBuf)> = executables
        .iter()
        .filter_map(|declared| {
            std::fs::canonicalize(declared)
                .ok()
                .map(|real| (declared.clone(), real))
        })
        .collect();
    if resolved.is_empty() {
        return Ok(None);
    }

    for process in inspector.running_processes()? {
        for (declared, real) in &resolved {
            if same_executable(&process.exe, real) {
                return Ok(Some((declared.clone(), process.pid)));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct Fixed(Vec<RunningProcess>);

    impl ProcessInspector for Fixed {
        fn running_processes(&self) -> Result<Vec<RunningProcess>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_find_running_matches_resolved_path() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("app");
        fs::write(&exe, b"x").unwrap();
        let real = fs::canonicalize(&exe).unwrap();

        let inspector = Fixed(vec![RunningProcess { pid: 77, exe: real }]);
        let hit = find_running(&inspector, &[exe.clone()]).unwrap();
        assert_eq!(hit, Some((exe, 77)));
    }

    #[test]
    fn test_find_running_ignores_other_paths_and_missing_files() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("app");
        fs::write(&exe, b"x").unwrap();

        let inspector = Fixed(vec![RunningProcess {
            pid: 1,
            exe: PathBuf::from("/usr/bin/other"),
        }]);
        assert_eq!(find_running(&inspector, &[exe]).unwrap(), None);
        assert_eq!(
            find_running(&inspector, &[dir.path().join("missing")]).unwrap(),
            None
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_find_running_follows_symlinks() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("app-1.0");
        fs::write(&real, b"x").unwrap();
        let link = dir.path().join("app");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let inspector = Fixed(vec![RunningProcess {
            pid: 9,
            exe: fs::canonicalize(&real).unwrap(),
        }]);
        assert_eq!(find_running(&inspector, &[link.clone()]).unwrap(), Some((link, 9)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_system_scan_sees_current_process() {
        let me = fs::canonicalize(std::env::current_exe().unwrap()).unwrap();
        let processes = SystemProcesses.running_processes().unwrap();
        assert!(processes
            .iter()
            .any(|p| p.pid == std::process::id() && p.exe == me));
    }
}
