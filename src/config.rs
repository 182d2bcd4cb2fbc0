use crate::error::{Error, Result};
use crate::types::VerifyLevel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "ghpkg";
pub const PACKAGES_DIR_NAME: &str = "packages";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Keys accepted by `config get|set|unset`.
pub const SETTING_KEYS: &[&str] = &[
    "package_root",
    "bin_root",
    "github_token",
    "http_timeout_secs",
    "verify",
    "api_url",
];

/// Explicit configuration value handed to every component at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_package_root")]
    pub package_root: PathBuf,
    /// Directory executables are linked into. `None` disables linking.
    #[serde(default = "default_bin_root")]
    pub bin_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub verify: VerifyLevel,
    /// GitHub REST endpoint; GitHub Enterprise or a test server.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_package_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join(PACKAGES_DIR_NAME)
}

fn default_bin_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".local").join("bin"))
}

fn default_http_timeout_secs() -> u64 {
    300
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            package_root: default_package_root(),
            bin_root: default_bin_root(),
            github_token: None,
            http_timeout_secs: default_http_timeout_secs(),
            verify: VerifyLevel::default(),
            api_url: default_api_url(),
        }
    }
}

impl Settings {
    /// Settings rooted at `package_root` with linking disabled.
    pub fn with_package_root(package_root: impl Into<PathBuf>) -> Self {
        Self {
            package_root: package_root.into(),
            bin_root: None,
            github_token: None,
            http_timeout_secs: default_http_timeout_secs(),
            verify: VerifyLevel::default(),
            api_url: default_api_url(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = match normalize_key(key).as_str() {
            "package_root" => self.package_root.display().to_string(),
            "bin_root" => self
                .bin_root
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            "github_token" => match &self.github_token {
                Some(_) => "<set>".to_string(),
                None => String::new(),
            },
            "http_timeout_secs" => self.http_timeout_secs.to_string(),
            "verify" => self.verify.to_string(),
            "api_url" => self.api_url.clone(),
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_key(key).as_str() {
            "package_root" => self.package_root = PathBuf::from(value),
            "bin_root" => {
                self.bin_root = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            "github_token" => {
                self.github_token = Some(value.to_string()).filter(|t| !t.is_empty())
            }
            "http_timeout_secs" => {
                self.http_timeout_secs = value
                    .parse()
                    .map_err(|_| Error::Config(format!("Invalid value for '{}'", key)))?
            }
            "verify" => self.verify = value.parse().map_err(Error::Config)?,
            "api_url" => {
                if value.is_empty() {
                    return Err(Error::Config("api_url cannot be empty".to_string()));
                }
                self.api_url = value.trim_end_matches('/').to_string()
            }
            other => return Err(unknown_key(other)),
        }
        Ok(())
    }

    pub fn unset(&mut self, key: &str) -> Result<()> {
        let defaults = Settings::default();
        match normalize_key(key).as_str() {
            "package_root" => self.package_root = defaults.package_root,
            "bin_root" => self.bin_root = defaults.bin_root,
            "github_token" => self.github_token = None,
            "http_timeout_secs" => self.http_timeout_secs = defaults.http_timeout_secs,
            "verify" => self.verify = defaults.verify,
            "api_url" => self.api_url = defaults.api_url,
            other => return Err(unknown_key(other)),
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("GHPKG_PACKAGE_ROOT") {
            if !root.is_empty() {
                self.package_root = PathBuf::from(root);
            }
        }

        if let Ok(bin_root) = std::env::var("GHPKG_BIN_ROOT") {
            self.bin_root = Some(PathBuf::from(bin_root)).filter(|p| !p.as_os_str().is_empty());
        }

        if let Ok(api_url) = std::env::var("GHPKG_API_URL") {
            if !api_url.is_empty() {
                self.api_url = api_url.trim_end_matches('/').to_string();
            }
        }

        for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
            if let Ok(token) = std::env::var(var) {
                if !token.is_empty() {
                    tracing::debug!("Using token from {}", var);
                    self.github_token = Some(token);
                    break;
                }
            }
        }
    }
}

fn unknown_key(key: &str) -> Error {
    Error::Config(format!(
        "'{}' is not a valid configuration setting. Valid settings: {}",
        key,
        SETTING_KEYS.join(", ")
    ))
}

pub fn get_config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("GHPKG_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let path = dirs::config_dir()
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?
        .join(APP_NAME)
        .join(CONFIG_FILE_NAME);
    tracing::debug!("Config file path: {}", path.display());
    Ok(path)
}

/// Read settings from disk, then apply environment overrides.
pub fn load_settings() -> Result<Settings> {
    let mut settings = load_settings_from(&get_config_file_path()?)?;
    settings.apply_env_overrides();
    Ok(settings)
}

/// Read settings from a specific file; a missing file yields defaults.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Could not parse config file {}: {}",
            path.display(),
            e
        ))
    })
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(settings, &get_config_file_path()?)
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| Error::Config(e.to_string()))?;
    fs::write(path, content)?;
    Ok(())
}

pub fn normalize_key(key: &str) -> String {
    key.replace('-', "_")
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() {
                format!("_{}", c.to_lowercase())
            } else {
                c.to_string()
            }
        })
        .collect::<String>()
        .to_lowercase()
}
