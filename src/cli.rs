use clap::{Parser, Subcommand, ValueEnum};
use ghpkg::{InstallType, VerifyLevel};

fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");

    // Release builds sit on a tag
    if let Some(tag) = option_env!("GHPKG_GIT_TAG") {
        return tag;
    }

    let commit = option_env!("GHPKG_GIT_COMMIT").unwrap_or("unknown");
    let branch = option_env!("GHPKG_GIT_BRANCH").unwrap_or("unknown");

    // Leaked once at startup
    let version = format!("v{}-{} ({})", BASE_VERSION, commit, branch);
    Box::leak(version.into_boxed_str())
}

#[derive(Parser)]
#[command(name = "ghpkg")]
#[command(about = "Install and update executables published as GitHub release assets")]
#[command(version = get_version(), propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install a package, replacing any existing install of it
    #[command(after_help = "Examples:\n  ghpkg install cli/cli\n  ghpkg install nektos/act@v0.2.79\n  ghpkg install --pre sst/opencode")]
    Install {
        /// GitHub repository (e.g., 'owner/repo' or 'owner/repo@vX.Y.Z')
        package: String,
        /// Follow the pre-release channel
        #[arg(long)]
        pre: bool,
        /// Stay on a pre-release even when a newer stable release exists
        #[arg(long)]
        strict: bool,
        /// Explicitly specify asset name from the release to download
        #[arg(long)]
        asset: Option<String>,
        /// Digest verification level (defaults to the configured one)
        #[arg(long, value_enum)]
        verify: Option<VerifyArg>,
    },

    /// Update one package, or all of them
    Update {
        /// Package to update (e.g., 'owner/repo')
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        package: Option<String>,
        /// Update every installed package
        #[arg(long)]
        all: bool,
        /// Update pinned packages too
        #[arg(long)]
        force: bool,
        /// Stay on a pre-release even when a newer stable release exists
        #[arg(long)]
        strict: bool,
        /// Digest verification level (defaults to the configured one)
        #[arg(long, value_enum)]
        verify: Option<VerifyArg>,
    },

    /// Remove an installed package
    Remove {
        /// Package to remove (e.g., 'owner/repo')
        package: String,
    },

    /// Keep a package at its installed version
    Pin {
        package: String,
    },

    /// Allow a pinned package to update again
    Unpin {
        package: String,
    },

    /// Change the channel future updates follow
    Channel {
        package: String,
        #[arg(value_enum)]
        channel: ChannelArg,
    },

    /// List installed packages
    List,

    /// Show detailed information about a package
    Info {
        package: String,
        /// Output format
        #[arg(long, value_enum, default_value = "plain")]
        format: OutputFormat,
    },

    /// Manage ghpkg's configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the current version
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a configuration setting
    Get {
        /// Key to get (if omitted, shows all settings)
        key: Option<String>,
    },
    /// Set a configuration setting
    Set {
        /// Key and value (e.g., 'bin-root=~/.local/bin' or 'bin-root ~/.local/bin')
        #[arg(trailing_var_arg = true, required = true)]
        args: Vec<String>,
    },
    /// Unset a configuration setting (restores its default)
    Unset {
        /// Key to unset (e.g., 'bin-root')
        key: String,
    },
    /// Show full configuration
    Show {
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum VerifyArg {
    None,
    IfAvailable,
    Required,
}

impl From<VerifyArg> for VerifyLevel {
    fn from(arg: VerifyArg) -> Self {
        match arg {
            VerifyArg::None => VerifyLevel::None,
            VerifyArg::IfAvailable => VerifyLevel::IfAvailable,
            VerifyArg::Required => VerifyLevel::Required,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ChannelArg {
    Release,
    #[value(alias = "pre-release")]
    Prerelease,
}

impl From<ChannelArg> for InstallType {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Release => InstallType::Release,
            ChannelArg::Prerelease => InstallType::PreRelease,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
    Plain,
}

/// Accept both `key=value` and `key value`.
pub fn split_key_value(args: &[String]) -> Option<(String, String)> {
    match args {
        [single] => single
            .split_once('=')
            .map(|(k, v)| (k.to_string(), v.to_string())),
        [key, rest @ ..] if !rest.is_empty() => Some((key.clone(), rest.join(" "))),
        _ => None,
    }
}
