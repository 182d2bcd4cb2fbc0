mod cli;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use cli::{split_key_value, Cli, Commands, ConfigAction, OutputFormat};
use console::style;
use ghpkg::config::{load_settings, save_settings, Settings, SETTING_KEYS};
use ghpkg::{
    GitHubProvider, InstallOptions, InstallType, Installer, Manifest, PackageIdentity,
    PackageRegistry, Uninstaller, UpdateOptions, UpdateOutcome, Updater,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    if let Commands::Version = cli.command {
        println!("ghpkg v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = Arc::new(load_settings()?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cleaning up...");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Version => {}

        Commands::Install {
            package,
            pre,
            strict,
            asset,
            verify,
        } => {
            let (id, version) = PackageIdentity::parse(&package)
                .map_err(|e| anyhow!("Invalid package '{}': {}", package, e))?;
            let opts = InstallOptions {
                channel: if pre {
                    InstallType::PreRelease
                } else {
                    InstallType::Release
                },
                version,
                asset,
                verify: verify.map(Into::into).unwrap_or(settings.verify),
                strict,
            };

            let result = installer(&settings)?.install(&id, &opts, &cancel).await?;
            println!(
                "{} {} {} [{}]",
                style("Installed").green().bold(),
                id,
                result.version,
                result.install_type
            );
            for exe in &result.executables {
                println!("  {}", result.path.join(exe).display());
            }
        }

        Commands::Update {
            package,
            all,
            force,
            strict,
            verify,
        } => {
            let opts = UpdateOptions {
                force,
                strict,
                verify: verify.map(Into::into).unwrap_or(settings.verify),
            };
            let updater = Updater::new(installer(&settings)?);

            if all {
                let outcomes = updater.update_all(&opts, &cancel).await?;
                let mut failures = 0;
                for (id, outcome) in &outcomes {
                    match outcome {
                        Ok(outcome) => print_outcome(id, outcome),
                        Err(e) => {
                            failures += 1;
                            eprintln!("{} {}: {}", style("Failed").red().bold(), id, e);
                        }
                    }
                }
                tracing::info!("Update finished, {} package(s) checked", outcomes.len());
                if failures > 0 {
                    bail!("{} of {} update(s) failed", failures, outcomes.len());
                }
            } else {
                let package = package.ok_or_else(|| anyhow!("Specify a package or --all"))?;
                let id = parse_package(&package)?;
                let outcome = updater.update(&id, &opts, &cancel).await?;
                print_outcome(&id, &outcome);
            }
        }

        Commands::Remove { package } => {
            let id = parse_package(&package)?;
            Uninstaller::new(settings.clone()).uninstall(&id)?;
            println!("{} {}", style("Removed").green().bold(), id);
        }

        Commands::Pin { package } => {
            let id = parse_package(&package)?;
            let manifest = PackageRegistry::new(settings.clone()).pin(&id)?;
            println!("Pinned {} at {}", id, manifest.version);
        }

        Commands::Unpin { package } => {
            let id = parse_package(&package)?;
            PackageRegistry::new(settings.clone()).unpin(&id)?;
            println!("Unpinned {}", id);
        }

        Commands::Channel { package, channel } => {
            let id = parse_package(&package)?;
            let manifest =
                PackageRegistry::new(settings.clone()).switch_channel(&id, channel.into())?;
            println!("{} now follows the {} channel", id, manifest.install_type);
        }

        Commands::List => {
            let manifests = PackageRegistry::new(settings.clone()).list()?;
            list_installed_packages(&manifests);
        }

        Commands::Info { package, format } => {
            let id = parse_package(&package)?;
            let manifest = PackageRegistry::new(settings.clone()).info(&id)?;
            print_info(&settings, &manifest, format)?;
        }

        Commands::Config { action } => handle_config(&settings, action)?,
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn installer(settings: &Arc<Settings>) -> Result<Installer> {
    let provider = GitHubProvider::new(settings).context("Failed to set up GitHub client")?;
    Ok(Installer::new(settings.clone(), Arc::new(provider)))
}

/// Commands other than `install` act on the package as installed, not on a tag.
fn parse_package(selector: &str) -> Result<PackageIdentity> {
    let (id, tag) = PackageIdentity::parse(selector)
        .map_err(|e| anyhow!("Invalid package '{}': {}", selector, e))?;
    if let Some(tag) = tag {
        bail!("'{}' takes no version, drop '@{}'", selector, tag);
    }
    Ok(id)
}

fn print_outcome(id: &PackageIdentity, outcome: &UpdateOutcome) {
    match outcome {
        UpdateOutcome::Updated {
            previous_version,
            result,
        } => println!(
            "{} {} {} -> {}",
            style("Updated").green().bold(),
            id,
            previous_version,
            result.version
        ),
        UpdateOutcome::AlreadyUpToDate { version } => {
            println!("{} is up to date ({})", id, version)
        }
        UpdateOutcome::PinnedSkip { version } => println!(
            "{} {} is pinned at {} (use --force to update)",
            style("Skipped").yellow(),
            id,
            version
        ),
    }
}

fn list_installed_packages(manifests: &[Manifest]) {
    println!("--- Installed Packages ---");
    if manifests.is_empty() {
        println!("  No packages installed yet.");
        return;
    }

    for m in manifests {
        let pin = if m.pinned { " (pinned)" } else { "" };
        println!(
            "  - {}/{} {} [{}]{}",
            style(&m.owner).dim(),
            style(&m.repo).bold(),
            m.version,
            m.install_type,
            pin
        );
    }
    println!("--------------------------");
}

fn print_info(settings: &Settings, manifest: &Manifest, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(manifest)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(manifest)?),
        OutputFormat::Plain => {
            let install_dir = manifest.identity().install_dir(&settings.package_root);
            println!("{}/{}", manifest.owner, manifest.repo);
            println!("  Version:      {}", manifest.version);
            println!("  Channel:      {}", manifest.install_type);
            println!("  Pinned:       {}", manifest.pinned);
            println!("  Last updated: {}", manifest.last_updated.to_rfc3339());
            println!("  Location:     {}", install_dir.display());
            println!("  Executables:");
            for exe in manifest.executable_paths(&install_dir) {
                println!("    {}", exe.display());
            }
        }
    }
    Ok(())
}

fn handle_config(settings: &Settings, action: ConfigAction) -> Result<()> {
    // Edits apply to the file as stored, without environment overrides.
    let stored = || -> Result<Settings> {
        Ok(ghpkg::config::load_settings_from(
            &ghpkg::config::get_config_file_path()?,
        )?)
    };

    match action {
        ConfigAction::Get { key: Some(key) } => match settings.get(&key) {
            Some(value) => println!("{}", value),
            None => bail!(
                "'{}' is not a valid configuration setting. Valid settings: {}",
                key,
                SETTING_KEYS.join(", ")
            ),
        },
        ConfigAction::Get { key: None } => {
            println!("--- ghpkg Settings ---");
            for key in SETTING_KEYS {
                println!("  {}: {}", key, settings.get(key).unwrap_or_default());
            }
        }
        ConfigAction::Set { args } => {
            let (key, value) = split_key_value(&args)
                .ok_or_else(|| anyhow!("Invalid format. Use 'key=value' or 'key value'."))?;
            let mut stored = stored()?;
            stored.set(&key, &value)?;
            save_settings(&stored)?;
            tracing::info!("Setting '{}' updated", key);
        }
        ConfigAction::Unset { key } => {
            let mut stored = stored()?;
            stored.unset(&key)?;
            save_settings(&stored)?;
            tracing::info!("Setting '{}' unset", key);
        }
        ConfigAction::Show { format } => {
            let mut shown = settings.clone();
            if shown.github_token.is_some() {
                shown.github_token = Some("<set>".to_string());
            }
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shown)?),
                OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&shown)?),
                OutputFormat::Plain => {
                    for key in SETTING_KEYS {
                        println!("{}: {}", key, shown.get(key).unwrap_or_default());
                    }
                }
            }
        }
    }
    Ok(())
}
