mod error;
mod logging;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};

use launcher_update::{
    GitHubReleaseHost, HttpDownloader, ProgressCallback, UpdateDiscovery, UpdateInfo,
    UpdateInstaller, UpdateResult, UpdateState, Version, backup_path, current_executable_path,
    default_strategy, rollback,
};

use crate::error::CliError;
use crate::settings::LauncherSettings;

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Keeps the IW4x launcher up to date.
#[derive(Debug, Parser)]
#[command(name = "iw4x-launcher", version, about)]
struct Cli {
    /// Log debug output to the terminal and the log file.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report whether a newer release is available.
    Check {
        /// Consider prereleases.
        #[arg(long)]
        prerelease: bool,
    },
    /// Download and install the newest release, or the one under `--tag`.
    Update(UpdateArgs),
    /// Restore the executable saved by the last update.
    Rollback,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    /// Install this release tag even if it is not newer.
    #[arg(long)]
    tag: Option<String>,

    /// Consider prereleases.
    #[arg(long)]
    prerelease: bool,

    /// Do not restart into the new launcher after installing.
    #[arg(long)]
    no_restart: bool,

    /// Directory for the downloaded archive and extraction.
    #[arg(long, value_name = "DIR")]
    download_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = LauncherSettings::load();
    settings.apply_token_override(std::env::var("GITHUB_TOKEN").ok());
    logging::init_logging(
        cli.verbose || settings.debug_logging,
        settings.max_log_size_bytes,
    );

    match run(cli.command, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            debug!("Command failed: {error:?}");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, settings: &LauncherSettings) -> Result<(), CliError> {
    match command {
        Command::Check { prerelease } => check(settings, prerelease).await,
        Command::Update(args) => update(settings, args).await,
        Command::Rollback => rollback_current(),
    }
}

fn current_version() -> Result<Version, CliError> {
    CURRENT_VERSION
        .parse()
        .map_err(|source| CliError::CurrentVersion {
            version: CURRENT_VERSION,
            source,
        })
}

fn http_client(settings: &LauncherSettings) -> Result<reqwest::Client, CliError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.http_timeout_secs))
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .user_agent(format!("iw4x-launcher/{CURRENT_VERSION}"))
        .build()
        .map_err(CliError::ClientBuild)
}

fn discovery(
    settings: &LauncherSettings,
    client: reqwest::Client,
    prerelease: bool,
) -> UpdateDiscovery<GitHubReleaseHost> {
    let host = match &settings.github_token {
        Some(token) => GitHubReleaseHost::with_token(client, token.clone()),
        None => GitHubReleaseHost::new(client),
    };
    let mut discovery = UpdateDiscovery::new(host);
    discovery.set_include_prerelease(settings.include_prerelease || prerelease);
    discovery
}

async fn check(settings: &LauncherSettings, prerelease: bool) -> Result<(), CliError> {
    let current = current_version()?;
    let discovery = discovery(settings, http_client(settings)?, prerelease);

    match discovery
        .check_for_update(&settings.owner, &settings.repo, &current)
        .await
    {
        Some(info) => print_available(&current, &info),
        None => println!("Launcher {current} is up to date"),
    }
    Ok(())
}

fn print_available(current: &Version, info: &UpdateInfo) {
    let channel = if info.prerelease { " (prerelease)" } else { "" };
    println!(
        "Update available: {current} -> {} [{}]{channel}",
        info.version, info.tag_name
    );
    if !info.release_url.is_empty() {
        println!("{}", info.release_url);
    }
}

async fn update(settings: &LauncherSettings, args: UpdateArgs) -> Result<(), CliError> {
    let client = http_client(settings)?;
    let discovery = discovery(settings, client.clone(), args.prerelease);

    let info = if let Some(tag) = &args.tag {
        discovery
            .fetch_by_tag(&settings.owner, &settings.repo, tag)
            .await
            .ok_or_else(|| CliError::TagNotFound(tag.clone()))?
    } else {
        let current = current_version()?;
        let Some(info) = discovery
            .check_for_update(&settings.owner, &settings.repo, &current)
            .await
        else {
            println!("Launcher {current} is up to date");
            return Ok(());
        };
        info
    };

    println!("Installing {} [{}]", info.version, info.tag_name);

    let mut installer = UpdateInstaller::new(HttpDownloader::new(client));
    if let Some(dir) = args.download_dir.or_else(|| settings.download_dir.clone()) {
        installer.set_download_directory(dir);
    }
    installer.set_verify_size(settings.verify_size);
    installer.set_progress_callback(progress_printer());

    let result = installer.install(&info).await;
    if !result.success {
        return Err(CliError::Install(result.error_message));
    }

    let installed = result
        .installed_path
        .unwrap_or_else(current_executable_path);
    println!("Installed {} to {}", info.version, installed.display());

    if args.no_restart || !settings.restart_after_install {
        info!("Restart skipped");
        return Ok(());
    }

    let strategy = default_strategy(installer.download_directory());
    if strategy.schedule_restart(&installed) {
        info!("Handing over to the new launcher");
    } else {
        warn!("Automatic restart failed");
        eprintln!("Restart the launcher to use the new version.");
    }
    Ok(())
}

fn progress_printer() -> ProgressCallback {
    Arc::new(|state: UpdateState, fraction: f64, message: &str| match state {
        UpdateState::Downloading if fraction > 0.0 => {
            eprint!("\r{message} {:>3.0}%", fraction * 100.0);
        }
        UpdateState::Downloading => eprint!("\r{message}"),
        UpdateState::Extracting | UpdateState::Installing | UpdateState::Done => {
            eprintln!("\r{message}");
        }
        UpdateState::Failed => eprintln!(),
    })
}

fn rollback_current() -> Result<(), CliError> {
    let target = current_executable_path();
    let result = UpdateResult {
        installed_path: Some(target.clone()),
        backup_path: Some(backup_path(&target)),
        ..UpdateResult::default()
    };

    if rollback(&result) {
        println!("Restored previous launcher at {}", target.display());
        Ok(())
    } else {
        Err(CliError::Rollback(target))
    }
}
