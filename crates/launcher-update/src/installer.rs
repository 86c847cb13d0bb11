//! Download, extract, and swap in a new launcher binary.
//!
//! The pipeline runs `Downloading -> Extracting -> Installing -> Done`, and
//! any stage failure goes straight to `Failed`. Every file the run creates in
//! the download directory is registered as it is created and removed when
//! the run ends, whatever the outcome.

use std::ffi::OsString;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::FutureExt;
use log::{debug, error, info, trace, warn};
use thiserror::Error;

use launcher_platform::{HideWindow, default_download_dir};

use crate::discovery::UpdateInfo;
use crate::download::{AssetDownloader, DownloadError};

/// Directory inside the download directory that archives are unpacked into.
pub const EXTRACT_DIR_NAME: &str = "launcher_update_extract";

/// File names an extracted launcher binary may have. Matched exactly.
pub const EXECUTABLE_NAMES: [&str; 4] = [
    "launcher",
    "iw4x-launcher",
    "launcher.exe",
    "iw4x-launcher.exe",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Downloading,
    Extracting,
    Installing,
    Done,
    Failed,
}

impl UpdateState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Installing => "installing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Progress observer: stage, fraction of the stage in `[0, 1]`, and a short
/// human readable message. Called on the installer's task, so it must not
/// block.
pub type ProgressCallback = Arc<dyn Fn(UpdateState, f64, &str) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub success: bool,
    pub error_message: String,
    pub installed_path: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
}

impl UpdateResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error("downloaded {actual} bytes but the release declares {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("failed to extract: {entry}: {source}")]
    ExtractEntry {
        entry: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to extract tar.xz archive: {0}")]
    Unpacker(String),
    #[error("unsupported archive format: {extension}")]
    UnsupportedArchive { extension: String },
    #[error("launcher binary not found in archive")]
    BinaryNotFound,
    #[error("extraction produced no binary")]
    MissingExtractedBinary,
    #[error("{0}")]
    Invalid(String),
}

impl InstallError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    TarXz,
}

impl ArchiveKind {
    fn from_path(path: &Path) -> Result<Self, InstallError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if file_name.ends_with(".tar.xz") {
            return Ok(Self::TarXz);
        }

        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("zip") => Ok(Self::Zip),
            Some(ext) => Err(InstallError::UnsupportedArchive {
                extension: format!(".{}", ext.to_ascii_lowercase()),
            }),
            None => Err(InstallError::UnsupportedArchive {
                extension: "(none)".to_string(),
            }),
        }
    }
}

/// Installs an [`UpdateInfo`] over the running launcher (or an explicit
/// target path).
pub struct UpdateInstaller<D> {
    downloader: D,
    download_dir: PathBuf,
    target: Option<PathBuf>,
    verify_size: bool,
    progress: Option<ProgressCallback>,
    temp_files: Vec<PathBuf>,
}

impl<D: AssetDownloader> UpdateInstaller<D> {
    pub fn new(downloader: D) -> Self {
        let download_dir = default_download_dir();
        debug!(
            "Initialized update installer with download directory {}",
            download_dir.display()
        );
        Self {
            downloader,
            download_dir,
            target: None,
            verify_size: false,
            progress: None,
            temp_files: Vec::new(),
        }
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        trace!("Setting update progress callback");
        self.progress = Some(callback);
    }

    pub fn set_download_directory(&mut self, dir: impl Into<PathBuf>) {
        self.download_dir = dir.into();
        trace!("Overriding download directory: {}", self.download_dir.display());
    }

    #[must_use]
    pub fn download_directory(&self) -> &Path {
        &self.download_dir
    }

    /// Reject downloads whose byte count differs from the asset's declared
    /// size (when it declares one).
    pub fn set_verify_size(&mut self, verify: bool) {
        trace!("Set verify_size: {verify}");
        self.verify_size = verify;
    }

    /// Install somewhere other than the running executable.
    pub fn set_target(&mut self, target: impl Into<PathBuf>) {
        self.target = Some(target.into());
    }

    #[must_use]
    pub fn target_path(&self) -> PathBuf {
        self.target.clone().unwrap_or_else(current_executable_path)
    }

    /// Artifacts registered by the current run that have not been cleaned up.
    #[must_use]
    pub fn temp_files(&self) -> &[PathBuf] {
        &self.temp_files
    }

    /// Run the whole pipeline. Never panics or errors past this call: every
    /// failure is reported through the returned [`UpdateResult`].
    pub async fn install(&mut self, info: &UpdateInfo) -> UpdateResult {
        info!(
            "Starting launcher update installation (target version: {})",
            info.tag_name
        );

        if !info.is_installable() {
            error!("Install aborted: invalid or empty update info");
            let result = UpdateResult::failure("invalid update info");
            self.report(UpdateState::Failed, 0.0, &result.error_message);
            return result;
        }

        let outcome = AssertUnwindSafe(self.run(info)).catch_unwind().await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => {
                error!("Update installation failed: {error}");
                UpdateResult::failure(error.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Unexpected fault during installation pipeline: {message}");
                UpdateResult::failure(format!("unexpected fault during installation: {message}"))
            }
        };

        if result.success {
            info!("Launcher update installed");
            self.report(UpdateState::Done, 1.0, "Update installed");
        } else {
            self.report(UpdateState::Failed, 0.0, &result.error_message);
        }

        self.cleanup();
        result
    }

    async fn run(&mut self, info: &UpdateInfo) -> Result<UpdateResult, InstallError> {
        self.report(UpdateState::Downloading, 0.0, "Downloading...");
        let archive = self.download_archive(info).await?;

        self.report(UpdateState::Extracting, 0.0, "Extracting...");
        let binary = self.extract_launcher(&archive).await?;
        self.temp_files.push(binary.clone());

        if !binary.exists() {
            error!(
                "Extraction finished but expected binary is missing: {}",
                binary.display()
            );
            return Err(InstallError::MissingExtractedBinary);
        }

        let target = self.target_path();
        if target.is_dir() {
            return Err(InstallError::Invalid(format!(
                "install target {} is a directory",
                target.display()
            )));
        }

        self.report(UpdateState::Installing, 0.0, "Installing...");
        let result = replace_binary(&binary, &target);

        if !result.success {
            error!(
                "Binary swap failed: {}. Attempting rollback.",
                result.error_message
            );
            if !rollback(&result) {
                warn!("Rollback did not restore a backup");
            }
        }

        Ok(result)
    }

    async fn download_archive(&mut self, info: &UpdateInfo) -> Result<PathBuf, InstallError> {
        if let Err(error) = tokio::fs::create_dir_all(&self.download_dir).await {
            warn!(
                "Failed to create download directory {}: {error}",
                self.download_dir.display()
            );
        }

        let file_name = Path::new(&info.asset_name)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty() && !name.contains(".."))
            .ok_or_else(|| {
                InstallError::Invalid(format!("invalid asset name '{}'", info.asset_name))
            })?;
        let dest = self.download_dir.join(file_name);
        self.temp_files.push(dest.clone());

        debug!("Downloading {} to {}", info.asset_url, dest.display());

        let total = info.asset_size;
        let progress = self.progress.clone();
        let on_progress = move |downloaded: u64| {
            if let Some(callback) = &progress {
                callback(
                    UpdateState::Downloading,
                    download_fraction(downloaded, total),
                    "Downloading...",
                );
            }
        };

        let written = self
            .downloader
            .download(&info.asset_url, &dest, &on_progress)
            .await?;

        if self.verify_size && total > 0 && written != total {
            return Err(InstallError::SizeMismatch {
                expected: total,
                actual: written,
            });
        }

        debug!("Archive download complete: {}", dest.display());
        Ok(dest)
    }

    async fn extract_launcher(&mut self, archive: &Path) -> Result<PathBuf, InstallError> {
        let dest = self.download_dir.join(EXTRACT_DIR_NAME);
        debug!("Extracting {} to {}", archive.display(), dest.display());

        let kind = ArchiveKind::from_path(archive)?;

        // A previous run that died before cleanup may have left binaries here.
        if dest.exists()
            && let Err(error) = std::fs::remove_dir_all(&dest)
        {
            warn!(
                "Failed to remove stale extraction directory {}: {error}",
                dest.display()
            );
        }
        self.temp_files.push(dest.clone());
        std::fs::create_dir_all(&dest).map_err(|error| {
            InstallError::io_with_path("failed to create extraction directory", &dest, &error)
        })?;

        match kind {
            ArchiveKind::Zip => {
                let (archive, dest) = (archive.to_path_buf(), dest.clone());
                tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
                    .await
                    .map_err(|error| {
                        InstallError::Invalid(format!("zip extraction task failed: {error}"))
                    })??;
            }
            ArchiveKind::TarXz => extract_tar_xz(archive, &dest).await?,
        }

        let binary = find_executable(&dest)?.ok_or_else(|| {
            error!("No executable matching known names found in extracted archive");
            InstallError::BinaryNotFound
        })?;
        debug!("Found launcher binary at {}", binary.display());
        Ok(binary)
    }

    /// Delete every registered artifact. Failures are logged and skipped.
    pub fn cleanup(&mut self) {
        trace!(
            "Cleaning up {} temporary files/directories",
            self.temp_files.len()
        );

        for path in self.temp_files.drain(..) {
            if !path.exists() {
                continue;
            }
            trace!("Removing temporary item: {}", path.display());
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(error) = removed {
                warn!(
                    "Failed to remove temporary item {}: {error}",
                    path.display()
                );
            }
        }
    }

    fn report(&self, state: UpdateState, fraction: f64, message: &str) {
        trace!("Progress [{}] {fraction:.2}: {message}", state.as_str());
        if let Some(callback) = &self.progress {
            callback(state, fraction, message);
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn download_fraction(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (downloaded as f64 / total as f64).clamp(0.0, 1.0)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), InstallError> {
    let file = std::fs::File::open(zip_path).map_err(|error| {
        InstallError::io_with_path("failed to open zip archive", zip_path, &error)
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| InstallError::zip("failed to open zip archive", error))?;
    trace!("Archive contains {} entries", archive.len());

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| InstallError::zip("failed to read zip entry", error))?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path: {}", entry.name());
            continue;
        };
        let entry_name = entry.name().to_string();
        let out_path = dest.join(name);
        let entry_error = |source: std::io::Error| InstallError::ExtractEntry {
            entry: entry_name.clone(),
            source,
        };

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(entry_error)?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(entry_error)?;
        std::io::copy(&mut entry, &mut outfile).map_err(entry_error)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                if let Err(error) =
                    std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                {
                    warn!("Failed to apply mode {mode:o} to {}: {error}", out_path.display());
                }
            }
        }
    }

    debug!("Zip extraction complete to {}", dest.display());
    Ok(())
}

async fn extract_tar_xz(archive: &Path, dest: &Path) -> Result<(), InstallError> {
    let tar = which::which("tar")
        .map_err(|error| InstallError::Unpacker(format!("tar not found on PATH: {error}")))?;

    trace!("Running {} -xJf {}", tar.display(), archive.display());
    let output = tokio::process::Command::new(&tar)
        .arg("-xJf")
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .hide_window()
        .output()
        .await
        .map_err(|error| InstallError::io("failed to run tar", error))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("tar failed with {}: {}", output.status, stderr.trim());
        return Err(InstallError::Unpacker(format!(
            "tar exited with {}",
            output.status
        )));
    }

    debug!("tar.xz extraction complete to {}", dest.display());
    Ok(())
}

/// Depth-first search for a regular file named like the launcher binary.
fn find_executable(dir: &Path) -> Result<Option<PathBuf>, InstallError> {
    let entries = std::fs::read_dir(dir).map_err(|error| {
        InstallError::io_with_path("failed to read extraction directory", dir, &error)
    })?;

    for entry in entries {
        let entry = entry
            .map_err(|error| InstallError::io("failed to read extraction directory entry", error))?;
        let file_type = entry
            .file_type()
            .map_err(|error| InstallError::io("failed to read extracted file type", error))?;
        let path = entry.path();

        if file_type.is_dir() {
            if let Some(found) = find_executable(&path)? {
                return Ok(Some(found));
            }
        } else if file_type.is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| EXECUTABLE_NAMES.contains(&name))
        {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Where the previous executable is kept: `<target>.backup`.
#[must_use]
pub fn backup_path(target: &Path) -> PathBuf {
    with_suffix(target, ".backup")
}

/// Where the new executable waits before the swap: `<target>.new`.
#[must_use]
pub fn staging_path(target: &Path) -> PathBuf {
    with_suffix(target, ".new")
}

/// Path of the running executable, or the working directory if it cannot be
/// resolved.
#[must_use]
pub fn current_executable_path() -> PathBuf {
    match std::env::current_exe() {
        Ok(exe) => {
            // After a swap on Linux, /proc/self/exe still names the old,
            // now unlinked inode.
            let raw = exe.to_string_lossy();
            if let Some(stripped) = raw.strip_suffix(" (deleted)") {
                PathBuf::from(stripped)
            } else {
                exe
            }
        }
        Err(error) => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            warn!(
                "Failed to resolve executable path ({error}), falling back to {}",
                cwd.display()
            );
            cwd
        }
    }
}

#[cfg(unix)]
fn add_execute_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    std::fs::set_permissions(path, permissions)
}

/// File moves used while swapping binaries.
trait SwapFs {
    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> std::io::Result<u64>;
}

struct StdFs;

impl SwapFs for StdFs {
    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        std::fs::rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> std::io::Result<u64> {
        std::fs::copy(from, to)
    }
}

fn remove_staging(staging: &Path) {
    if let Err(error) = std::fs::remove_file(staging)
        && error.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove staging file {}: {error}", staging.display());
    }
}

/// Swap `new_binary` in at `target`, keeping the previous executable at
/// [`backup_path`].
#[must_use]
pub fn replace_binary(new_binary: &Path, target: &Path) -> UpdateResult {
    replace_binary_with(&StdFs, new_binary, target)
}

fn replace_binary_with(fs: &impl SwapFs, new_binary: &Path, target: &Path) -> UpdateResult {
    debug!(
        "Replacing {} with {}",
        target.display(),
        new_binary.display()
    );
    let mut result = UpdateResult {
        installed_path: Some(target.to_path_buf()),
        ..UpdateResult::default()
    };
    let backup = backup_path(target);
    let staging = staging_path(target);

    // Copied rather than moved: the extraction directory may be on another
    // filesystem.
    trace!("Copying new binary to staging path {}", staging.display());
    if let Err(error) = fs.copy(new_binary, &staging) {
        error!("Failed to stage new binary: {error}");
        result.error_message = format!("failed to copy new binary: {error}");
        return result;
    }

    #[cfg(unix)]
    {
        if let Err(error) = add_execute_permissions(&staging) {
            warn!("Failed to mark staged binary executable: {error}");
        }
    }

    if target.exists() {
        trace!("Backing up current executable to {}", backup.display());
        if backup.exists()
            && let Err(error) = std::fs::remove_file(&backup)
        {
            warn!("Failed to remove stale backup {}: {error}", backup.display());
        }

        if let Err(error) = fs.rename(target, &backup) {
            // A running executable is locked on Windows and cannot be moved.
            trace!("Rename failed ({error}), falling back to copy for backup");
            if let Err(error) = fs.copy(target, &backup) {
                error!("Backup copy fallback failed: {error}");
                result.error_message = format!("failed to backup current launcher: {error}");
                remove_staging(&staging);
                return result;
            }
        }
        result.backup_path = Some(backup.clone());
    }

    trace!("Moving staged binary into place");
    if let Err(error) = fs.rename(&staging, target) {
        warn!("Rename staging to target failed ({error}), attempting copy");
        if let Err(error) = fs.copy(&staging, target) {
            error!("Copy from staging to target failed: {error}");
            result.error_message = format!("failed to install new launcher: {error}");

            if result.backup_path.is_some() && backup.exists() {
                warn!("Attempting emergency restore of backup");
                if let Err(error) = fs.rename(&backup, target) {
                    error!("Emergency restore failed: {error}");
                }
            }
            remove_staging(&staging);
            return result;
        }
        remove_staging(&staging);
    }

    debug!("Replacement complete");
    result.success = true;
    result
}

/// Put the backup recorded in `result` back at the installed path.
///
/// Returns `false` without touching anything when there is no backup to
/// restore from.
#[must_use]
pub fn rollback(result: &UpdateResult) -> bool {
    warn!("Initiating rollback");

    let (Some(backup), Some(installed)) = (&result.backup_path, &result.installed_path) else {
        warn!(
            "Rollback aborted: paths not established (backup: {:?}, installed: {:?})",
            result.backup_path, result.installed_path
        );
        return false;
    };

    if !backup.exists() {
        error!("Rollback failed: backup {} does not exist", backup.display());
        return false;
    }

    if installed.exists() {
        trace!("Removing broken installation {}", installed.display());
        if let Err(error) = std::fs::remove_file(installed) {
            error!("Failed to remove broken installation during rollback: {error}");
            return false;
        }
    }

    match std::fs::rename(backup, installed) {
        Ok(()) => {
            info!("Rollback successful");
            true
        }
        Err(error) => {
            error!("Failed to restore backup: {error}");
            false
        }
    }
}
