//! Self-update machinery for the IW4x launcher.
//!
//! [`UpdateDiscovery`] finds the newest release with an asset for the
//! running platform, [`UpdateInstaller`] downloads and swaps it in with a
//! backup, and a [`RestartStrategy`] hands over to the new binary.

pub mod discovery;
pub mod download;
pub mod installer;
pub mod platform;
pub mod release;
pub mod restart;
pub mod version;

pub use discovery::{RELEASE_PAGE_SIZE, UpdateDiscovery, UpdateInfo, select_candidate};
pub use download::{AssetDownloader, DownloadError, HttpDownloader};
pub use installer::{
    InstallError, ProgressCallback, UpdateInstaller, UpdateResult, UpdateState, backup_path,
    current_executable_path, replace_binary, rollback, staging_path,
};
pub use platform::{AssetPattern, Platform, find_platform_asset, parse_asset_version};
pub use release::{Asset, GitHubReleaseHost, Release, ReleaseHost, ReleaseHostError};
pub use restart::{PosixExec, RestartStrategy, WindowsTrampoline, default_strategy};
pub use version::{Version, VersionParseError};
