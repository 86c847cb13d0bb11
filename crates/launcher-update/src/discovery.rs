use log::{debug, error, info, trace, warn};

use crate::platform::{Platform, find_platform_asset, parse_asset_version};
use crate::release::{Release, ReleaseHost};
use crate::version::Version;

/// How many of the newest releases are inspected when looking for the latest
/// one. Large enough that a stable release is usually present even when
/// prereleases are skipped.
pub const RELEASE_PAGE_SIZE: usize = 20;

/// A release that can be installed on the current platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub version: Version,
    pub tag_name: String,
    pub release_url: String,
    pub body: String,
    pub prerelease: bool,
    pub asset_url: String,
    pub asset_name: String,
    pub asset_size: u64,
}

impl UpdateInfo {
    /// Whether this value carries everything the installer needs.
    #[must_use]
    pub fn is_installable(&self) -> bool {
        !self.asset_url.is_empty() && !self.asset_name.is_empty()
    }
}

/// Finds installable releases on a [`ReleaseHost`].
///
/// Every lookup returns `None` both when no applicable release exists and
/// when the host could not be queried; host errors are logged.
pub struct UpdateDiscovery<H> {
    host: H,
    platform: Platform,
    include_prerelease: bool,
}

impl<H: ReleaseHost> UpdateDiscovery<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            platform: Platform::current(),
            include_prerelease: false,
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn set_include_prerelease(&mut self, include: bool) {
        trace!("Set include_prerelease: {include}");
        self.include_prerelease = include;
    }

    #[must_use]
    pub fn include_prerelease(&self) -> bool {
        self.include_prerelease
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The latest release if it is strictly newer than `current`.
    pub async fn check_for_update(
        &self,
        owner: &str,
        repo: &str,
        current: &Version,
    ) -> Option<UpdateInfo> {
        info!("Checking for updates in {owner}/{repo}");
        let Some(candidate) = self.fetch_latest(owner, repo).await else {
            debug!("No valid remote releases found during update check");
            return None;
        };

        if candidate.version > *current {
            info!(
                "Update available: {} ({}) is newer than {current}",
                candidate.version, candidate.tag_name
            );
            Some(candidate)
        } else {
            info!(
                "Current version {current} is up to date (remote tag: {})",
                candidate.tag_name
            );
            None
        }
    }

    /// The newest non-draft release allowed by the prerelease policy that
    /// ships an asset for this platform.
    pub async fn fetch_latest(&self, owner: &str, repo: &str) -> Option<UpdateInfo> {
        debug!(
            "Fetching latest release from {owner}/{repo} (include_prerelease: {})",
            self.include_prerelease
        );

        let releases = match self
            .host
            .list_releases(owner, repo, RELEASE_PAGE_SIZE)
            .await
        {
            Ok(releases) => releases,
            Err(error) => {
                warn!("Failed to list releases for {owner}/{repo}: {error}");
                return None;
            }
        };

        if releases.is_empty() {
            warn!("Release host returned no releases for {owner}/{repo}");
            return None;
        }

        let Some(candidate) = select_candidate(&releases, self.include_prerelease) else {
            warn!(
                "No suitable release found in the latest {} releases",
                releases.len()
            );
            return None;
        };

        self.release_to_update_info(candidate)
    }

    /// The release published under `tag`, if it ships an asset for this
    /// platform. Draft and prerelease policy does not apply.
    pub async fn fetch_by_tag(&self, owner: &str, repo: &str, tag: &str) -> Option<UpdateInfo> {
        debug!("Fetching release by tag '{tag}' from {owner}/{repo}");

        match self.host.release_by_tag(owner, repo, tag).await {
            Ok(Some(release)) => self.release_to_update_info(&release),
            Ok(None) => {
                warn!("Release with tag '{tag}' not found");
                None
            }
            Err(error) => {
                warn!("Failed to fetch release '{tag}' from {owner}/{repo}: {error}");
                None
            }
        }
    }

    fn release_to_update_info(&self, release: &Release) -> Option<UpdateInfo> {
        let Some(asset) = find_platform_asset(&release.assets, self.platform) else {
            warn!(
                "No compatible platform asset found in release '{}'",
                release.tag_name
            );
            return None;
        };

        // The asset name carries the full build identifier, so it wins over
        // the tag.
        let version = parse_asset_version(&asset.name).or_else(|| {
            trace!(
                "Falling back to tag '{}' for the version of {}",
                release.tag_name, asset.name
            );
            release.tag_name.parse().ok()
        });
        let Some(version) = version else {
            error!(
                "Failed to parse a version from asset '{}' or tag '{}'",
                asset.name, release.tag_name
            );
            return None;
        };

        debug!("Resolved version {version} from release '{}'", release.tag_name);

        Some(UpdateInfo {
            version,
            tag_name: release.tag_name.clone(),
            release_url: release.html_url.clone(),
            body: release.body.clone().unwrap_or_default(),
            prerelease: release.prerelease,
            asset_url: asset.browser_download_url.clone(),
            asset_name: asset.name.clone(),
            asset_size: asset.size,
        })
    }
}

/// First release, in host order, that is not a draft and is either stable
/// or allowed by the prerelease policy.
#[must_use]
pub fn select_candidate(releases: &[Release], include_prerelease: bool) -> Option<&Release> {
    releases.iter().find(|release| {
        trace!(
            "Evaluating release '{}' (draft: {}, prerelease: {})",
            release.tag_name, release.draft, release.prerelease
        );
        if release.draft {
            trace!("Skipping draft release {}", release.tag_name);
            return false;
        }
        if release.prerelease && !include_prerelease {
            trace!("Skipping prerelease {}", release.tag_name);
            return false;
        }
        true
    })
}
