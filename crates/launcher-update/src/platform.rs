use log::{debug, trace, warn};

use crate::release::Asset;
use crate::version::Version;

/// Every release asset for the product starts with this prefix.
pub const ASSET_PREFIX: &str = "launcher-";

/// Platform markers embedded in asset names after the version, in the order
/// they are tried when extracting a version from an asset name.
const PLATFORM_SUFFIXES: [&str; 2] = ["-x86_64-windows", "-x86_64-linux-glibc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    WindowsX64,
    LinuxX64,
    Unknown,
}

/// Naming convention an asset for a given platform follows:
/// `launcher-<version>-<marker><extension>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetPattern {
    pub marker: &'static str,
    pub extension: &'static str,
}

impl Platform {
    #[must_use]
    pub fn current() -> Self {
        if cfg!(target_os = "windows") && cfg!(target_arch = "x86_64") {
            Self::WindowsX64
        } else if cfg!(target_os = "linux") && cfg!(target_arch = "x86_64") {
            Self::LinuxX64
        } else {
            Self::Unknown
        }
    }

    /// The asset naming pattern for this platform, or `None` when no build is
    /// published for it.
    #[must_use]
    pub fn asset_pattern(self) -> Option<AssetPattern> {
        match self {
            Self::WindowsX64 => Some(AssetPattern {
                marker: "x86_64-windows",
                extension: ".zip",
            }),
            Self::LinuxX64 => Some(AssetPattern {
                marker: "x86_64-linux-glibc",
                extension: ".tar.xz",
            }),
            Self::Unknown => None,
        }
    }
}

impl AssetPattern {
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        name.starts_with(ASSET_PREFIX) && name.contains(self.marker) && name.ends_with(self.extension)
    }
}

/// First asset, in host order, that follows the platform's naming pattern.
#[must_use]
pub fn find_platform_asset(assets: &[Asset], platform: Platform) -> Option<&Asset> {
    let Some(pattern) = platform.asset_pattern() else {
        warn!("Unsupported platform {platform:?}, no release asset can match");
        return None;
    };

    let found = assets.iter().find(|asset| {
        trace!("Checking asset {}", asset.name);
        pattern.matches(&asset.name)
    });

    match found {
        Some(asset) => debug!("Found matching platform asset: {}", asset.name),
        None => warn!(
            "No asset matched '{ASSET_PREFIX}*{}*{}'",
            pattern.marker, pattern.extension
        ),
    }
    found
}

/// Extract the version embedded in an asset name by stripping the product
/// prefix and the first known platform suffix.
#[must_use]
pub fn parse_asset_version(name: &str) -> Option<Version> {
    let rest = name.strip_prefix(ASSET_PREFIX)?;
    let end = PLATFORM_SUFFIXES
        .iter()
        .find_map(|suffix| rest.find(suffix))?;
    if end == 0 {
        return None;
    }

    let raw = &rest[..end];
    match raw.parse() {
        Ok(version) => Some(version),
        Err(error) => {
            debug!("Asset {name} does not embed a usable version: {error}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> Asset {
        Asset {
            name: name.to_string(),
            browser_download_url: format!("https://example.com/{name}"),
            size: 10,
        }
    }

    #[test]
    fn known_platforms_have_patterns() {
        let windows = Platform::WindowsX64.asset_pattern().expect("windows pattern");
        assert_eq!(windows.extension, ".zip");
        let linux = Platform::LinuxX64.asset_pattern().expect("linux pattern");
        assert_eq!(linux.marker, "x86_64-linux-glibc");
        assert_eq!(linux.extension, ".tar.xz");
        assert!(Platform::Unknown.asset_pattern().is_none());
    }

    #[test]
    fn pattern_requires_prefix_marker_and_extension() {
        let linux = Platform::LinuxX64.asset_pattern().expect("linux pattern");
        assert!(linux.matches("launcher-1.2.3-x86_64-linux-glibc.tar.xz"));
        assert!(!linux.matches("other-1.2.3-x86_64-linux-glibc.tar.xz"));
        assert!(!linux.matches("launcher-1.2.3-x86_64-windows.zip"));
        assert!(!linux.matches("launcher-1.2.3-x86_64-linux-glibc.tar.xz.sha256"));
    }

    #[test]
    fn first_matching_asset_wins() {
        let assets = vec![
            asset("launcher-1.0.0-x86_64-windows.zip"),
            asset("launcher-1.0.0-x86_64-linux-glibc.tar.xz"),
            asset("launcher-1.0.0-debug-x86_64-linux-glibc.tar.xz"),
        ];

        let found = find_platform_asset(&assets, Platform::LinuxX64).expect("asset should match");
        assert_eq!(found.name, "launcher-1.0.0-x86_64-linux-glibc.tar.xz");
    }

    #[test]
    fn unknown_platform_matches_nothing() {
        let assets = vec![asset("launcher-1.0.0-x86_64-linux-glibc.tar.xz")];
        assert!(find_platform_asset(&assets, Platform::Unknown).is_none());
    }

    #[test]
    fn parses_version_from_asset_name() {
        let version = parse_asset_version("launcher-1.2.3-x86_64-linux-glibc.tar.xz")
            .expect("version should parse");
        assert_eq!(version.to_string(), "1.2.3");

        let snapshot = parse_asset_version(
            "launcher-1.2.3-a.1-20260201010251.fe4660334ed0-x86_64-linux-glibc.tar.xz",
        )
        .expect("snapshot version should parse");
        assert_eq!(snapshot.to_string(), "1.2.3-a.1-20260201010251.fe4660334ed0");

        let windows = parse_asset_version("launcher-2.0.0-x86_64-windows.zip")
            .expect("windows version should parse");
        assert_eq!(windows, Version::new(2, 0, 0));
    }

    #[test]
    fn parses_snapshot_with_all_digit_commit_hash() {
        let snapshot = parse_asset_version(
            "launcher-1.2.3-a.1-20260201010251.012345678901-x86_64-linux-glibc.tar.xz",
        )
        .expect("snapshot version should parse");
        assert_eq!(snapshot.to_string(), "1.2.3-a.1-20260201010251.012345678901");
        assert!(snapshot < Version::new(1, 2, 3));
    }

    #[test]
    fn asset_version_requires_prefix_and_suffix() {
        assert!(parse_asset_version("other-1.2.3-x86_64-windows.zip").is_none());
        assert!(parse_asset_version("launcher-1.2.3.zip").is_none());
        assert!(parse_asset_version("launcher--x86_64-windows.zip").is_none());
        assert!(parse_asset_version("launcher-x86_64-windows.zip").is_none());
        assert!(parse_asset_version("launcher-nightly-x86_64-windows.zip").is_none());
    }
}
