use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Version string that names the rolling unstable channel instead of a
/// numbered release.
pub const UNSTABLE_CHANNEL: &str = "latest";

/// A launcher release version.
///
/// Either a numbered release (`1.2.3`, `1.2.3-a.1-20260201010251.fe4660334ed0`)
/// or the unstable channel marker, which compares newer than every numbered
/// release.
///
/// The suffix after the first `-` is kept as written. Snapshot builds embed
/// commit hashes there that may be all digits with a leading zero, which
/// strict semver rejects.
#[derive(Debug, Clone)]
pub struct Version {
    release: Option<Numbered>,
}

#[derive(Debug, Clone)]
struct Numbered {
    core: semver::Version,
    suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Version string is empty")]
    Empty,
    #[error("Expected X[.Y[.Z]][-suffix] format, got: {input}")]
    InvalidFormat { input: String },
}

impl Version {
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            release: Some(Numbered {
                core: semver::Version::new(major, minor, patch),
                suffix: String::new(),
            }),
        }
    }

    #[must_use]
    pub fn unstable() -> Self {
        Self { release: None }
    }

    #[must_use]
    pub fn is_unstable(&self) -> bool {
        self.release.is_none()
    }

    /// The `major.minor.patch` core, or `None` for the unstable channel.
    #[must_use]
    pub fn release(&self) -> Option<&semver::Version> {
        self.release.as_ref().map(|numbered| &numbered.core)
    }

    /// The build or prerelease suffix without its leading `-`. Empty for
    /// plain releases and the unstable channel.
    #[must_use]
    pub fn suffix(&self) -> &str {
        self.release
            .as_ref()
            .map_or("", |numbered| numbered.suffix.as_str())
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionParseError::Empty);
        }
        if s.eq_ignore_ascii_case(UNSTABLE_CHANNEL) {
            return Ok(Self::unstable());
        }

        let stripped = s
            .strip_prefix('v')
            .or_else(|| s.strip_prefix('V'))
            .unwrap_or(s);

        parse_release(stripped)
            .map(|release| Self {
                release: Some(release),
            })
            .ok_or_else(|| VersionParseError::InvalidFormat {
                input: s.to_string(),
            })
    }
}

fn parse_release(version: &str) -> Option<Numbered> {
    // Build metadata never takes part in ordering.
    let version = version.split_once('+').map_or(version, |(head, _)| head);
    let (core, suffix) = version.split_once('-').unwrap_or((version, ""));

    // Tags like "1.2" or "1" are padded out to three components.
    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next().map(str::parse::<u64>).transpose().ok()?;
    let patch = parts.next().map(str::parse::<u64>).transpose().ok()?;
    if parts.next().is_some() {
        return None;
    }

    let core = semver::Version::new(major, minor.unwrap_or(0), patch.unwrap_or(0));

    if version.contains('-') && !is_valid_suffix(suffix) {
        return None;
    }

    Some(Numbered {
        core,
        suffix: suffix.to_string(),
    })
}

/// Dot-separated, non-empty identifiers of ASCII alphanumerics and hyphens.
fn is_valid_suffix(suffix: &str) -> bool {
    suffix.split('.').all(|ident| {
        !ident.is_empty()
            && ident
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-')
    })
}

fn is_numeric(ident: &str) -> bool {
    ident.bytes().all(|byte| byte.is_ascii_digit())
}

fn compare_suffix(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) if suffixes_align(a, b) => a
            .split('.')
            .zip(b.split('.'))
            .map(|(left, right)| compare_identifier(left, right))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal),
        (false, false) => a.cmp(b),
    }
}

/// Numeric identifiers compare by value, of any length and with leading
/// zeros; others compare as ASCII.
fn compare_identifier(left: &str, right: &str) -> Ordering {
    if is_numeric(left) && is_numeric(right) {
        let left = left.trim_start_matches('0');
        let right = right.trim_start_matches('0');
        left.len().cmp(&right.len()).then_with(|| left.cmp(right))
    } else {
        left.cmp(right)
    }
}

/// Two suffixes align when they have the same number of dot-separated
/// identifiers and each pair is either both numeric or both alphanumeric.
fn suffixes_align(a: &str, b: &str) -> bool {
    let a: Vec<&str> = a.split('.').collect();
    let b: Vec<&str> = b.split('.').collect();

    a.len() == b.len()
        && a
            .iter()
            .zip(&b)
            .all(|(left, right)| is_numeric(left) == is_numeric(right))
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.release, &other.release) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => (a.core.major, a.core.minor, a.core.patch)
                .cmp(&(b.core.major, b.core.minor, b.core.patch))
                .then_with(|| compare_suffix(&a.suffix, &b.suffix)),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.release {
            Some(Numbered { core, suffix }) if suffix.is_empty() => write!(f, "{core}"),
            Some(Numbered { core, suffix }) => write!(f, "{core}-{suffix}"),
            None => f.write_str(UNSTABLE_CHANNEL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(input: &str) -> Version {
        input.parse().expect("version should parse")
    }

    #[test]
    fn parses_plain_tag_with_v_prefix() {
        let version = v("v1.2.3");
        assert_eq!(version, Version::new(1, 2, 3));
        assert_eq!(version.to_string(), "1.2.3");
    }

    #[test]
    fn parses_snapshot_suffix() {
        let version = v("1.2.3-a.1-20260201010251.fe4660334ed0");
        assert_eq!(version.to_string(), "1.2.3-a.1-20260201010251.fe4660334ed0");
        let release = version.release().expect("numbered release");
        assert_eq!((release.major, release.minor, release.patch), (1, 2, 3));
    }

    #[test]
    fn pads_short_versions() {
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("v7"), Version::new(7, 0, 0));
        assert_eq!(v("1.2-rc.1").to_string(), "1.2.0-rc.1");
    }

    #[test]
    fn parses_unstable_channel_marker() {
        assert!(v("latest").is_unstable());
        assert!(v("LATEST").is_unstable());
        assert_eq!(v("latest").to_string(), "latest");
    }

    #[test]
    fn rejects_unparseable_input() {
        assert_eq!("".parse::<Version>(), Err(VersionParseError::Empty));
        assert!(matches!(
            "launcher".parse::<Version>(),
            Err(VersionParseError::InvalidFormat { .. })
        ));
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("1..3".parse::<Version>().is_err());
    }

    #[test]
    fn unstable_channel_is_newer_than_any_release() {
        assert!(Version::unstable() > v("999.999.999"));
        assert!(v("0.0.1") < Version::unstable());
        assert_eq!(Version::unstable(), v("latest"));
    }

    #[test]
    fn numeric_components_compare_in_order() {
        assert!(v("1.0.1") > v("1.0.0"));
        assert!(v("1.1.0") > v("1.0.9"));
        assert!(v("2.0.0") > v("1.99.99"));
        assert!(v("1.10.0") > v("1.9.0"));
        assert_eq!(v("v1.2.3"), v("1.2.3"));
    }

    #[test]
    fn release_outranks_its_own_suffixed_builds() {
        assert!(v("1.2.3") > v("1.2.3-a.1-20260201010251.fe4660334ed0"));
        assert!(v("1.2.4-a.1") > v("1.2.3"));
    }

    #[test]
    fn aligned_suffixes_compare_structurally() {
        assert!(v("1.0.0-beta.10") > v("1.0.0-beta.2"));
        assert!(
            v("1.2.3-a.1-20260201010251.fe4660334ed0")
                < v("1.2.3-a.1-20260301000000.0123456789ab")
        );
    }

    #[test]
    fn misaligned_suffixes_fall_back_to_string_comparison() {
        // "rc.1" has two identifiers, "rc1" has one.
        assert!(v("1.0.0-rc1") > v("1.0.0-rc.1"));
        assert!(v("1.0.0-b") > v("1.0.0-a.1"));
    }

    #[test]
    fn build_metadata_does_not_affect_ordering() {
        assert_eq!(v("1.0.0+abc"), v("1.0.0+def"));
        assert_eq!(v("1.0.0-rc.1+abc").to_string(), "1.0.0-rc.1");
    }

    #[test]
    fn suffix_identifiers_with_leading_zeros_are_kept() {
        let snapshot = v("1.2.3-a.1-20260201010251.012345678901");
        assert_eq!(snapshot.to_string(), "1.2.3-a.1-20260201010251.012345678901");
        assert_eq!(snapshot.suffix(), "a.1-20260201010251.012345678901");
        assert_eq!(v("1.0.0-rc.01").to_string(), "1.0.0-rc.01");
    }

    #[test]
    fn numeric_identifiers_compare_by_value() {
        assert_eq!(v("1.0.0-rc.01"), v("1.0.0-rc.1"));
        assert!(v("1.0.0-rc.010") > v("1.0.0-rc.9"));
        assert!(
            v("1.2.3-a.1-20260201010251.012345678901")
                < v("1.2.3-a.1-20260201010251.fe4660334ed0")
        );
    }

    #[test]
    fn malformed_suffix_is_rejected() {
        assert!("1.2.3-".parse::<Version>().is_err());
        assert!("1.2.3-rc..1".parse::<Version>().is_err());
        assert!("1.2.3-rc_1".parse::<Version>().is_err());
    }
}
