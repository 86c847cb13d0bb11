use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use launcher_platform::AppPaths;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherSettings {
    #[serde(default = "default_owner")]
    pub owner: String,

    #[serde(default = "default_repo")]
    pub repo: String,

    #[serde(default)]
    pub include_prerelease: bool,

    #[serde(default = "default_true")]
    pub verify_size: bool,

    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub restart_after_install: bool,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
}

fn default_owner() -> String {
    "iw4x".to_string()
}

fn default_repo() -> String {
    "launcher".to_string()
}

fn default_true() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            repo: default_repo(),
            include_prerelease: false,
            verify_size: true,
            download_dir: None,
            http_timeout_secs: default_http_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            restart_after_install: true,
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
            github_token: None,
        }
    }
}

impl LauncherSettings {
    pub fn load() -> Self {
        let Ok(paths) = AppPaths::new() else {
            return Self::default();
        };
        Self::load_from(&paths.settings_file())
    }

    /// Missing or malformed files yield the defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    #[cfg(test)]
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
    }

    /// A non-empty `GITHUB_TOKEN` wins over the configured token.
    pub fn apply_token_override(&mut self, env_token: Option<String>) {
        if let Some(token) = env_token.filter(|token| !token.trim().is_empty()) {
            self.github_token = Some(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::LauncherSettings;

    #[test]
    fn defaults_target_the_upstream_repository() {
        let settings = LauncherSettings::default();
        assert_eq!(settings.owner, "iw4x");
        assert_eq!(settings.repo, "launcher");
        assert!(!settings.include_prerelease);
        assert!(settings.verify_size);
        assert!(settings.restart_after_install);
        assert_eq!(settings.http_timeout_secs, 30);
        assert_eq!(settings.connect_timeout_secs, 10);
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);
        assert!(settings.download_dir.is_none());
        assert!(settings.github_token.is_none());
    }

    #[test]
    fn partial_file_fills_missing_fields_with_defaults() {
        let settings: LauncherSettings = serde_json::from_value(json!({
            "include_prerelease": true,
            "download_dir": "/var/tmp/launcher"
        }))
        .expect("partial settings should deserialize");

        assert!(settings.include_prerelease);
        assert_eq!(
            settings.download_dir.as_deref(),
            Some(std::path::Path::new("/var/tmp/launcher"))
        );
        assert_eq!(settings.owner, "iw4x");
        assert!(settings.verify_size);
    }

    #[test]
    fn malformed_or_missing_file_yields_defaults() {
        let temp = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp.path().join("settings.json");

        assert_eq!(LauncherSettings::load_from(&path), LauncherSettings::default());

        std::fs::write(&path, "{ not json").expect("settings file should be written");
        assert_eq!(LauncherSettings::load_from(&path), LauncherSettings::default());
    }

    #[test]
    fn saved_settings_load_back() {
        let temp = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp.path().join("settings.json");
        let settings = LauncherSettings {
            repo: "launcher-nightly".to_string(),
            restart_after_install: false,
            ..LauncherSettings::default()
        };

        settings.save_to(&path).expect("settings should be saved");
        assert_eq!(LauncherSettings::load_from(&path), settings);
    }

    #[test]
    fn token_is_not_written_when_unset() {
        let content = serde_json::to_string(&LauncherSettings::default())
            .expect("settings should serialize");
        assert!(!content.contains("github_token"));
    }

    #[test]
    fn environment_token_overrides_configured_token() {
        let mut settings = LauncherSettings {
            github_token: Some("from-file".to_string()),
            ..LauncherSettings::default()
        };

        settings.apply_token_override(Some("   ".to_string()));
        assert_eq!(settings.github_token.as_deref(), Some("from-file"));

        settings.apply_token_override(None);
        assert_eq!(settings.github_token.as_deref(), Some("from-file"));

        settings.apply_token_override(Some("from-env".to_string()));
        assert_eq!(settings.github_token.as_deref(), Some("from-env"));
    }
}
