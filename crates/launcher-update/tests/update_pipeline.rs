use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use launcher_update::{
    Asset, AssetDownloader, DownloadError, Platform, Release, ReleaseHost, ReleaseHostError,
    UpdateDiscovery, UpdateInstaller, UpdateState, Version, backup_path, rollback,
};
use tempfile::tempdir;

struct StaticHost {
    releases: Vec<Release>,
}

#[async_trait]
impl ReleaseHost for StaticHost {
    async fn list_releases(
        &self,
        _owner: &str,
        _repo: &str,
        per_page: usize,
    ) -> Result<Vec<Release>, ReleaseHostError> {
        Ok(self.releases.iter().take(per_page).cloned().collect())
    }

    async fn release_by_tag(
        &self,
        _owner: &str,
        _repo: &str,
        tag: &str,
    ) -> Result<Option<Release>, ReleaseHostError> {
        Ok(self.releases.iter().find(|r| r.tag_name == tag).cloned())
    }
}

#[derive(Default)]
struct MemoryDownloader {
    files: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl AssetDownloader for MemoryDownloader {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, DownloadError> {
        let Some(body) = self.files.get(url) else {
            return Err(DownloadError::Status(reqwest::StatusCode::NOT_FOUND));
        };
        std::fs::write(dest, body).map_err(|error| DownloadError::io("write", dest, error))?;
        on_progress(body.len() as u64);
        Ok(body.len() as u64)
    }
}

fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    for (name, content) in entries {
        writer
            .start_file(*name, options)
            .expect("zip entry should be started");
        writer.write_all(content.as_bytes()).expect("zip entry should be written");
    }
    writer
        .finish()
        .expect("zip should be finalized")
        .into_inner()
}

fn windows_release(tag: &str, prerelease: bool) -> Release {
    let version = tag.trim_start_matches('v');
    let name = format!("launcher-{version}-x86_64-windows.zip");
    Release {
        tag_name: tag.to_string(),
        prerelease,
        html_url: format!("https://github.com/iw4x/launcher/releases/tag/{tag}"),
        body: Some(format!("Release {tag}")),
        assets: vec![
            Asset {
                name: format!("{name}.sha256"),
                browser_download_url: format!("https://dl.example.com/{name}.sha256"),
                size: 64,
            },
            Asset {
                browser_download_url: format!("https://dl.example.com/{name}"),
                name,
                size: 0,
            },
        ],
        ..Release::default()
    }
}

struct Workspace {
    _root: tempfile::TempDir,
    downloads: PathBuf,
    target: PathBuf,
}

fn workspace() -> Workspace {
    let root = tempdir().expect("create temp dir");
    let downloads = root.path().join("downloads");
    let install = root.path().join("IW4x");
    std::fs::create_dir_all(&install).expect("create install dir");
    let target = install.join("launcher.exe");
    std::fs::write(&target, b"launcher 1.0.0").expect("write current launcher");
    Workspace {
        _root: root,
        downloads,
        target,
    }
}

#[tokio::test]
async fn discovered_update_installs_and_rolls_back() {
    let ws = workspace();
    let discovery = UpdateDiscovery::new(StaticHost {
        releases: vec![
            windows_release("v1.2.0-rc.1", true),
            windows_release("v1.1.0", false),
            windows_release("v1.0.0", false),
        ],
    })
    .with_platform(Platform::WindowsX64);

    let info = discovery
        .check_for_update("iw4x", "launcher", &Version::new(1, 0, 0))
        .await
        .expect("newer stable release should be offered");
    assert_eq!(info.tag_name, "v1.1.0");
    assert_eq!(info.asset_name, "launcher-1.1.0-x86_64-windows.zip");

    let mut files = HashMap::new();
    files.insert(
        info.asset_url.clone(),
        zip_archive(&[
            ("README.md", "notes"),
            ("bin/launcher.exe", "launcher 1.1.0"),
        ]),
    );
    let downloader = MemoryDownloader { files };

    let mut installer = UpdateInstaller::new(downloader);
    installer.set_download_directory(&ws.downloads);
    installer.set_target(&ws.target);

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    installer.set_progress_callback(Arc::new(move |state: UpdateState, _fraction: f64, _message: &str| {
        sink.lock().expect("lock should not be poisoned").push(state);
    }));

    let result = installer.install(&info).await;
    assert!(result.success, "install failed: {}", result.error_message);
    assert_eq!(
        std::fs::read(&ws.target).expect("read installed launcher"),
        b"launcher 1.1.0"
    );
    assert_eq!(result.backup_path, Some(backup_path(&ws.target)));
    assert_eq!(
        states.lock().expect("lock should not be poisoned").last(),
        Some(&UpdateState::Done)
    );
    let leftovers: Vec<_> = std::fs::read_dir(&ws.downloads)
        .expect("read download dir")
        .collect();
    assert!(leftovers.is_empty(), "temporary files left: {leftovers:?}");

    assert!(rollback(&result));
    assert_eq!(
        std::fs::read(&ws.target).expect("read restored launcher"),
        b"launcher 1.0.0"
    );
    assert!(!backup_path(&ws.target).exists());
}

#[tokio::test]
async fn up_to_date_launcher_is_not_offered_an_update() {
    let discovery = UpdateDiscovery::new(StaticHost {
        releases: vec![windows_release("v1.1.0", false)],
    })
    .with_platform(Platform::WindowsX64);

    assert!(
        discovery
            .check_for_update("iw4x", "launcher", &Version::new(1, 1, 0))
            .await
            .is_none()
    );
    assert!(
        discovery
            .check_for_update("iw4x", "launcher", &Version::unstable())
            .await
            .is_none()
    );
}

#[tokio::test]
async fn failed_install_leaves_working_launcher_in_place() {
    let ws = workspace();
    let discovery = UpdateDiscovery::new(StaticHost {
        releases: vec![windows_release("v2.0.0", false)],
    })
    .with_platform(Platform::WindowsX64);
    let info = discovery
        .fetch_by_tag("iw4x", "launcher", "v2.0.0")
        .await
        .expect("tagged release should resolve");

    let mut files = HashMap::new();
    files.insert(
        info.asset_url.clone(),
        zip_archive(&[("tools/launcher-helper.exe", "not the launcher")]),
    );
    let mut installer = UpdateInstaller::new(MemoryDownloader { files });
    installer.set_download_directory(&ws.downloads);
    installer.set_target(&ws.target);

    let result = installer.install(&info).await;

    assert!(!result.success);
    assert_eq!(result.error_message, "launcher binary not found in archive");
    assert!(result.backup_path.is_none());
    assert_eq!(
        std::fs::read(&ws.target).expect("read current launcher"),
        b"launcher 1.0.0"
    );
    assert!(
        std::fs::read_dir(&ws.downloads)
            .expect("read download dir")
            .next()
            .is_none()
    );
}

#[tokio::test]
async fn missing_download_is_reported_as_failure() {
    let ws = workspace();
    let discovery = UpdateDiscovery::new(StaticHost {
        releases: vec![windows_release("v2.0.0", false)],
    })
    .with_platform(Platform::WindowsX64);
    let info = discovery
        .fetch_latest("iw4x", "launcher")
        .await
        .expect("latest release should resolve");

    let downloader = MemoryDownloader::default();
    let mut installer = UpdateInstaller::new(downloader);
    installer.set_download_directory(&ws.downloads);
    installer.set_target(&ws.target);

    let result = installer.install(&info).await;

    assert!(!result.success);
    assert!(result.error_message.contains("404"));
    assert_eq!(
        std::fs::read(&ws.target).expect("read current launcher"),
        b"launcher 1.0.0"
    );
}
