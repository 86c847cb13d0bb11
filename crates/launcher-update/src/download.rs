use std::path::Path;

use async_trait::async_trait;
use log::info;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("download failed with status {0}")]
    Status(reqwest::StatusCode),
    #[error("download stream error: {0}")]
    Stream(#[source] reqwest::Error),
    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Transfers a release asset to a local file.
#[async_trait]
pub trait AssetDownloader: Send + Sync {
    /// Write the body at `url` to `dest`, calling `on_progress` with the
    /// running byte count after each chunk. Returns the total bytes written.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, DownloadError>;
}

#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetDownloader for HttpDownloader {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, DownloadError> {
        use futures_util::StreamExt;

        let response = self
            .client
            .get(url)
            .header("User-Agent", "iw4x-launcher")
            .send()
            .await
            .map_err(DownloadError::Request)?;

        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|error| DownloadError::io("failed to create download file", dest, error))?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(DownloadError::Stream)?;
            file.write_all(&chunk)
                .await
                .map_err(|error| DownloadError::io("failed to write download data", dest, error))?;
            downloaded += chunk.len() as u64;
            on_progress(downloaded);
        }

        file.flush()
            .await
            .map_err(|error| DownloadError::io("failed to flush download file", dest, error))?;

        info!("Download complete: {downloaded} bytes");
        Ok(downloaded)
    }
}
