//! HTTP download source.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Maximum number of redirects followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Errors raised while downloading a file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request failed before a response arrived, or mid-body.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server responded with status {0}")]
    Status(u16),

    /// The destination file could not be written.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Destination path.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Fetches a remote file onto the local disk.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Downloads `url` into `destination`, returning the number of bytes written.
    async fn download(&self, url: &str, destination: &Path) -> Result<u64, DownloadError>;
}

/// Streams downloads to disk with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    http: reqwest::Client,
}

impl HttpDownloader {
    /// Creates a downloader that follows up to [`MAX_REDIRECTS`] redirects.
    pub fn new() -> Result<Self, DownloadError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, destination: &Path) -> Result<u64, DownloadError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| DownloadError::io(destination, e))?;

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(destination, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| DownloadError::io(destination, e))?;

        debug!(url, bytes = written, path = %destination.display(), "Download finished");
        Ok(written)
    }
}
