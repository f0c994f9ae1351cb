//! Source video download.
//!
//! Inputs are fetched over HTTP(S) and streamed straight to disk, or copied
//! when given a `file://` URL. Any failure here is reported as a download
//! failure, never retried.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Default per-request idle timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches job inputs into local files.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_TIMEOUT)
    }
}

impl Downloader {
    /// Create a downloader whose connect and per-chunk waits are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("vedit/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, timeout }
    }

    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// `dest` may be partially written on failure; the caller owns cleanup.
    pub async fn fetch_to_file(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        let parsed = Url::parse(url)
            .map_err(|e| MediaError::download_failed(format!("invalid URL '{}': {}", url, e)))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let bytes = match parsed.scheme() {
            "file" => self.copy_local(&parsed, dest).await?,
            "http" | "https" => self.stream_http(parsed, dest).await?,
            other => {
                return Err(MediaError::download_failed(format!(
                    "unsupported URL scheme '{}'",
                    other
                )))
            }
        };

        info!("Downloaded {} ({} bytes) to {}", url, bytes, dest.display());
        Ok(bytes)
    }

    async fn copy_local(&self, url: &Url, dest: &Path) -> MediaResult<u64> {
        let source = url
            .to_file_path()
            .map_err(|_| MediaError::download_failed(format!("invalid file URL '{}'", url)))?;

        fs::copy(&source, dest).await.map_err(|e| {
            MediaError::download_failed(format!("failed to read {}: {}", source.display(), e))
        })
    }

    async fn stream_http(&self, url: Url, dest: &Path) -> MediaResult<u64> {
        debug!("GET {}", url);

        let send = self.client.get(url.clone()).send();
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| self.timed_out(&url))?
            .map_err(|e| MediaError::download_failed(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        let mut file = fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        loop {
            let next = tokio::time::timeout(self.timeout, stream.next())
                .await
                .map_err(|_| self.timed_out(&url))?;
            let Some(chunk) = next else { break };
            let data = chunk.map_err(|e| {
                MediaError::download_failed(format!("reading body of {} failed: {}", url, e))
            })?;
            file.write_all(&data).await?;
            written += data.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }

    fn timed_out(&self, url: &Url) -> MediaError {
        MediaError::download_failed(format!(
            "{} stalled for more than {} seconds",
            url,
            self.timeout.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_download_streams_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 2048]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("in.mp4");
        let bytes = Downloader::default()
            .fetch_to_file(&format!("{}/video.mp4", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, 2048);
        assert_eq!(fs::read(&dest).await.unwrap().len(), 2048);
    }

    #[tokio::test]
    async fn test_http_error_status_is_download_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = Downloader::default()
            .fetch_to_file(&format!("{}/missing.mp4", server.uri()), &dir.path().join("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::DownloadFailed { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = Downloader::new(Duration::from_millis(200))
            .fetch_to_file(&format!("{}/slow.mp4", server.uri()), &dir.path().join("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::DownloadFailed { .. }));
    }

    #[tokio::test]
    async fn test_file_url_is_copied() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mp4");
        fs::write(&source, b"local video").await.unwrap();
        let url = Url::from_file_path(&source).unwrap();

        let dest = dir.path().join("copy.mp4");
        let bytes = Downloader::default()
            .fetch_to_file(url.as_str(), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, 11);
        assert_eq!(fs::read_to_string(&dest).await.unwrap(), "local video");
    }

    #[tokio::test]
    async fn test_missing_local_file_is_download_failure() {
        let dir = TempDir::new().unwrap();
        let err = Downloader::default()
            .fetch_to_file("file:///definitely/not/here.mp4", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let dir = TempDir::new().unwrap();
        let err = Downloader::default()
            .fetch_to_file("ftp://example.com/a.mp4", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported URL scheme"));
    }
}
