//! Remote asset download.
//!
//! Streams a remote image or audio file to a local path with a bounded
//! timeout. A failed or timed-out download removes its partial file before
//! the error propagates, so callers never inherit half-written assets.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Download a remote asset to `dest`, streaming the body to disk.
///
/// Fails with `DownloadFailed` on a non-http(s) URL or non-success status,
/// and with `Timeout` when the whole transfer exceeds `timeout`.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: impl AsRef<Path>,
    timeout: Duration,
) -> MediaResult<()> {
    let dest = dest.as_ref();

    let parsed = Url::parse(url)
        .map_err(|e| MediaError::download_failed(format!("invalid URL {}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MediaError::download_failed(format!(
            "unsupported URL scheme `{}`",
            parsed.scheme()
        )));
    }

    debug!("Downloading {} to {}", url, dest.display());

    let result = tokio::time::timeout(timeout, stream_to_file(client, parsed, dest)).await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            remove_partial(dest).await;
            Err(e)
        }
        Err(_) => {
            remove_partial(dest).await;
            Err(MediaError::Timeout(timeout.as_secs()))
        }
    }
}

async fn stream_to_file(client: &reqwest::Client, url: Url, dest: &Path) -> MediaResult<()> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| MediaError::download_failed(format!("request to {} failed: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(MediaError::download_failed(format!(
            "{} returned status {}",
            url,
            response.status()
        )));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| MediaError::download_failed(format!("body read from {} failed: {}", url, e)))?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok(())
}

/// Remove a partial download, tolerating a file that was never created.
async fn remove_partial(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => debug!("Removed partial download {}", dest.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial download {}: {}", dest.display(), e),
    }
}

/// Infer a file extension (with leading dot) from a URL's path component.
///
/// Falls back to `default_ext` (e.g. `.jpg`, `.mp3`) when the path carries
/// no usable extension.
pub fn extension_for_url(url: &str, default_ext: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e))
        })
        .unwrap_or_else(|| default_ext.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_url() {
        assert_eq!(extension_for_url("https://cdn.example.com/a/pic.png", ".jpg"), ".png");
        assert_eq!(extension_for_url("https://example.com/track.mp3?sig=abc", ".mp3"), ".mp3");
        assert_eq!(extension_for_url("https://example.com/asset", ".jpg"), ".jpg");
        assert_eq!(extension_for_url("https://example.com/", ".mp3"), ".mp3");
        assert_eq!(extension_for_url("not a url", ".jpg"), ".jpg");
    }

    #[tokio::test]
    async fn test_rejects_non_http_scheme() {
        let client = reqwest::Client::new();
        let err = download_to_file(
            &client,
            "file:///etc/passwd",
            "/tmp/never-written",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { .. }));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("asset.jpg");
        let client = reqwest::Client::new();

        // Connection refused on a closed local port.
        let result = download_to_file(
            &client,
            "http://127.0.0.1:9/asset.jpg",
            &dest,
            Duration::from_secs(5),
        )
        .await;

        assert!(result.is_err());
        assert!(!dest.exists());
    }
}
