//! Asset resolution.
//!
//! Turns a request's mixed inputs (spooled uploads, remote URLs) into local
//! file paths, downloading remote assets into the working directory. Every
//! file this module creates is recorded as a `TempAsset` owned by the
//! request; a failed resolution removes everything it created before the
//! error propagates, so a rejected request leaves zero temp files behind.

use std::path::PathBuf;

use chrono::Utc;
use uuid::Uuid;

use slidecast_media::{download_to_file, extension_for_url, MediaError};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::extract::ConvertRequest;
use crate::janitor::TempAsset;

/// Resolved local paths for a request's inputs.
#[derive(Debug)]
pub struct ResolvedAssets {
    pub image: PathBuf,
    pub audio: PathBuf,
    /// Files this resolution created; owned by the request
    pub temp_assets: Vec<TempAsset>,
}

/// Resolve the request's image and audio to local paths.
pub async fn resolve(
    client: &reqwest::Client,
    config: &ApiConfig,
    request: &ConvertRequest,
) -> ApiResult<ResolvedAssets> {
    let mut temp_assets = Vec::new();

    let image = resolve_one(
        client,
        config,
        &mut temp_assets,
        "image",
        ".jpg",
        request.image_upload.as_ref(),
        request.image_url.as_deref(),
    )
    .await;
    let image = match image {
        Ok(path) => path,
        Err(e) => return cleanup_and_fail(config, temp_assets, e).await,
    };

    let audio = resolve_one(
        client,
        config,
        &mut temp_assets,
        "audio",
        ".mp3",
        request.audio_upload.as_ref(),
        request.audio_url.as_deref(),
    )
    .await;
    let audio = match audio {
        Ok(path) => path,
        Err(e) => return cleanup_and_fail(config, temp_assets, e).await,
    };

    Ok(ResolvedAssets {
        image,
        audio,
        temp_assets,
    })
}

/// Resolve one asset: an upload's spooled path wins, then a URL download.
async fn resolve_one(
    client: &reqwest::Client,
    config: &ApiConfig,
    temp_assets: &mut Vec<TempAsset>,
    kind: &'static str,
    default_ext: &str,
    upload: Option<&PathBuf>,
    url: Option<&str>,
) -> ApiResult<PathBuf> {
    if let Some(path) = upload {
        // Spooled by the upload layer, which also owns its reclamation.
        return Ok(path.clone());
    }

    let Some(url) = url else {
        return Err(ApiError::MissingAsset(kind));
    };

    let ext = extension_for_url(url, default_ext);
    let dest = config
        .output_dir
        .join(format!("{}_{}{}", kind, unique_token(), ext));

    download_to_file(client, url, &dest, config.download_timeout)
        .await
        .map_err(|e| match e {
            MediaError::Timeout(secs) => ApiError::DownloadTimeout(secs),
            other => ApiError::Download(other.to_string()),
        })?;

    temp_assets.push(TempAsset::new(&dest));
    Ok(dest)
}

/// Remove any temp files created before the failure, then propagate it.
async fn cleanup_and_fail(
    config: &ApiConfig,
    temp_assets: Vec<TempAsset>,
    error: ApiError,
) -> ApiResult<ResolvedAssets> {
    crate::janitor::Janitor::new(config)
        .remove_temp_assets(&temp_assets)
        .await;
    Err(error)
}

/// A collision-proof token for file names shared by concurrent requests:
/// a millisecond timestamp plus a short random suffix.
pub(crate) fn unique_token() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> ApiConfig {
        ApiConfig {
            output_dir: dir.path().to_path_buf(),
            ..ApiConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_audio_is_rejected_with_zero_temp_files() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let client = reqwest::Client::new();

        // Image resolves from an upload (no temp created); audio has neither
        // an upload nor a URL.
        let spooled = dir.path().join("upload_image_x.jpg");
        tokio::fs::write(&spooled, b"img").await.unwrap();
        let request = ConvertRequest {
            image_upload: Some(spooled),
            ..ConvertRequest::default()
        };

        let err = resolve(&client, &config, &request).await.unwrap_err();
        assert!(matches!(err, ApiError::MissingAsset("audio")));

        // Only the caller-owned upload remains in the working directory.
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name());
        }
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_both_assets_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let client = reqwest::Client::new();

        let err = resolve(&client, &config, &ConvertRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingAsset("image")));
    }

    #[tokio::test]
    async fn test_failed_download_cleans_prior_temps() {
        let dir = TempDir::new().unwrap();
        let config = ApiConfig {
            download_timeout: std::time::Duration::from_secs(2),
            ..test_config(&dir)
        };
        let client = reqwest::Client::new();

        // Image from upload, audio from an unreachable URL.
        let spooled = dir.path().join("upload_image_y.jpg");
        tokio::fs::write(&spooled, b"img").await.unwrap();
        let request = ConvertRequest {
            image_upload: Some(spooled.clone()),
            audio_url: Some("http://127.0.0.1:9/a.mp3".to_string()),
            ..ConvertRequest::default()
        };

        let err = resolve(&client, &config, &request).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Download(_) | ApiError::DownloadTimeout(_)
        ));

        // No audio temp file left behind; the upload is untouched.
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            assert_eq!(entry.path(), spooled);
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unique_tokens_differ() {
        assert_ne!(unique_token(), unique_token());
    }
}
