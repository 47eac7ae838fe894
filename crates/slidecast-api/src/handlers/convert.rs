//! Conversion endpoint.
//!
//! Orchestrates one synchronous conversion: admission check, request
//! extraction, asset resolution, caption timing, render dispatch, and
//! delivery. Temp assets are released exactly once when the render reaches a
//! terminal state; the output file is deleted only after it has been read in
//! full for delivery.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header;
use axum::response::Response;
use tracing::info;

use slidecast_media::probe_duration_secs;
use slidecast_models::normalize;

use crate::assets::{self, unique_token, ResolvedAssets};
use crate::dispatch::{dispatch, frame_bound, select_engine, Engine, RenderJob};
use crate::error::{ApiError, ApiResult};
use crate::extract::{extract_convert_request, ConvertRequest};
use crate::state::AppState;

/// Composition length the engine assumes when no duration is known; used as
/// the window for fallback-text segmentation when the probe is unavailable.
const DEFAULT_COMPOSITION_SECS: f64 = 60.0;

/// Convert an image plus audio (and optional captions) into a video.
pub async fn convert(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    // Admission first: above the critical memory threshold the request is
    // rejected before any work is performed.
    if let Err(memory) = state.governor.admit() {
        return Err(ApiError::Capacity {
            used_bytes: memory.used_bytes,
            limit_bytes: memory.limit_bytes,
        });
    }

    let request = extract_convert_request(req, &state.config).await?;
    let resolved = assets::resolve(&state.http, &state.config, &request).await?;

    // Render, then release the request's temp assets unconditionally before
    // the outcome is inspected.
    let outcome = render(&state, &request, &resolved).await;
    state.janitor.remove_temp_assets(&resolved.temp_assets).await;
    let output = outcome?;

    deliver(&state, &output).await
}

/// Build and run the render job, returning the produced output path.
async fn render(
    state: &AppState,
    request: &ConvertRequest,
    resolved: &ResolvedAssets,
) -> ApiResult<PathBuf> {
    let wants_captions = !request.captions.is_empty() || request.caption_text.is_some();

    let (segments, duration) = if wants_captions {
        // The probe is a soft optimization: on failure the fallback window
        // and frame bound simply defer to the engine's own inference.
        let duration = probe_duration_secs(&resolved.audio).await;
        let segments = normalize(
            &request.captions,
            request.caption_text.as_deref(),
            duration.unwrap_or(DEFAULT_COMPOSITION_SECS),
            state.config.fps,
        )?;
        (segments, duration)
    } else {
        (Vec::new(), None)
    };

    let engine = select_engine(&segments);
    let prefix = match engine {
        Engine::Direct => "encode_output",
        Engine::Composited => "composite_output",
    };
    let output = state
        .config
        .output_dir
        .join(format!("{}_{}.mp4", prefix, unique_token()));

    let job = RenderJob {
        image: resolved.image.clone(),
        audio: resolved.audio.clone(),
        engine,
        frame_bound: frame_bound(duration, state.config.fps),
        segments,
        output: output.clone(),
    };

    info!(
        engine = ?job.engine,
        captions = job.segments.len(),
        "Dispatching render"
    );

    if let Err(e) = dispatch(state, &job).await {
        // A failed render may leave a partial output behind.
        state.janitor.remove_output(&output).await;
        return Err(e);
    }

    Ok(output)
}

/// Read the output in full, delete it, and send the bytes as the response.
///
/// Deletion strictly follows the complete read, so the file is never removed
/// before it has been fully captured for delivery.
async fn deliver(state: &AppState, output: &Path) -> ApiResult<Response> {
    let bytes = match tokio::fs::read(output).await {
        Ok(bytes) => bytes,
        Err(e) => {
            state.janitor.remove_output(output).await;
            return Err(ApiError::internal(format!(
                "render output unreadable: {}",
                e
            )));
        }
    };
    state.janitor.remove_output(output).await;

    let filename = output
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output.mp4");

    Response::builder()
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal(format!("failed to build response: {}", e)))
}
