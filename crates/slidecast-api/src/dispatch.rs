//! Render dispatch.
//!
//! Selects the render engine for a job, builds its invocation, runs it as an
//! awaited subprocess, and classifies the outcome. Composited renders are
//! serialized through a single-permit gate to bound peak memory; direct
//! encodes are cheap and run uncapped.

use std::path::PathBuf;

use tracing::{debug, error, info};

use slidecast_media::{
    CompositeProps, CompositeRenderer, DirectEncode, EncodeRunner, MediaError,
};
use slidecast_models::TimedSegment;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Render engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Loop the still image under the audio, no text overlay
    Direct,
    /// Animated caption overlay atop the image+audio
    Composited,
}

/// Per-request dispatch phase, traced at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Preparing,
    Dispatching,
    AwaitingProcess,
    Succeeded,
    Failed,
}

/// A validated render job, consumed once by `dispatch`.
#[derive(Debug)]
pub struct RenderJob {
    pub image: PathBuf,
    pub audio: PathBuf,
    pub engine: Engine,
    /// Normalized caption segments (composited mode only)
    pub segments: Vec<TimedSegment>,
    /// Maximum frame count, derived from the probed audio duration
    pub frame_bound: Option<u32>,
    pub output: PathBuf,
}

/// Pick the engine: composited whenever there are caption segments to render.
pub fn select_engine(segments: &[TimedSegment]) -> Engine {
    if segments.is_empty() {
        Engine::Direct
    } else {
        Engine::Composited
    }
}

/// Frame count covering a probed duration at the configured rate.
///
/// Rounded up so the final partial frame is still rendered; `None` when the
/// probe was unavailable, leaving the bound to the engine's own inference.
pub fn frame_bound(duration_secs: Option<f64>, fps: u32) -> Option<u32> {
    duration_secs
        .filter(|d| *d > 0.0)
        .map(|d| (d * fps as f64).ceil() as u32)
}

/// Run the job to completion, producing the output file at `job.output`.
pub async fn dispatch(state: &AppState, job: &RenderJob) -> ApiResult<()> {
    trace_phase(job, Phase::Preparing);

    let result = match job.engine {
        Engine::Direct => dispatch_direct(state, job).await,
        Engine::Composited => dispatch_composited(state, job).await,
    };

    match &result {
        Ok(()) => {
            trace_phase(job, Phase::Succeeded);
            info!("Render succeeded: {}", job.output.display());
        }
        Err(e) => {
            trace_phase(job, Phase::Failed);
            error!("Render failed: {}", e);
        }
    }
    result
}

async fn dispatch_direct(state: &AppState, job: &RenderJob) -> ApiResult<()> {
    trace_phase(job, Phase::Dispatching);
    let cmd = DirectEncode::new(&job.image, &job.audio, &job.output);
    let runner = EncodeRunner::new().with_timeout(state.config.encode_timeout.as_secs());

    trace_phase(job, Phase::AwaitingProcess);
    runner.run(&cmd).await.map_err(map_engine_error)
}

async fn dispatch_composited(state: &AppState, job: &RenderJob) -> ApiResult<()> {
    trace_phase(job, Phase::Dispatching);

    // One composited render in flight per process; waiters queue here.
    let _permit = state
        .render_gate
        .acquire()
        .await
        .map_err(|_| ApiError::internal("render gate closed"))?;

    let props = CompositeProps {
        image: job.image.to_string_lossy().to_string(),
        audio: job.audio.to_string_lossy().to_string(),
        captions: job.segments.clone(),
        fps: state.config.fps,
    };
    let renderer = CompositeRenderer::new(state.config.composite_config());

    trace_phase(job, Phase::AwaitingProcess);
    renderer
        .render(&props, &job.output, job.frame_bound)
        .await
        .map_err(map_engine_error)
}

fn trace_phase(job: &RenderJob, phase: Phase) {
    debug!(engine = ?job.engine, phase = ?phase, output = %job.output.display(), "dispatch phase");
}

/// Classify an engine failure for the caller.
fn map_engine_error(e: MediaError) -> ApiError {
    match e {
        MediaError::EncodeFailed {
            message,
            stderr,
            exit_code,
        }
        | MediaError::RenderFailed {
            message,
            stderr,
            exit_code,
        } => {
            let message = match exit_code {
                Some(code) => format!("{} (exit code {})", message, code),
                None => message,
            };
            ApiError::render(message, stderr)
        }
        MediaError::Timeout(secs) => {
            ApiError::render(format!("render timed out after {} seconds", secs), None)
        }
        MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => {
            ApiError::internal(e.to_string())
        }
        MediaError::RendererNotFound(_) => ApiError::internal(e.to_string()),
        other => ApiError::internal(other.to_string()),
    }
}
