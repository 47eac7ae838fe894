//! Caption timing computation.
//!
//! Maps validated captions onto the composite engine's frame model, auto-splits
//! fallback text across the audio duration, and provides the deterministic
//! motion curves the engine samples per frame. Everything here is a pure
//! function of its inputs; identical inputs always produce identical timing.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::caption::{Caption, CaptionResult, RawCaption};

/// Frame rate used when the request does not override it.
pub const DEFAULT_FPS: u32 = 30;

/// A caption segment mapped to a frame window.
///
/// Serialized in camelCase because it is passed verbatim to the composite
/// renderer as part of its input props.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedSegment {
    pub start_frame: u32,
    pub end_frame: u32,
    pub text: String,
}

/// Convert seconds to a frame index by rounding. Negative values clamp to 0.
pub fn seconds_to_frame(seconds: f64, fps: u32) -> u32 {
    let frame = (seconds * fps as f64).round();
    if frame.is_finite() && frame > 0.0 {
        frame.min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Normalize raw caption input into ordered frame-timed segments.
///
/// Resolution order:
/// 1. Explicit captions present: each entry maps to frames via rounding, with
///    a minimum duration of one frame. Input order is preserved; overlapping
///    or unordered windows pass through untouched.
/// 2. No captions but `fallback_text` given: the text is auto-split on
///    sentence-ending punctuation or commas and `audio_duration_secs` is
///    distributed evenly across the parts.
/// 3. Neither: empty (no captions rendered).
pub fn normalize(
    raw: &[RawCaption],
    fallback_text: Option<&str>,
    audio_duration_secs: f64,
    fps: u32,
) -> CaptionResult<Vec<TimedSegment>> {
    if !raw.is_empty() {
        return raw
            .iter()
            .enumerate()
            .map(|(index, rc)| Caption::from_raw(index, rc).map(|c| timed(&c, fps)))
            .collect();
    }

    let segments = match fallback_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => auto_segments(text, audio_duration_secs)
            .iter()
            .map(|c| timed(c, fps))
            .collect(),
        None => Vec::new(),
    };
    Ok(segments)
}

/// Map a validated caption to its frame window, enforcing a minimum duration
/// of one frame.
fn timed(caption: &Caption, fps: u32) -> TimedSegment {
    let start_frame = seconds_to_frame(caption.start, fps);
    let end_frame = seconds_to_frame(caption.end, fps).max(start_frame + 1);
    TimedSegment {
        start_frame,
        end_frame,
        text: caption.text.clone(),
    }
}

fn split_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Sentence-ending punctuation or a comma, Latin and Arabic forms, followed
    // by whitespace. The punctuation stays attached to the preceding segment.
    RE.get_or_init(|| Regex::new(r"([.!?؟,،])\s+").expect("split pattern"))
}

/// Split free text into caption segments on sentence or comma boundaries.
///
/// Segments are trimmed and empty parts dropped.
pub fn split_text(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut last = 0;
    for cap in split_pattern().captures_iter(text) {
        let whole = cap.get(0).expect("match");
        let punct = cap.get(1).expect("group");
        parts.push(&text[last..punct.end()]);
        last = whole.end();
    }
    parts.push(&text[last..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build evenly distributed caption windows for free text.
///
/// Each segment receives `audio_duration_secs / count` seconds; windows are
/// contiguous and non-overlapping, covering `[0, audio_duration_secs]` in
/// source order.
pub fn auto_segments(text: &str, audio_duration_secs: f64) -> Vec<Caption> {
    let parts = split_text(text);
    if parts.is_empty() {
        return Vec::new();
    }

    let per_segment = audio_duration_secs / parts.len() as f64;
    parts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Caption {
            start: per_segment * i as f64,
            end: per_segment * (i + 1) as f64,
            text,
        })
        .collect()
}

/// Spring parameters for the caption entrance animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringConfig {
    pub damping: f64,
    pub stiffness: f64,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            damping: 10.0,
            stiffness: 120.0,
        }
    }
}

/// Sample the entrance spring at a local frame index.
///
/// Models a damped harmonic oscillator (unit mass) released at 0 and settling
/// at 1, matching the engine's spring primitive. Deterministic in
/// `(frame, fps, config)` alone.
pub fn spring(frame: u32, fps: u32, config: &SpringConfig) -> f64 {
    let t = frame as f64 / fps.max(1) as f64;
    let omega = config.stiffness.max(f64::EPSILON).sqrt();
    let zeta = config.damping / (2.0 * omega);

    if (zeta - 1.0).abs() < 1e-6 {
        // Critically damped
        1.0 - (1.0 + omega * t) * (-omega * t).exp()
    } else if zeta < 1.0 {
        // Underdamped
        let omega_d = omega * (1.0 - zeta * zeta).sqrt();
        let decay = (-zeta * omega * t).exp();
        1.0 - decay * ((omega_d * t).cos() + (zeta * omega / omega_d) * (omega_d * t).sin())
    } else {
        // Overdamped
        let root = omega * (zeta * zeta - 1.0).sqrt();
        let r1 = -zeta * omega + root;
        let r2 = -zeta * omega - root;
        1.0 + (r2 * (r1 * t).exp() - r1 * (r2 * t).exp()) / (r1 - r2)
    }
}

/// Intra-segment progress for the sweep highlight, clamped to `[0, 1]`.
pub fn sweep_progress(frame: u32, duration_frames: u32) -> f64 {
    let progress = frame as f64 / duration_frames.max(1) as f64;
    progress.clamp(0.0, 1.0)
}

/// Horizontal highlight position in percent for a given sweep progress.
///
/// Travels from -30% (off-screen left) to 130% (off-screen right).
pub fn highlight_position(progress: f64) -> f64 {
    -30.0 + progress * 160.0
}

/// Entrance pop scale for a given spring value, interpolating `[0.92, 1.0]`.
pub fn entrance_scale(spring_value: f64) -> f64 {
    0.92 + 0.08 * spring_value.clamp(0.0, 1.0)
}
