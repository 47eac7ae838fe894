//! Shared data models for the slidecast backend.
//!
//! This crate provides:
//! - Caption input normalization (flexible inbound field shapes)
//! - Caption timing computation (seconds -> frames, auto-segmentation)
//! - Deterministic motion curves for the composite render engine

pub mod caption;
pub mod timing;

// Re-export common types
pub use caption::{Caption, CaptionError, CaptionResult, RawCaption};
pub use timing::{
    auto_segments, entrance_scale, highlight_position, normalize, seconds_to_frame, split_text,
    spring, sweep_progress, SpringConfig, TimedSegment, DEFAULT_FPS,
};
