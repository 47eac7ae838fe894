//! External render engine and media tool wrappers.
//!
//! This crate provides:
//! - Type-safe ffmpeg command building for the direct image+audio encode
//! - Composite (captioned) renderer invocation with a JSON props blob
//! - Audio duration probing via ffprobe (soft failure)
//! - Remote asset download with bounded timeout and partial-file cleanup
//!
//! All subprocesses are spawned with argument vectors; no shell interpolation
//! ever touches user-supplied URLs or paths.

pub mod command;
pub mod composite;
pub mod error;
pub mod fetch;
pub mod probe;

pub use command::{check_ffmpeg, DirectEncode, EncodeRunner};
pub use composite::{check_renderer, CompositeConfig, CompositeProps, CompositeRenderer};
pub use error::{MediaError, MediaResult};
pub use fetch::{download_to_file, extension_for_url};
pub use probe::probe_duration_secs;
