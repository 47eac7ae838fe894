//! FFmpeg command builder and runner for the direct encode path.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Maximum stderr lines retained for diagnostics.
const MAX_STDERR_LINES: usize = 120;

/// Builder for the direct encode: loop a still image under an audio track.
#[derive(Debug, Clone)]
pub struct DirectEncode {
    /// Still image input
    image: PathBuf,
    /// Audio input
    audio: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Video codec
    video_codec: String,
    /// Audio codec
    audio_codec: String,
    /// Pixel format (player compatibility)
    pix_fmt: String,
    /// Encoder speed preset
    preset: String,
    /// Log level
    log_level: String,
}

impl DirectEncode {
    /// Create a new direct encode command.
    pub fn new(
        image: impl AsRef<Path>,
        audio: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Self {
        Self {
            image: image.as_ref().to_path_buf(),
            audio: audio.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            pix_fmt: "yuv420p".to_string(),
            preset: "veryfast".to_string(),
            log_level: "error".to_string(),
        }
    }

    /// Set the video codec.
    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    /// Set the audio codec.
    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = codec.into();
        self
    }

    /// Set the encoder speed preset.
    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    /// Build the command arguments.
    ///
    /// The image is looped for the duration of the audio; `-shortest` stops
    /// the encode at audio end so the engine never renders past the track.
    pub fn build_args(&self) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
            "-loop".to_string(),
            "1".to_string(),
            "-i".to_string(),
            self.image.to_string_lossy().to_string(),
            "-i".to_string(),
            self.audio.to_string_lossy().to_string(),
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-pix_fmt".to_string(),
            self.pix_fmt.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-shortest".to_string(),
            self.output.to_string_lossy().to_string(),
        ]
    }
}

/// Runner for direct encode commands with timeout and diagnostics capture.
#[derive(Debug, Default)]
pub struct EncodeRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl EncodeRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run a direct encode command.
    pub async fn run(&self, cmd: &DirectEncode) -> MediaResult<()> {
        check_ffmpeg()?;

        if !cmd.image.exists() {
            return Err(MediaError::FileNotFound(cmd.image.clone()));
        }
        if !cmd.audio.exists() {
            return Err(MediaError::FileNotFound(cmd.audio.clone()));
        }

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let outcome = run_captured(child, self.timeout_secs, "ffmpeg").await?;

        if outcome.success {
            Ok(())
        } else {
            Err(MediaError::encode_failed(
                "FFmpeg exited with non-zero status",
                Some(outcome.stderr_tail),
                outcome.exit_code,
            ))
        }
    }
}

/// Outcome of a captured child process.
pub(crate) struct ProcessOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stderr_tail: String,
}

/// Wait for a child process, capturing a bounded tail of its stderr.
///
/// On timeout the process is killed and `MediaError::Timeout` returned; the
/// caller's cleanup obligations are unaffected.
pub(crate) async fn run_captured(
    mut child: Child,
    timeout_secs: Option<u64>,
    tool: &'static str,
) -> MediaResult<ProcessOutcome> {
    let stderr = child.stderr.take();

    let capture = tokio::spawn(async move {
        let mut lines: Vec<String> = Vec::new();
        if let Some(stderr) = stderr {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if lines.len() == MAX_STDERR_LINES {
                    lines.remove(0);
                }
                lines.push(line);
            }
        }
        lines.join("\n")
    });

    let status = if let Some(secs) = timeout_secs {
        match tokio::time::timeout(std::time::Duration::from_secs(secs), child.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("{} timed out after {} seconds, killing process", tool, secs);
                let _ = child.kill().await;
                capture.abort();
                return Err(MediaError::Timeout(secs));
            }
        }
    } else {
        child.wait().await?
    };

    let stderr_tail = capture.await.unwrap_or_default();

    Ok(ProcessOutcome {
        success: status.success(),
        exit_code: status.code(),
        stderr_tail,
    })
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_loops_image_and_stops_at_audio_end() {
        let cmd = DirectEncode::new("in.jpg", "in.mp3", "out.mp4");
        let args = cmd.build_args();

        let loop_pos = args.iter().position(|a| a == "-loop").unwrap();
        assert_eq!(args[loop_pos + 1], "1");

        // Image input precedes audio input.
        let image_pos = args.iter().position(|a| a == "in.jpg").unwrap();
        let audio_pos = args.iter().position(|a| a == "in.mp3").unwrap();
        assert!(image_pos < audio_pos);

        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_build_args_default_codecs() {
        let args = DirectEncode::new("i.jpg", "a.mp3", "o.mp4").build_args();
        let vc = args.iter().position(|a| a == "-c:v").unwrap();
        assert_eq!(args[vc + 1], "libx264");
        let ac = args.iter().position(|a| a == "-c:a").unwrap();
        assert_eq!(args[ac + 1], "aac");
        let pix = args.iter().position(|a| a == "-pix_fmt").unwrap();
        assert_eq!(args[pix + 1], "yuv420p");
    }

    #[test]
    fn test_build_args_overrides() {
        let args = DirectEncode::new("i.jpg", "a.mp3", "o.mp4")
            .video_codec("libx265")
            .preset("slow")
            .build_args();
        assert!(args.contains(&"libx265".to_string()));
        assert!(args.contains(&"slow".to_string()));
    }

    #[tokio::test]
    async fn test_run_missing_input_is_file_not_found() {
        // Skip when ffmpeg is absent; the preflight check fires first.
        if check_ffmpeg().is_err() {
            return;
        }
        let cmd = DirectEncode::new("/nonexistent/i.jpg", "/nonexistent/a.mp3", "/tmp/o.mp4");
        let err = EncodeRunner::new().run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
