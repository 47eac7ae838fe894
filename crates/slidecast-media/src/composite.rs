//! Composite (captioned) renderer invocation.
//!
//! The animated composition engine is an external CLI taking a composition
//! entry point, a composition id, an output path, and a JSON props blob. The
//! props carry the resolved asset paths and the frame-timed caption list; an
//! explicit `--frames` range bounds rendering to the probed audio duration
//! when available.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use slidecast_models::TimedSegment;

use crate::command::run_captured;
use crate::error::{MediaError, MediaResult};

/// Composite renderer configuration.
#[derive(Debug, Clone)]
pub struct CompositeConfig {
    /// Program to invoke
    pub program: String,
    /// Arguments preceding the entry point (subcommand selection)
    pub base_args: Vec<String>,
    /// Composition entry point
    pub entry: String,
    /// Composition id within the entry point
    pub composition: String,
    /// Worker cap inside the renderer; one keeps peak memory bounded
    pub concurrency: u32,
    /// Heap ceiling forwarded to the renderer's runtime, in MiB
    pub memory_limit_mb: Option<u64>,
    /// Render timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            program: "npx".to_string(),
            base_args: vec!["remotion".to_string(), "render".to_string()],
            entry: "src/Video.tsx".to_string(),
            composition: "SlideVideo".to_string(),
            concurrency: 1,
            memory_limit_mb: Some(512),
            timeout_secs: 600,
        }
    }
}

/// Input props passed to the composition as JSON.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CompositeProps {
    /// Local image path
    pub image: String,
    /// Local audio path
    pub audio: String,
    /// Frame-timed caption segments, in source order
    pub captions: Vec<TimedSegment>,
    /// Frame rate the segments were computed against
    pub fps: u32,
}

/// Runner for the composite renderer.
#[derive(Debug, Clone)]
pub struct CompositeRenderer {
    config: CompositeConfig,
}

impl CompositeRenderer {
    /// Create a renderer with the given configuration.
    pub fn new(config: CompositeConfig) -> Self {
        Self { config }
    }

    /// Build the argument vector for one render.
    pub fn build_args(
        &self,
        props_json: &str,
        output: &Path,
        frame_bound: Option<u32>,
    ) -> Vec<String> {
        let mut args = self.config.base_args.clone();
        args.push(self.config.entry.clone());
        args.push(self.config.composition.clone());
        args.push(output.to_string_lossy().to_string());
        args.push("--props".to_string());
        args.push(props_json.to_string());
        args.push("--concurrency".to_string());
        args.push(self.config.concurrency.to_string());
        if let Some(frames) = frame_bound {
            args.push("--frames".to_string());
            args.push(format!("0-{}", frames.saturating_sub(1)));
        }
        args
    }

    /// Render the composition to `output`.
    ///
    /// When `frame_bound` is set the engine renders exactly that many frames;
    /// otherwise its own duration inference applies.
    pub async fn render(
        &self,
        props: &CompositeProps,
        output: &Path,
        frame_bound: Option<u32>,
    ) -> MediaResult<()> {
        check_renderer(&self.config.program)?;

        let props_json = serde_json::to_string(props)?;
        let args = self.build_args(&props_json, output, frame_bound);

        debug!(
            "Running composite renderer: {} {}",
            self.config.program,
            args.join(" ")
        );

        let mut command = Command::new(&self.config.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if let Some(mb) = self.config.memory_limit_mb {
            command.env("NODE_OPTIONS", format!("--max-old-space-size={}", mb));
        }

        let child = command.spawn()?;
        let outcome = run_captured(child, Some(self.config.timeout_secs), "composite renderer").await?;

        if outcome.success {
            info!("Composite render complete: {}", output.display());
            Ok(())
        } else {
            Err(MediaError::render_failed(
                "composite renderer exited with non-zero status",
                Some(outcome.stderr_tail),
                outcome.exit_code,
            ))
        }
    }
}

/// Check if the composite renderer program is available.
pub fn check_renderer(program: &str) -> MediaResult<PathBuf> {
    which::which(program).map_err(|_| MediaError::RendererNotFound(program.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> CompositeRenderer {
        CompositeRenderer::new(CompositeConfig::default())
    }

    #[test]
    fn test_build_args_shape() {
        let args = renderer().build_args("{}", Path::new("/out/video.mp4"), None);
        assert_eq!(args[0], "remotion");
        assert_eq!(args[1], "render");
        assert_eq!(args[2], "src/Video.tsx");
        assert_eq!(args[3], "SlideVideo");
        assert_eq!(args[4], "/out/video.mp4");
        assert_eq!(args[5], "--props");
        assert_eq!(args[6], "{}");
        assert_eq!(args[7], "--concurrency");
        assert_eq!(args[8], "1");
        assert!(!args.contains(&"--frames".to_string()));
    }

    #[test]
    fn test_build_args_frame_bound() {
        let args = renderer().build_args("{}", Path::new("/out/v.mp4"), Some(300));
        let pos = args.iter().position(|a| a == "--frames").unwrap();
        assert_eq!(args[pos + 1], "0-299");
    }

    #[test]
    fn test_props_serialization() {
        let props = CompositeProps {
            image: "/out/image.jpg".to_string(),
            audio: "/out/audio.mp3".to_string(),
            captions: vec![TimedSegment {
                start_frame: 0,
                end_frame: 30,
                text: "hi".to_string(),
            }],
            fps: 30,
        };
        let json: serde_json::Value = serde_json::to_value(&props).unwrap();
        assert_eq!(json["image"], "/out/image.jpg");
        assert_eq!(json["captions"][0]["startFrame"], 0);
        assert_eq!(json["captions"][0]["endFrame"], 30);
        assert_eq!(json["fps"], 30);
    }
}
