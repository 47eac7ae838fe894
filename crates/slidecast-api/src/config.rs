//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

use slidecast_media::CompositeConfig;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Working directory for uploads, temp assets, and render outputs
    pub output_dir: PathBuf,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size (uploads)
    pub max_body_size: usize,
    /// Remote asset download timeout
    pub download_timeout: Duration,
    /// Direct encode timeout
    pub encode_timeout: Duration,
    /// Composite render timeout
    pub render_timeout: Duration,
    /// Frame rate used for caption timing and frame bounds
    pub fps: u32,
    /// Process memory ceiling in bytes
    pub memory_limit_bytes: u64,
    /// Fraction of the ceiling that triggers a reclaim pass
    pub memory_warn_fraction: f64,
    /// Fraction of the ceiling above which new requests are rejected
    pub memory_reject_fraction: f64,
    /// Background memory check interval
    pub memory_check_interval: Duration,
    /// Background output-directory sweep interval
    pub sweep_interval: Duration,
    /// Age after which orphaned files in the output dir are removed
    pub retention: Duration,
    /// Composite renderer program (e.g. "npx")
    pub renderer_program: String,
    /// Composition entry point
    pub renderer_entry: String,
    /// Composition id
    pub renderer_composition: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            output_dir: PathBuf::from("./out"),
            cors_origins: vec!["*".to_string()],
            max_body_size: 50 * 1024 * 1024, // 50MB
            download_timeout: Duration::from_secs(30),
            encode_timeout: Duration::from_secs(300),
            render_timeout: Duration::from_secs(600),
            fps: slidecast_models::DEFAULT_FPS,
            memory_limit_bytes: 1024 * 1024 * 1024, // 1GiB
            memory_warn_fraction: 0.85,
            memory_reject_fraction: 0.95,
            memory_check_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(600),
            retention: Duration::from_secs(1800),
            renderer_program: "npx".to_string(),
            renderer_entry: "src/Video.tsx".to_string(),
            renderer_composition: "SlideVideo".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parsed("API_PORT").unwrap_or(defaults.port),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: env_parsed("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            download_timeout: env_secs("DOWNLOAD_TIMEOUT_SECS")
                .unwrap_or(defaults.download_timeout),
            encode_timeout: env_secs("ENCODE_TIMEOUT_SECS").unwrap_or(defaults.encode_timeout),
            render_timeout: env_secs("RENDER_TIMEOUT_SECS").unwrap_or(defaults.render_timeout),
            fps: env_parsed("VIDEO_FPS").unwrap_or(defaults.fps),
            memory_limit_bytes: env_parsed("MEMORY_LIMIT_BYTES")
                .unwrap_or(defaults.memory_limit_bytes),
            memory_warn_fraction: env_parsed("MEMORY_WARN_FRACTION")
                .unwrap_or(defaults.memory_warn_fraction),
            memory_reject_fraction: env_parsed("MEMORY_REJECT_FRACTION")
                .unwrap_or(defaults.memory_reject_fraction),
            memory_check_interval: env_secs("MEMORY_CHECK_INTERVAL_SECS")
                .unwrap_or(defaults.memory_check_interval),
            sweep_interval: env_secs("SWEEP_INTERVAL_SECS").unwrap_or(defaults.sweep_interval),
            retention: env_secs("RETENTION_SECS").unwrap_or(defaults.retention),
            renderer_program: std::env::var("RENDERER_PROGRAM")
                .unwrap_or(defaults.renderer_program),
            renderer_entry: std::env::var("RENDERER_ENTRY").unwrap_or(defaults.renderer_entry),
            renderer_composition: std::env::var("RENDERER_COMPOSITION")
                .unwrap_or(defaults.renderer_composition),
        }
    }

    /// Composite renderer configuration derived from this config.
    ///
    /// The renderer's heap ceiling is derived from the process memory ceiling
    /// so the invoked engine inherits the same bound.
    pub fn composite_config(&self) -> CompositeConfig {
        CompositeConfig {
            program: self.renderer_program.clone(),
            entry: self.renderer_entry.clone(),
            composition: self.renderer_composition.clone(),
            memory_limit_mb: Some(self.memory_limit_bytes / (1024 * 1024)),
            timeout_secs: self.render_timeout.as_secs(),
            ..CompositeConfig::default()
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parsed(key).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = ApiConfig::default();
        assert!(config.memory_warn_fraction < config.memory_reject_fraction);
        assert_eq!(config.fps, 30);
    }

    #[test]
    fn test_composite_config_inherits_memory_ceiling() {
        let config = ApiConfig {
            memory_limit_bytes: 512 * 1024 * 1024,
            ..ApiConfig::default()
        };
        let composite = config.composite_config();
        assert_eq!(composite.memory_limit_mb, Some(512));
        assert_eq!(composite.concurrency, 1);
    }
}
