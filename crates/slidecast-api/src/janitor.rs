//! Artifact janitor.
//!
//! Owns the lifecycle of every file the conversion path creates: temp assets
//! downloaded for a request, render outputs after delivery, and a periodic
//! sweep of the shared output directory for orphans. Deletion of an
//! already-deleted file is a benign no-op; the sweep and per-request deletes
//! race safely because they touch disjoint or already-gone files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;

/// Directory entries the sweep never touches.
const RESERVED_ENTRIES: [&str; 2] = [".keep", ".gitkeep"];

/// A locally materialized copy of a remote input, owned by one request.
#[derive(Debug, Clone)]
pub struct TempAsset {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl TempAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            created_at: Utc::now(),
        }
    }
}

/// Explicitly owned artifact janitor service.
pub struct Janitor {
    output_dir: PathBuf,
    retention: Duration,
    sweep_interval: Duration,
}

impl Janitor {
    /// Create a janitor from the server config.
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            retention: config.retention,
            sweep_interval: config.sweep_interval,
        }
    }

    /// Delete a request's temp assets.
    ///
    /// Called exactly once when the render reaches a terminal state,
    /// regardless of outcome. Failures are logged, never fatal.
    pub async fn remove_temp_assets(&self, assets: &[TempAsset]) {
        for asset in assets {
            remove_quietly(&asset.path, "temp asset").await;
        }
    }

    /// Delete a render output after delivery (or after a failed render).
    pub async fn remove_output(&self, path: &Path) {
        remove_quietly(path, "render output").await;
    }

    /// Start the periodic orphan sweep.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let janitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(janitor.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let removed = janitor.sweep_once().await;
                if removed > 0 {
                    info!("Sweep removed {} orphaned file(s)", removed);
                }
            }
        })
    }

    /// Run a single sweep over the output directory.
    pub async fn sweep_once(&self) -> usize {
        sweep_dir(&self.output_dir, self.retention, SystemTime::now()).await
    }
}

/// Remove a file, treating "already gone" as success.
async fn remove_quietly(path: &Path, kind: &'static str) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}: {}", kind, path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} already removed: {}", kind, path.display())
        }
        Err(e) => warn!("Failed to remove {} {}: {}", kind, path.display(), e),
    }
}

/// Delete regular files in `dir` whose modification time is older than
/// `retention` relative to `now`. Reserved placeholder entries are skipped;
/// individual failures are logged and do not abort the sweep.
pub(crate) async fn sweep_dir(dir: &Path, retention: Duration, now: SystemTime) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Sweep could not read {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Sweep could not advance in {}: {}", dir.display(), e);
                break;
            }
        };

        let name = entry.file_name();
        if RESERVED_ENTRIES.iter().any(|r| name == *r) {
            continue;
        }

        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!("Sweep could not stat {}: {}", path.display(), e);
                continue;
            }
        };

        let modified = match metadata.modified() {
            Ok(m) => m,
            Err(e) => {
                warn!("Sweep could not read mtime of {}: {}", path.display(), e);
                continue;
            }
        };

        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age > retention {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Sweep removed {} (age {}s)", path.display(), age.as_secs());
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Sweep failed to remove {}: {}", path.display(), e),
            }
        }
    }

    removed
}
