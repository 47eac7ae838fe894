//! Audio duration probing via ffprobe.
//!
//! Probing is an optimization: it lets the dispatcher pass an explicit frame
//! bound to the composite engine so it never renders past audio end. Any
//! failure here is soft; the render proceeds on the engine's own duration
//! inference.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Probe timeout. Bounded so a wedged ffprobe can never stall a request.
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Probe an audio file's duration in seconds.
///
/// Returns `None` on any failure: tool missing, non-zero exit, unparsable
/// output, or timeout. Never fails the request.
pub async fn probe_duration_secs(path: impl AsRef<Path>) -> Option<f64> {
    probe_with_timeout(path.as_ref(), PROBE_TIMEOUT).await
}

async fn probe_with_timeout(path: &Path, timeout: Duration) -> Option<f64> {
    if which::which("ffprobe").is_err() {
        warn!("ffprobe not found in PATH, skipping duration probe");
        return None;
    }

    // On timeout the output future is dropped; the child must die with it.
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("ffprobe failed to run for {}: {}", path.display(), e);
            return None;
        }
        Err(_) => {
            warn!(
                "ffprobe timed out after {}s for {}",
                timeout.as_secs(),
                path.display()
            );
            return None;
        }
    };

    if !output.status.success() {
        warn!(
            "ffprobe exited with {:?} for {}: {}",
            output.status.code(),
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    let duration = parse_duration_output(&String::from_utf8_lossy(&output.stdout));
    match duration {
        Some(secs) => debug!("Probed duration of {}: {:.3}s", path.display(), secs),
        None => warn!("ffprobe produced unparsable output for {}", path.display()),
    }
    duration
}

/// Parse ffprobe's single-value duration output.
fn parse_duration_output(stdout: &str) -> Option<f64> {
    stdout
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_output() {
        assert_eq!(parse_duration_output("12.345\n"), Some(12.345));
        assert_eq!(parse_duration_output("  7 "), Some(7.0));
        assert_eq!(parse_duration_output("N/A"), None);
        assert_eq!(parse_duration_output(""), None);
        assert_eq!(parse_duration_output("-1.0"), None);
        assert_eq!(parse_duration_output("inf"), None);
    }

    #[tokio::test]
    async fn test_probe_missing_file_is_soft_failure() {
        assert_eq!(probe_duration_secs("/nonexistent/audio.mp3").await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_probe_leaves_no_child_process() {
        use std::os::unix::fs::PermissionsExt;

        // A stand-in ffprobe that records its pid and hangs.
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let script = dir.path().join("ffprobe");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ > {}\nexec sleep 300\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let saved_path = std::env::var("PATH").unwrap_or_default();
        std::env::set_var("PATH", format!("{}:{}", dir.path().display(), saved_path));
        let result =
            probe_with_timeout(Path::new("/tmp/audio.mp3"), Duration::from_millis(200)).await;
        std::env::set_var("PATH", saved_path);

        assert_eq!(result, None);

        let pid = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .to_string();

        // The kill lands when the future is dropped; give the runtime's
        // reaper a moment to collect the child.
        let mut gone = false;
        for _ in 0..100 {
            match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Err(_) => {
                    gone = true;
                    break;
                }
                Ok(stat) if stat.contains(") Z ") => {
                    gone = true;
                    break;
                }
                Ok(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
        assert!(gone, "probe child survived the timeout");
    }
}
