//! Process memory governor.
//!
//! Tracks process RSS against a configured ceiling, rejects new requests
//! above a critical fraction, and runs a periodic reclaim pass above a
//! warning fraction. These are soft, advisory controls: they reduce but do
//! not guarantee avoidance of out-of-memory termination.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;

/// Read-only memory snapshot against the configured ceiling.
#[derive(Debug, Clone, Copy)]
pub struct MemoryState {
    pub used_bytes: u64,
    pub limit_bytes: u64,
}

impl MemoryState {
    /// Used memory as a fraction of the ceiling.
    pub fn used_fraction(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.limit_bytes as f64
    }
}

/// Explicitly owned memory governor service.
///
/// Injected into the request path via `AppState`; the background check loop
/// is started once from `main` with [`ResourceGovernor::spawn`].
pub struct ResourceGovernor {
    limit_bytes: u64,
    warn_fraction: f64,
    reject_fraction: f64,
    check_interval: Duration,
    pid: Pid,
    system: Mutex<System>,
}

impl ResourceGovernor {
    /// Create a governor from the server config.
    pub fn new(config: &ApiConfig) -> Self {
        let pid = sysinfo::get_current_pid().expect("current pid");
        Self {
            limit_bytes: config.memory_limit_bytes,
            warn_fraction: config.memory_warn_fraction,
            reject_fraction: config.memory_reject_fraction,
            check_interval: config.memory_check_interval,
            pid,
            system: Mutex::new(System::new()),
        }
    }

    /// Take a fresh memory snapshot for this process.
    pub fn snapshot(&self) -> MemoryState {
        let mut system = self.system.lock().expect("governor lock");
        system.refresh_process(self.pid);
        let used_bytes = system.process(self.pid).map(|p| p.memory()).unwrap_or(0);
        MemoryState {
            used_bytes,
            limit_bytes: self.limit_bytes,
        }
    }

    /// Admission check for an inbound request.
    ///
    /// Rejects immediately above the critical fraction; no partial work is
    /// performed and nothing is queued.
    pub fn admit(&self) -> Result<MemoryState, MemoryState> {
        let state = self.snapshot();
        if exceeds(state.used_fraction(), self.reject_fraction) {
            Err(state)
        } else {
            Ok(state)
        }
    }

    /// Start the periodic background check.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let governor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(governor.check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                governor.check_once();
            }
        })
    }

    /// One background check: log usage and reclaim above the warning level.
    fn check_once(&self) {
        let state = self.snapshot();
        debug!(
            "Memory check: {} of {} bytes in use ({:.1}%)",
            state.used_bytes,
            state.limit_bytes,
            state.used_fraction() * 100.0
        );

        if exceeds(state.used_fraction(), self.warn_fraction) {
            warn!(
                "Memory usage {:.1}% above warning level {:.0}%, running reclaim pass",
                state.used_fraction() * 100.0,
                self.warn_fraction * 100.0
            );
            // Advisory only: there is no collector to invoke in this runtime,
            // so the pass re-samples and reports what pressure remains.
            let after = self.snapshot();
            info!(
                "Reclaim pass: {} -> {} bytes in use",
                state.used_bytes, after.used_bytes
            );
        }
    }
}

/// Whether a usage fraction exceeds a threshold fraction.
fn exceeds(used_fraction: f64, threshold: f64) -> bool {
    used_fraction > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_fraction() {
        let state = MemoryState {
            used_bytes: 850,
            limit_bytes: 1000,
        };
        assert!((state.used_fraction() - 0.85).abs() < 1e-9);

        let zero_limit = MemoryState {
            used_bytes: 10,
            limit_bytes: 0,
        };
        assert_eq!(zero_limit.used_fraction(), 0.0);
    }

    #[test]
    fn test_exceeds_is_strict() {
        assert!(!exceeds(0.95, 0.95));
        assert!(exceeds(0.951, 0.95));
        assert!(!exceeds(0.85, 0.95));
    }

    #[test]
    fn test_snapshot_reads_current_process() {
        let governor = ResourceGovernor::new(&ApiConfig::default());
        let state = governor.snapshot();
        // A running test process always has a nonzero RSS.
        assert!(state.used_bytes > 0);
        assert_eq!(state.limit_bytes, ApiConfig::default().memory_limit_bytes);
    }

    #[test]
    fn test_admit_under_generous_ceiling() {
        let config = ApiConfig {
            memory_limit_bytes: u64::MAX,
            ..ApiConfig::default()
        };
        let governor = ResourceGovernor::new(&config);
        assert!(governor.admit().is_ok());
    }

    #[test]
    fn test_admit_rejects_over_tiny_ceiling() {
        let config = ApiConfig {
            memory_limit_bytes: 1,
            ..ApiConfig::default()
        };
        let governor = ResourceGovernor::new(&config);
        assert!(governor.admit().is_err());
    }
}
