//! Application state.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::ApiConfig;
use crate::governor::ResourceGovernor;
use crate::janitor::Janitor;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub http: reqwest::Client,
    pub governor: Arc<ResourceGovernor>,
    pub janitor: Arc<Janitor>,
    /// One composited render in flight per process
    pub render_gate: Arc<Semaphore>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: ApiConfig) -> Self {
        let governor = Arc::new(ResourceGovernor::new(&config));
        let janitor = Arc::new(Janitor::new(&config));

        Self {
            config,
            http: reqwest::Client::new(),
            governor,
            janitor,
            render_gate: Arc::new(Semaphore::new(1)),
        }
    }
}
