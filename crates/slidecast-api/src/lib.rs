//! Axum HTTP API server.
//!
//! This crate provides:
//! - The `/convert` endpoint turning an image + audio (+ captions) into a video
//! - Memory admission control with a background reclaim pass
//! - Temp-file bookkeeping with an orphan sweeper

pub mod assets;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod governor;
pub mod handlers;
pub mod janitor;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
