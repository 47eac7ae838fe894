//! Health check handlers.

/// Health check endpoint (liveness probe).
pub async fn health() -> &'static str {
    "OK"
}

/// Homepage banner.
pub async fn index() -> &'static str {
    "slidecast conversion service is running"
}
