//! API server binary.

use std::net::SocketAddr;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slidecast_api::{create_router, ApiConfig, AppState};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("slidecast=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting slidecast-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    if let Err(e) = tokio::fs::create_dir_all(&config.output_dir).await {
        error!(
            "Failed to create output dir {}: {}",
            config.output_dir.display(),
            e
        );
        std::process::exit(1);
    }

    // A missing tool is a warning at startup and a hard error per request.
    match slidecast_media::check_ffmpeg() {
        Ok(path) => info!("ffmpeg found at {}", path.display()),
        Err(e) => warn!("{}", e),
    }
    match slidecast_media::check_renderer(&config.renderer_program) {
        Ok(path) => info!("Renderer program found at {}", path.display()),
        Err(e) => warn!("{}", e),
    }

    let state = AppState::new(config.clone());

    // Background tasks: memory watcher and orphan sweeper
    let _memory_task = state.governor.spawn();
    let _sweep_task = state.janitor.spawn();

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");

    info!("Listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
