mod camera;
mod mjpeg;
mod poller;
mod routes;
mod savedir;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use cam_station_common::config::Config;
use poller::CameraController;
use routes::AppState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Build the log filter from the configured level. An unparseable
/// level falls back to `info` instead of silently disabling output.
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| {
        eprintln!("Invalid logging.level {level:?}, using \"info\"");
        EnvFilter::new("info")
    })
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter(&config.logging.level)),
        )
        .init();

    info!(
        host = config.server.host,
        port = config.server.port,
        camera_index = config.camera.index,
        stream_fps = config.stream.fps,
        quality = config.stream.quality,
        "starting cam-station"
    );

    let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let save_dir = match savedir::resolve(config.capture.save_dir.as_deref(), &base_dir) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to prepare save directory: {e}");
            std::process::exit(1);
        }
    };

    let controller = CameraController::new(config.camera.clone(), config.stream.clone());
    let slot = controller.slot();
    if let Err(e) = controller.start(config.camera.index) {
        error!(error = %e, "failed to start camera poller");
        std::process::exit(1);
    }

    let state = Arc::new(AppState {
        controller,
        slot,
        stream_fps: config.stream.fps,
        save_dir: Mutex::new(save_dir),
    });

    let app = routes::router(Arc::clone(&state));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(addr, "cam-station server starting");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .unwrap();

    info!("shutting down, stopping camera poller");
    state.controller.stop();
}
