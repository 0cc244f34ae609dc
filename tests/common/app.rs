use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use gaze_backend::config::{
    Config, GazeEnvConfig, StoreBackendKind, StoreConfig, WorkerConfig,
};
use gaze_backend::gaze::GazeEngine;
use gaze_backend::routes::build_router;
use gaze_backend::state::AppState;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

impl TestApp {
    pub fn engine(&self) -> &Arc<GazeEngine> {
        self.state.engine()
    }
}

/// Builds the config directly instead of through `set_var`, which would race
/// between concurrently running tests.
pub fn test_config(temp_dir: &TempDir, backend: StoreBackendKind, calibration_frames: u32) -> Config {
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 8001,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        cors_origin: "*".to_string(),
        store: StoreConfig {
            backend,
            sled_path: temp_dir
                .path()
                .join("gaze-test.sled")
                .to_string_lossy()
                .to_string(),
            data_dir: temp_dir.path().join("sessions").to_string_lossy().to_string(),
            write_retries: 3,
            retry_backoff_ms: 1,
        },
        worker: WorkerConfig {
            is_leader: false,
            session_ttl_hours: 24,
            sweep_cron: "0 0 * * * *".to_string(),
            clear_on_shutdown: false,
        },
        gaze: GazeEnvConfig {
            calibration_frames,
            ..GazeEnvConfig::default()
        },
    }
}

pub async fn spawn_with(backend: StoreBackendKind, calibration_frames: u32) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&temp_dir, backend, calibration_frames);

    let state = AppState::build(&config).expect("build app state");

    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}

/// Sled-backed app with calibration disabled so every frame is live.
pub async fn spawn_test_app() -> TestApp {
    spawn_with(StoreBackendKind::Sled, 0).await
}

pub async fn spawn_test_server() -> TestApp {
    spawn_test_app().await
}
