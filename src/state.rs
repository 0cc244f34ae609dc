use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Config, StoreBackendKind};
use crate::gaze::{GazeConfig, GazeEngine, GazeError};
use crate::store::{FileBackend, RetryPolicy, SessionBackend, SessionStore, SledBackend, StoreError};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<GazeEngine>,
    started_at: Instant,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gaze(#[from] GazeError),
}

impl AppState {
    pub fn new(engine: Arc<GazeEngine>) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }

    /// Opens the configured backend and builds the engine on top of it.
    pub fn build(config: &Config) -> Result<Self, StartupError> {
        let store = Arc::new(open_store(config)?);
        let gaze_config = GazeConfig::from_env(&config.gaze);
        let engine = Arc::new(GazeEngine::new(gaze_config, store)?);
        Ok(Self::new(engine))
    }

    pub fn engine(&self) -> &Arc<GazeEngine> {
        &self.engine
    }

    pub fn store(&self) -> &SessionStore {
        self.engine.store()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub fn open_store(config: &Config) -> Result<SessionStore, StoreError> {
    let backend: Arc<dyn SessionBackend> = match config.store.backend {
        StoreBackendKind::Sled => Arc::new(SledBackend::open(&config.store.sled_path)?),
        StoreBackendKind::File => Arc::new(FileBackend::open(&config.store.data_dir)?),
    };
    tracing::info!(backend = backend.name(), "Session store opened");

    Ok(SessionStore::new(
        backend,
        RetryPolicy {
            max_attempts: config.store.write_retries,
            backoff: Duration::from_millis(config.store.retry_backoff_ms),
        },
    ))
}
