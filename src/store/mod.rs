pub mod file_backend;
pub mod keys;
pub mod sled_backend;
pub mod trees;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::gaze::types::{CalibrationProfile, FrameRecord};

pub use file_backend::FileBackend;
pub use sled_backend::SledBackend;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage retry exhausted after {attempts} attempts: key={key}: {last_error}")]
    RetryExhausted {
        key: String,
        attempts: u32,
        last_error: String,
    },
}

impl StoreError {
    /// Transient backend failures are worth another attempt; bad input and bad data are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Sled(_) | StoreError::Io(_))
    }
}

/// Per-session bookkeeping kept next to the frame log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub session_id: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub frame_count: u64,
    #[serde(default)]
    pub calibration: Option<CalibrationProfile>,
}

impl SessionMeta {
    pub fn new(session_id: &str, key: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            key: key.to_string(),
            created_at: now,
            updated_at: now,
            frame_count: 0,
            calibration: None,
        }
    }
}

/// Durable storage for per-session frame logs. Keys are already sanitized.
/// Implementations are synchronous; [`SessionStore`] provides serialization per
/// key and bounded retries on top.
pub trait SessionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Appends one record and returns the updated session metadata. A
    /// `calibration` profile is committed in the same write as the record.
    fn append(
        &self,
        key: &str,
        session_id: &str,
        record: &FrameRecord,
        calibration: Option<&CalibrationProfile>,
    ) -> Result<SessionMeta, StoreError>;

    /// All records in arrival order; empty when the session does not exist.
    fn load(&self, key: &str) -> Result<Vec<FrameRecord>, StoreError>;

    fn meta(&self, key: &str) -> Result<Option<SessionMeta>, StoreError>;

    fn list(&self) -> Result<Vec<SessionMeta>, StoreError>;

    /// Returns whether the session existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Removes every session; returns how many were removed.
    fn clear(&self) -> Result<usize, StoreError>;

    fn flush(&self) -> Result<(), StoreError>;

    /// Cheap reachability check that touches at most one entry.
    fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::constants::DEFAULT_STORE_WRITE_RETRIES,
            backoff: Duration::from_millis(crate::constants::DEFAULT_STORE_RETRY_BACKOFF_MS),
        }
    }
}

/// Session log with per-key serialization and bounded, fixed-backoff retries.
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    retry: RetryPolicy,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            key_locks: Mutex::new(HashMap::new()),
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                backoff: retry.backoff,
            },
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    async fn acquire_key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;

        // Only the map holds idle locks (strong_count == 1), so they can be dropped.
        if locks.len() > 1000 {
            locks.retain(|_, v| Arc::strong_count(v) > 1);
        }

        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn with_retry<T, F>(&self, op: &'static str, key: &str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.retry.max_attempts => {
                    tracing::error!(op, key, attempts = attempt, error = %e, "Store operation failed");
                    return Err(StoreError::RetryExhausted {
                        key: key.to_string(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(op, key, attempt, error = %e, "Store operation failed, retrying");
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Appends one record to the session log. Concurrent appends for the same
    /// session are serialized here.
    pub async fn append(
        &self,
        session_id: &str,
        record: &FrameRecord,
    ) -> Result<SessionMeta, StoreError> {
        self.append_with_calibration(session_id, record, None).await
    }

    /// Appends the record that closed the calibration window together with the
    /// resulting profile. Either both are stored or neither is.
    pub async fn append_with_calibration(
        &self,
        session_id: &str,
        record: &FrameRecord,
        calibration: Option<&CalibrationProfile>,
    ) -> Result<SessionMeta, StoreError> {
        let key = keys::session_key(session_id)?;
        let lock = self.acquire_key_lock(&key).await;
        let _guard = lock.lock().await;

        self.with_retry("append", &key, || {
            self.backend.append(&key, session_id, record, calibration)
        })
        .await
    }

    /// Returns the session's records in arrival order, or an empty log for an unknown session.
    pub async fn load(&self, session_id: &str) -> Result<Vec<FrameRecord>, StoreError> {
        let key = keys::session_key(session_id)?;
        self.with_retry("load", &key, || self.backend.load(&key)).await
    }

    pub async fn meta(&self, session_id: &str) -> Result<Option<SessionMeta>, StoreError> {
        let key = keys::session_key(session_id)?;
        self.with_retry("meta", &key, || self.backend.meta(&key)).await
    }

    pub async fn list_sessions(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .list_meta()
            .await?
            .into_iter()
            .map(|meta| meta.session_id)
            .collect())
    }

    pub async fn list_meta(&self) -> Result<Vec<SessionMeta>, StoreError> {
        self.with_retry("list", "*", || self.backend.list()).await
    }

    pub async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        self.delete_if(session_id, |_| true).await
    }

    /// Deletes the session unless its current meta, read under the session's
    /// write lock, is rejected by `should_delete`.
    pub async fn delete_if<P>(&self, session_id: &str, should_delete: P) -> Result<bool, StoreError>
    where
        P: Fn(&SessionMeta) -> bool,
    {
        let key = keys::session_key(session_id)?;
        let lock = self.acquire_key_lock(&key).await;
        let _guard = lock.lock().await;

        if let Some(meta) = self.with_retry("meta", &key, || self.backend.meta(&key)).await? {
            if !should_delete(&meta) {
                return Ok(false);
            }
        }
        self.with_retry("delete", &key, || self.backend.delete(&key)).await
    }

    pub async fn clear_all(&self) -> Result<usize, StoreError> {
        self.with_retry("clear_all", "*", || self.backend.clear()).await
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.backend.flush()
    }

    /// Single attempt without retries.
    pub fn ping(&self) -> Result<(), StoreError> {
        self.backend.ping()
    }
}

pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Backend whose appends fail a fixed number of times before succeeding.
    struct FlakyBackend {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyBackend {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl SessionBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn append(
            &self,
            key: &str,
            session_id: &str,
            _record: &FrameRecord,
            _calibration: Option<&CalibrationProfile>,
        ) -> Result<SessionMeta, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk hiccup",
                )));
            }
            Ok(SessionMeta::new(session_id, key, Utc::now()))
        }

        fn load(&self, _key: &str) -> Result<Vec<FrameRecord>, StoreError> {
            Ok(Vec::new())
        }

        fn meta(&self, _key: &str) -> Result<Option<SessionMeta>, StoreError> {
            Ok(None)
        }

        fn list(&self) -> Result<Vec<SessionMeta>, StoreError> {
            Ok(Vec::new())
        }

        fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        fn clear(&self) -> Result<usize, StoreError> {
            Ok(0)
        }

        fn flush(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let backend = Arc::new(FlakyBackend::new(2));
        let store = SessionStore::new(backend.clone(), fast_retry());
        let record = FrameRecord::empty(Utc::now());

        store.append("s1", &record).await.expect("third attempt succeeds");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let backend = Arc::new(FlakyBackend::new(10));
        let store = SessionStore::new(backend.clone(), fast_retry());
        let record = FrameRecord::empty(Utc::now());

        let err = store.append("s1", &record).await.unwrap_err();
        assert!(matches!(err, StoreError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let backend = Arc::new(FlakyBackend::new(0));
        let store = SessionStore::new(backend.clone(), fast_retry());
        let err = store
            .append("", &FrameRecord::empty(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn list_sessions_returns_original_ids() {
        let store = SessionStore::new(Arc::new(SledBackend::temporary().unwrap()), fast_retry());
        let record = FrameRecord::empty(Utc::now());
        for id in ["b", "a", "2024-01-01T10:00:00", "a"] {
            store.append(id, &record).await.unwrap();
        }

        let ids: Vec<String> = store.list_sessions().await.unwrap().into_iter().collect();
        assert_eq!(ids, vec!["2024-01-01T10:00:00", "a", "b"]);
    }

    #[tokio::test]
    async fn calibration_is_committed_with_its_frame() {
        let store = SessionStore::new(Arc::new(SledBackend::temporary().unwrap()), fast_retry());
        let profile = CalibrationProfile {
            ear_threshold: 0.21,
            baseline_pupil_radius: 3.5,
            calibrated: true,
            sample_count: 2,
        };
        let record = FrameRecord::empty(Utc::now());

        store.append("s", &record).await.unwrap();
        let meta = store
            .append_with_calibration("s", &record, Some(&profile))
            .await
            .unwrap();
        assert_eq!(meta.calibration, Some(profile));

        let meta = store.append("s", &record).await.unwrap();
        assert_eq!(meta.calibration, Some(profile));
        assert_eq!(meta.frame_count, 3);
    }

    #[tokio::test]
    async fn conditional_delete_rechecks_meta() {
        let store = SessionStore::new(Arc::new(SledBackend::temporary().unwrap()), fast_retry());
        store.append("s", &FrameRecord::empty(Utc::now())).await.unwrap();

        assert!(!store.delete_if("s", |meta| meta.frame_count > 1).await.unwrap());
        assert_eq!(store.load("s").await.unwrap().len(), 1);
        assert!(store.delete_if("s", |meta| meta.frame_count == 1).await.unwrap());
        assert!(store.load("s").await.unwrap().is_empty());
    }
}
