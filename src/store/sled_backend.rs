use chrono::Utc;
use sled::transaction::{abort, TransactionError, Transactional};
use sled::Db;

use crate::gaze::types::{CalibrationProfile, FrameRecord};
use crate::store::{deserialize, keys, serialize, trees, SessionBackend, SessionMeta, StoreError};

/// Embedded sled database: frames keyed `{key}:{seq}` plus one meta entry per session.
#[derive(Debug)]
pub struct SledBackend {
    db: Db,
    frames: sled::Tree,
    session_meta: sled::Tree,
}

impl SledBackend {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        Self::from_db(db)
    }

    /// Temporary database removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let frames = db.open_tree(trees::FRAMES)?;
        let session_meta = db.open_tree(trees::SESSION_META)?;
        Ok(Self {
            db,
            frames,
            session_meta,
        })
    }
}

fn map_tx_error(e: TransactionError<String>) -> StoreError {
    match e {
        TransactionError::Abort(message) => StoreError::Validation(message),
        TransactionError::Storage(se) => StoreError::Sled(se),
    }
}

impl SessionBackend for SledBackend {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn append(
        &self,
        key: &str,
        session_id: &str,
        record: &FrameRecord,
        calibration: Option<&CalibrationProfile>,
    ) -> Result<SessionMeta, StoreError> {
        let record_bytes = serialize(record)?;
        let now = Utc::now();

        (&self.frames, &self.session_meta)
            .transaction(|(frames, metas)| {
                let mut meta = match metas.get(key.as_bytes())? {
                    Some(raw) => match serde_json::from_slice::<SessionMeta>(&raw) {
                        Ok(meta) => meta,
                        Err(e) => return abort(format!("corrupt session meta for {key}: {e}")),
                    },
                    None => SessionMeta::new(session_id, key, now),
                };

                let frame_key = keys::frame_key(key, meta.frame_count);
                frames.insert(frame_key.as_bytes(), record_bytes.as_slice())?;

                meta.frame_count += 1;
                meta.updated_at = now;
                if let Some(profile) = calibration {
                    meta.calibration = Some(*profile);
                }
                let meta_bytes = match serde_json::to_vec(&meta) {
                    Ok(bytes) => bytes,
                    Err(e) => return abort(e.to_string()),
                };
                metas.insert(key.as_bytes(), meta_bytes)?;
                Ok(meta)
            })
            .map_err(map_tx_error)
    }

    fn load(&self, key: &str) -> Result<Vec<FrameRecord>, StoreError> {
        let prefix = keys::frame_prefix(key);
        let mut records = Vec::new();
        for item in self.frames.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            records.push(deserialize::<FrameRecord>(&raw)?);
        }
        Ok(records)
    }

    fn meta(&self, key: &str) -> Result<Option<SessionMeta>, StoreError> {
        match self.session_meta.get(key.as_bytes())? {
            Some(raw) => Ok(Some(deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<SessionMeta>, StoreError> {
        let mut metas = Vec::new();
        for item in self.session_meta.iter() {
            let (k, raw) = item?;
            match deserialize::<SessionMeta>(&raw) {
                Ok(meta) => metas.push(meta),
                Err(e) => {
                    tracing::warn!(key = %String::from_utf8_lossy(&k), error = %e, "Skipping unreadable session meta");
                }
            }
        }
        Ok(metas)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let prefix = keys::frame_prefix(key);
        let mut batch = sled::Batch::default();
        let mut had_frames = false;
        for item in self.frames.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            batch.remove(k);
            had_frames = true;
        }
        self.frames.apply_batch(batch)?;
        let had_meta = self.session_meta.remove(key.as_bytes())?.is_some();
        Ok(had_frames || had_meta)
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let count = self.session_meta.len();
        self.frames.clear()?;
        self.session_meta.clear()?;
        Ok(count)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.session_meta.first()?;
        Ok(())
    }
}
