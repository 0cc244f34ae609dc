use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use crate::gaze::types::{CalibrationProfile, FrameRecord};
use crate::store::{deserialize, serialize, SessionBackend, SessionMeta, StoreError};

const FRAMES_EXT: &str = "json";
const META_EXT: &str = "meta";

/// One JSON array of frames per session under `data_dir`, plus a sidecar meta file.
/// Every write goes to a temp file first and is renamed into place.
///
/// The meta file is the commit point: only the first `frame_count` entries of the
/// frames file are part of the log. An append whose meta write failed leaves an
/// uncommitted tail that the next append overwrites.
#[derive(Debug, Clone)]
pub struct FileBackend {
    data_dir: PathBuf,
}

impl FileBackend {
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn frames_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.{FRAMES_EXT}"))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.{META_EXT}"))
    }

    fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let bytes = serialize(value)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_optional(path: &Path) -> Result<bool, StoreError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn committed(&self, key: &str) -> Result<(Vec<FrameRecord>, Option<SessionMeta>), StoreError> {
        let meta = self.meta(key)?;
        let mut frames: Vec<FrameRecord> = match Self::read_optional(&self.frames_path(key))? {
            Some(bytes) => deserialize(&bytes)?,
            None => Vec::new(),
        };
        let committed = meta.as_ref().map_or(0, |m| m.frame_count as usize);
        if frames.len() > committed {
            tracing::warn!(
                key,
                committed,
                stored = frames.len(),
                "Ignoring uncommitted frames"
            );
            frames.truncate(committed);
        }
        Ok((frames, meta))
    }

    fn session_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl SessionBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn append(
        &self,
        key: &str,
        session_id: &str,
        record: &FrameRecord,
        calibration: Option<&CalibrationProfile>,
    ) -> Result<SessionMeta, StoreError> {
        let now = Utc::now();
        let (mut frames, meta) = self.committed(key)?;
        let mut meta = meta.unwrap_or_else(|| SessionMeta::new(session_id, key, now));

        frames.push(record.clone());
        self.write_atomic(&self.frames_path(key), &frames)?;

        meta.frame_count = frames.len() as u64;
        meta.updated_at = now;
        if let Some(profile) = calibration {
            meta.calibration = Some(*profile);
        }
        self.write_atomic(&self.meta_path(key), &meta)?;
        Ok(meta)
    }

    fn load(&self, key: &str) -> Result<Vec<FrameRecord>, StoreError> {
        Ok(self.committed(key)?.0)
    }

    fn meta(&self, key: &str) -> Result<Option<SessionMeta>, StoreError> {
        match Self::read_optional(&self.meta_path(key))? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<SessionMeta>, StoreError> {
        let mut metas = Vec::new();
        for key in self.session_keys()? {
            match self.meta(&key) {
                Ok(Some(meta)) => metas.push(meta),
                Ok(None) => {}
                Err(StoreError::Serialization(e)) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable session meta");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(metas)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let had_frames = Self::remove_optional(&self.frames_path(key))?;
        let had_meta = Self::remove_optional(&self.meta_path(key))?;
        Ok(had_frames || had_meta)
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let keys = self.session_keys()?;
        let mut removed = 0;
        for key in &keys {
            if self.delete(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn ping(&self) -> Result<(), StoreError> {
        if fs::metadata(&self.data_dir)?.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Io(std::io::Error::new(
                ErrorKind::NotADirectory,
                format!("{} is not a directory", self.data_dir.display()),
            )))
        }
    }
}
