use super::TrainingJob;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job store contents are malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Durable home of the training job collection.
pub trait JobStore: Send + Sync {
    fn load(&self) -> Result<Vec<TrainingJob>, StoreError>;

    fn save(&self, jobs: &[TrainingJob]) -> Result<(), StoreError>;
}

pub fn encode_jobs(jobs: &[TrainingJob]) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(jobs)?)
}

/// Blank input decodes to an empty collection.
pub fn decode_jobs(raw: &str) -> Result<Vec<TrainingJob>, StoreError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(raw)?)
}

/// JSON array in a single file.
pub struct FileJobStore {
    path: PathBuf,
}

impl FileJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JobStore for FileJobStore {
    fn load(&self) -> Result<Vec<TrainingJob>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        decode_jobs(&raw)
    }

    fn save(&self, jobs: &[TrainingJob]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = encode_jobs(jobs)?;
        fs::write(&self.path, json)?;
        tracing::debug!("Saved {} training jobs to {:?}", jobs.len(), self.path);
        Ok(())
    }
}

/// Keeps the serialized collection in memory, the way a browser keeps a storage key.
#[derive(Default)]
pub struct MemoryJobStore {
    raw: Mutex<Option<String>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.raw.lock().clone()
    }
}

impl JobStore for MemoryJobStore {
    fn load(&self) -> Result<Vec<TrainingJob>, StoreError> {
        match self.raw.lock().as_deref() {
            Some(raw) => decode_jobs(raw),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, jobs: &[TrainingJob]) -> Result<(), StoreError> {
        let json = encode_jobs(jobs)?;
        *self.raw.lock() = Some(json);
        Ok(())
    }
}
