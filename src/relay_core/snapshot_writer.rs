//! Atomic snapshot output
//!
//! The snapshot file is replaced by rename only, so a reader polling the path
//! sees either the previous complete document or the new one.

use crate::relay_core::window_buffer::WindowBuffer;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug)]
pub enum WriterError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    /// The temp file was written but could not be renamed onto the target
    Persist(std::io::Error),
}

impl From<std::io::Error> for WriterError {
    fn from(err: std::io::Error) -> Self {
        WriterError::Io(err)
    }
}

impl From<serde_json::Error> for WriterError {
    fn from(err: serde_json::Error) -> Self {
        WriterError::Serialization(err)
    }
}

impl From<tempfile::PersistError> for WriterError {
    fn from(err: tempfile::PersistError) -> Self {
        WriterError::Persist(err.error)
    }
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::Io(e) => write!(f, "IO error: {}", e),
            WriterError::Serialization(e) => write!(f, "Serialization error: {}", e),
            WriterError::Persist(e) => write!(f, "Failed to replace snapshot: {}", e),
        }
    }
}

impl std::error::Error for WriterError {}

/// The document written to the output path: `{"now":..,"aircraft":[..]}`.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub now: i64,
    pub aircraft: Vec<&'a Value>,
}

impl<'a> Snapshot<'a> {
    pub fn empty(now: i64) -> Self {
        Self {
            now,
            aircraft: Vec::new(),
        }
    }

    pub fn from_buffer(buffer: &'a WindowBuffer, now: i64, window_secs: i64) -> Self {
        Self {
            now,
            aircraft: buffer.merge(now, window_secs),
        }
    }
}

/// Write `value` as compact JSON to a temp file next to `path`, flush and sync
/// it, then rename it onto `path`.
pub fn atomic_write<T: Serialize>(path: &Path, value: &T) -> Result<(), WriterError> {
    let dir = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => {
            return Err(WriterError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("output path has no parent directory: {}", path.display()),
            )))
        }
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut tmp, value)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;

    Ok(())
}

/// Create the output directory if it does not exist yet.
pub fn ensure_parent_dir(path: &Path) -> Result<(), WriterError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub struct SnapshotWriter {
    path: PathBuf,
    window_secs: i64,
    last_write: Option<f64>,
    writes: u64,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>, window_secs: i64) -> Self {
        Self {
            path: path.into(),
            window_secs,
            last_write: None,
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time of the last successful merged write, in fractional epoch seconds.
    pub fn last_write(&self) -> Option<f64> {
        self.last_write
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Whether `min_interval_s` has passed since the last successful write.
    pub fn is_due(&self, now: f64, min_interval_s: f64) -> bool {
        match self.last_write {
            Some(last) => now - last >= min_interval_s,
            None => true,
        }
    }

    /// Write the merged buffer if the interval has elapsed.
    ///
    /// Returns `Ok(true)` when a snapshot was written. On error the last-write
    /// time is left alone so the next call tries again.
    pub fn maybe_write(
        &mut self,
        buffer: &WindowBuffer,
        now: f64,
        min_interval_s: f64,
    ) -> Result<bool, WriterError> {
        if !self.is_due(now, min_interval_s) {
            return Ok(false);
        }

        self.write_now(buffer, now.floor() as i64)?;
        self.last_write = Some(now);
        Ok(true)
    }

    /// Unconditionally write the merged buffer.
    pub fn write_now(&mut self, buffer: &WindowBuffer, now: i64) -> Result<(), WriterError> {
        let snapshot = Snapshot::from_buffer(buffer, now, self.window_secs);
        atomic_write(&self.path, &snapshot)?;
        self.writes += 1;

        log::debug!(
            "📝 Snapshot written: {} aircraft from {} batches",
            snapshot.aircraft.len(),
            buffer.len()
        );

        Ok(())
    }

    /// Replace the snapshot with an empty aircraft list.
    pub fn write_empty(&mut self, now: i64) -> Result<(), WriterError> {
        atomic_write(&self.path, &Snapshot::empty(now))?;
        self.writes += 1;
        Ok(())
    }
}
