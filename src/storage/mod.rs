//! Per-subject persistence for monitor settings and the transition log.
//!
//! Every subject owns its own files, so writers for different subjects never
//! contend. Writes for one subject are serialized through a per-subject lock
//! and land through an atomic rename.
use dashmap::DashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::models::{Event, MonitorConfig, SubjectId};

pub mod config_store;
pub mod event_store;

pub use config_store::FileConfigStore;
pub use event_store::FileEventStore;

/// Maximum number of events retained per subject.
pub const EVENT_LOG_CAP: usize = 1000;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to (de)serialize event log: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse config: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("Failed to persist file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub trait ConfigStore: Send + Sync {
    /// Loads the subject's config. A subject without a stored config gets the
    /// defaults; unreadable or corrupt files are errors.
    fn load(&self, subject: SubjectId) -> Result<MonitorConfig, StoreError>;

    fn save(&self, subject: SubjectId, config: &MonitorConfig) -> Result<(), StoreError>;

    /// All subjects that have a stored config.
    fn subjects(&self) -> Result<Vec<SubjectId>, StoreError>;
}

pub trait EventStore: Send + Sync {
    /// Events in append order. Empty for an unknown subject.
    fn load(&self, subject: SubjectId) -> Result<Vec<Event>, StoreError>;

    /// Appends one event, evicting the oldest ones beyond [`EVENT_LOG_CAP`].
    fn append(&self, subject: SubjectId, event: Event) -> Result<(), StoreError>;

    fn clear(&self, subject: SubjectId) -> Result<(), StoreError>;

    fn last(&self, subject: SubjectId) -> Result<Option<Event>, StoreError> {
        Ok(self.load(subject)?.pop())
    }
}

/// Hands out one lock per subject so that read-modify-write cycles on a
/// subject's file are serialized without a global lock.
#[derive(Debug, Default)]
pub(crate) struct SubjectLocks {
    locks: DashMap<SubjectId, Arc<Mutex<()>>>,
}

impl SubjectLocks {
    pub(crate) fn get(&self, subject: SubjectId) -> Arc<Mutex<()>> {
        self.locks
            .entry(subject)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Writes `contents` to a temporary file next to `path` and renames it into
/// place, so readers see either the old or the new file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
