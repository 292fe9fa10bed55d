use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{ConfigStore, StoreError, SubjectLocks, write_atomic};
use crate::models::{MonitorConfig, SubjectId};

/// Per-subject settings stored as `<root>/config/<subject>.toml`.
#[derive(Debug)]
pub struct FileConfigStore {
    dir: PathBuf,
    defaults: MonitorConfig,
    locks: SubjectLocks,
}

impl FileConfigStore {
    pub fn new(data_dir: impl AsRef<Path>, defaults: MonitorConfig) -> Self {
        Self {
            dir: data_dir.as_ref().join("config"),
            defaults,
            locks: SubjectLocks::default(),
        }
    }

    fn path_for(&self, subject: SubjectId) -> PathBuf {
        self.dir.join(format!("{subject}.toml"))
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self, subject: SubjectId) -> Result<MonitorConfig, StoreError> {
        let lock = self.locks.get(subject);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match fs::read_to_string(self.path_for(subject)) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(subject = %subject, "No stored config, using defaults.");
                Ok(self.defaults.clone())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, subject: SubjectId, config: &MonitorConfig) -> Result<(), StoreError> {
        let lock = self.locks.get(subject);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let contents = toml::to_string_pretty(config)?;
        write_atomic(&self.path_for(subject), contents.as_bytes())
    }

    fn subjects(&self) -> Result<Vec<SubjectId>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut subjects = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "toml") {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()).map(str::parse) {
                Some(Ok(subject)) => subjects.push(subject),
                _ => warn!(path = ?path, "Skipping config file with unexpected name."),
            }
        }
        subjects.sort();
        Ok(subjects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path(), MonitorConfig::with_interval(120));
        let cfg = store.load(SubjectId(5)).unwrap();
        assert_eq!(cfg.check_interval_secs, 120);
        assert!(cfg.target.is_none());
    }

    #[test]
    fn test_save_then_load_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path(), MonitorConfig::default());
        let subject = SubjectId(-100200);

        let mut cfg = MonitorConfig::default();
        cfg.target = Some("home.example.net".to_string());
        store.save(subject, &cfg).unwrap();

        cfg.check_interval_secs = 30;
        cfg.notifications_enabled = false;
        store.save(subject, &cfg).unwrap();

        assert_eq!(store.load(subject).unwrap(), cfg);
    }

    #[test]
    fn test_subjects_lists_saved_configs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path(), MonitorConfig::default());
        assert!(store.subjects().unwrap().is_empty());

        store.save(SubjectId(2), &MonitorConfig::default()).unwrap();
        store.save(SubjectId(1), &MonitorConfig::default()).unwrap();
        std::fs::write(dir.path().join("config/notes.txt"), "ignored").unwrap();

        assert_eq!(store.subjects().unwrap(), vec![SubjectId(1), SubjectId(2)]);
    }

    #[test]
    fn test_corrupt_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path(), MonitorConfig::default());
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join("config/8.toml"), "check_interval_secs = \"soon\"").unwrap();

        assert!(matches!(store.load(SubjectId(8)), Err(StoreError::TomlDecode(_))));
    }
}
