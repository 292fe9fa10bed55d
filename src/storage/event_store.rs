use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{EVENT_LOG_CAP, EventStore, StoreError, SubjectLocks, write_atomic};
use crate::models::{Event, SubjectId};

/// Event log kept as one JSON array per subject under `<root>/events/`.
#[derive(Debug)]
pub struct FileEventStore {
    dir: PathBuf,
    cap: usize,
    locks: SubjectLocks,
}

impl FileEventStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self::with_cap(data_dir, EVENT_LOG_CAP)
    }

    pub fn with_cap(data_dir: impl AsRef<Path>, cap: usize) -> Self {
        Self {
            dir: data_dir.as_ref().join("events"),
            cap: cap.max(1),
            locks: SubjectLocks::default(),
        }
    }

    fn path_for(&self, subject: SubjectId) -> PathBuf {
        self.dir.join(format!("{subject}.json"))
    }

    /// Reads the log. A log that no longer parses is moved aside to
    /// `<subject>.json.corrupt` and the subject starts over with an empty one.
    fn read(&self, subject: SubjectId) -> Result<Vec<Event>, StoreError> {
        let path = self.path_for(subject);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_slice(&bytes) {
            Ok(events) => Ok(events),
            Err(e) => {
                let aside = path.with_extension("json.corrupt");
                warn!(subject = %subject, error = %e, path = ?aside, "Event log is corrupt, moving it aside and starting empty.");
                fs::rename(&path, &aside)?;
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, subject: SubjectId, events: &[Event]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(events)?;
        write_atomic(&self.path_for(subject), &bytes)
    }
}

impl EventStore for FileEventStore {
    fn load(&self, subject: SubjectId) -> Result<Vec<Event>, StoreError> {
        let lock = self.locks.get(subject);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.read(subject)
    }

    fn append(&self, subject: SubjectId, event: Event) -> Result<(), StoreError> {
        let lock = self.locks.get(subject);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut events = self.read(subject)?;
        events.push(event);
        if events.len() > self.cap {
            let excess = events.len() - self.cap;
            events.drain(..excess);
            debug!(subject = %subject, evicted = excess, "Event log over capacity, evicted oldest events.");
        }
        self.write(subject, &events)
    }

    fn clear(&self, subject: SubjectId) -> Result<(), StoreError> {
        let lock = self.locks.get(subject);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match fs::remove_file(self.path_for(subject)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    #[test]
    fn test_load_unknown_subject_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path());
        assert!(store.load(SubjectId(1)).unwrap().is_empty());
        assert!(store.last(SubjectId(1)).unwrap().is_none());
    }

    #[test]
    fn test_append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path());
        let subject = SubjectId(7);

        store.append(subject, Event::new(Status::Up, "first")).unwrap();
        store.append(subject, Event::new(Status::Down, "second")).unwrap();

        let events = store.load(subject).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].detail, "first");
        assert_eq!(events[1].status, Status::Down);
        assert_eq!(store.last(subject).unwrap().unwrap().detail, "second");
    }

    #[test]
    fn test_cap_keeps_most_recent_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path());
        let subject = SubjectId(42);
        let t0 = Utc::now();

        for i in 0..1500 {
            let status = if i % 2 == 0 { Status::Up } else { Status::Down };
            store
                .append(subject, Event::at(t0 + Duration::seconds(i), status, i.to_string()))
                .unwrap();
        }

        let events = store.load(subject).unwrap();
        assert_eq!(events.len(), EVENT_LOG_CAP);
        assert_eq!(events.first().unwrap().detail, "500");
        assert_eq!(events.last().unwrap().detail, "1499");
        assert!(events.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_clear_removes_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path());
        let subject = SubjectId(3);

        store.append(subject, Event::new(Status::Up, "x")).unwrap();
        store.clear(subject).unwrap();
        assert!(store.load(subject).unwrap().is_empty());
        // Clearing an already empty log is fine.
        store.clear(subject).unwrap();
    }

    #[test]
    fn test_subjects_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileEventStore::new(dir.path()));

        let handles: Vec<_> = (0..4)
            .map(|n| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store
                            .append(SubjectId(n), Event::new(Status::Up, format!("{n}-{i}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for n in 0..4 {
            let events = store.load(SubjectId(n)).unwrap();
            assert_eq!(events.len(), 25);
            assert!(events.iter().all(|e| e.detail.starts_with(&format!("{n}-"))));
        }
    }

    #[test]
    fn test_corrupt_log_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path());
        let events_dir = dir.path().join("events");
        std::fs::create_dir_all(&events_dir).unwrap();
        std::fs::write(events_dir.join("9.json"), b"{truncated").unwrap();

        assert!(store.load(SubjectId(9)).unwrap().is_empty());
        assert_eq!(
            std::fs::read(events_dir.join("9.json.corrupt")).unwrap(),
            b"{truncated"
        );
        assert!(!events_dir.join("9.json").exists());
    }

    #[test]
    fn test_append_recovers_from_corrupt_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path());
        let subject = SubjectId(5);
        let events_dir = dir.path().join("events");
        std::fs::create_dir_all(&events_dir).unwrap();
        std::fs::write(events_dir.join("5.json"), b"{truncated").unwrap();

        store.append(subject, Event::new(Status::Down, "no reply")).unwrap();
        store.append(subject, Event::new(Status::Up, "avg 9 ms")).unwrap();

        let events = store.load(subject).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].detail, "no reply");
        assert!(events_dir.join("5.json.corrupt").exists());
    }
}
