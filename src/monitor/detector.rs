use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::models::{Event, Status, SubjectId, Transition};
use crate::storage::EventStore;

/// In-memory view of a subject's status for the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoringState {
    pub last_known: Option<Status>,
    pub last_transition: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    /// Down observations since the last transition, excluding the transition
    /// itself.
    pub consecutive_down: u32,
}

/// Turns a stream of probe results into logged transitions.
///
/// Each subject is observed by a single task, so state is only keyed per
/// subject. The event store is shared by all subjects.
pub struct ChangeDetector {
    events: Arc<dyn EventStore>,
    states: DashMap<SubjectId, MonitoringState>,
}

impl ChangeDetector {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self {
            events,
            states: DashMap::new(),
        }
    }

    /// Forgets the in-memory state so the next observation re-seeds it from
    /// the durable log.
    pub fn reset(&self, subject: SubjectId) {
        self.states.remove(&subject);
    }

    pub fn state(&self, subject: SubjectId) -> Option<MonitoringState> {
        self.states.get(&subject).map(|state| state.clone())
    }

    fn seed(&self, subject: SubjectId) -> MonitoringState {
        match self.events.last(subject) {
            Ok(Some(event)) => {
                debug!(subject = %subject, status = %event.status, "Seeded status from event log.");
                MonitoringState {
                    last_known: Some(event.status),
                    last_transition: Some(event.timestamp),
                    ..MonitoringState::default()
                }
            }
            Ok(None) => MonitoringState::default(),
            Err(e) => {
                warn!(subject = %subject, error = %e, "Failed to read event log, starting without a baseline.");
                MonitoringState::default()
            }
        }
    }

    pub fn observe(&self, subject: SubjectId, reachable: bool, detail: &str) -> Option<Transition> {
        self.observe_at(subject, reachable, detail, Utc::now())
    }

    pub fn observe_at(
        &self,
        subject: SubjectId,
        reachable: bool,
        detail: &str,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        let mut state = self
            .states
            .get(&subject)
            .map(|state| state.clone())
            .unwrap_or_else(|| self.seed(subject));
        let current = Status::from_reachable(reachable);
        state.last_check = Some(now);

        let transition = match state.last_known {
            None => Some(Transition {
                subject,
                previous: None,
                current,
                duration: None,
                detail: detail.to_string(),
                at: now,
            }),
            Some(previous) if previous != current => Some(Transition {
                subject,
                previous: Some(previous),
                current,
                duration: state.last_transition.map(|since| now - since),
                detail: detail.to_string(),
                at: now,
            }),
            Some(_) => None,
        };

        match &transition {
            Some(_) => {
                // A lost append only costs durability; the transition is still reported.
                if let Err(e) = self.events.append(subject, Event::at(now, current, detail)) {
                    error!(subject = %subject, status = %current, error = %e, "Failed to append event.");
                }
                state.last_known = Some(current);
                state.last_transition = Some(now);
                state.consecutive_down = 0;
            }
            None if current == Status::Down => state.consecutive_down += 1,
            None => state.consecutive_down = 0,
        }

        self.states.insert(subject, state);
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileEventStore, StoreError};
    use chrono::Duration;

    fn detector() -> (tempfile::TempDir, Arc<FileEventStore>, ChangeDetector) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileEventStore::new(dir.path()));
        let detector = ChangeDetector::new(store.clone());
        (dir, store, detector)
    }

    #[test]
    fn test_only_changes_are_logged() {
        let (_dir, store, detector) = detector();
        let subject = SubjectId(1);

        let transitions: Vec<_> = [true, true, true, false, false, true]
            .into_iter()
            .filter_map(|reachable| detector.observe(subject, reachable, "probe"))
            .collect();

        assert_eq!(transitions.len(), 3);
        assert!(transitions[0].is_initial());
        assert_eq!(transitions[1].previous, Some(Status::Up));
        assert_eq!(transitions[1].current, Status::Down);
        assert_eq!(transitions[2].current, Status::Up);

        let statuses: Vec<_> = store.load(subject).unwrap().iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![Status::Up, Status::Down, Status::Up]);
    }

    #[test]
    fn test_baseline_seeded_from_log() {
        let (_dir, store, detector) = detector();
        let subject = SubjectId(2);
        let went_down = Utc::now() - Duration::minutes(30);
        store.append(subject, Event::at(went_down, Status::Down, "no reply")).unwrap();

        let transition = detector.observe(subject, true, "avg 9.0 ms").unwrap();
        assert!(!transition.is_initial());
        assert_eq!(transition.previous, Some(Status::Down));
        assert!(transition.duration.unwrap() >= Duration::minutes(30));
        assert_eq!(store.load(subject).unwrap().len(), 2);
    }

    #[test]
    fn test_reset_reseeds_from_log() {
        let (_dir, store, detector) = detector();
        let subject = SubjectId(3);

        detector.observe(subject, true, "up");
        // The durable record changes behind the detector's back.
        store.append(subject, Event::new(Status::Down, "external")).unwrap();
        assert!(detector.observe(subject, true, "up").is_none());

        detector.reset(subject);
        let transition = detector.observe(subject, true, "up").unwrap();
        assert_eq!(transition.previous, Some(Status::Down));
    }

    #[test]
    fn test_duration_measured_between_transitions() {
        let (_dir, _store, detector) = detector();
        let subject = SubjectId(4);
        let t0 = Utc::now();

        assert!(detector.observe_at(subject, true, "", t0).unwrap().duration.is_none());
        let down = detector
            .observe_at(subject, false, "", t0 + Duration::minutes(5))
            .unwrap();
        assert_eq!(down.duration, Some(Duration::minutes(5)));
        let up = detector
            .observe_at(subject, true, "", t0 + Duration::minutes(12))
            .unwrap();
        assert_eq!(up.duration, Some(Duration::minutes(7)));
    }

    #[test]
    fn test_consecutive_down_counter() {
        let (_dir, _store, detector) = detector();
        let subject = SubjectId(5);

        detector.observe(subject, false, "");
        assert_eq!(detector.state(subject).unwrap().consecutive_down, 0);
        detector.observe(subject, false, "");
        detector.observe(subject, false, "");
        assert_eq!(detector.state(subject).unwrap().consecutive_down, 2);
        detector.observe(subject, true, "");
        assert_eq!(detector.state(subject).unwrap().consecutive_down, 0);
    }

    struct FailingStore;

    impl EventStore for FailingStore {
        fn load(&self, _subject: SubjectId) -> Result<Vec<Event>, StoreError> {
            Err(std::io::Error::other("disk gone").into())
        }

        fn append(&self, _subject: SubjectId, _event: Event) -> Result<(), StoreError> {
            Err(std::io::Error::other("disk gone").into())
        }

        fn clear(&self, _subject: SubjectId) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_append_still_reports_transition() {
        let detector = ChangeDetector::new(Arc::new(FailingStore));
        let subject = SubjectId(6);

        assert!(detector.observe(subject, true, "").unwrap().is_initial());
        assert!(detector.observe(subject, true, "").is_none());
        let transition = detector.observe(subject, false, "").unwrap();
        assert_eq!(transition.previous, Some(Status::Up));
    }
}
