use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::models::{Event, Stats, Status, SubjectId};
use crate::storage::EventStore;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Not enough events in the window to compute statistics")]
    InsufficientData,
}

/// Derives downtime figures from a subject's event log.
pub struct StatsEngine {
    events: Arc<dyn EventStore>,
}

impl StatsEngine {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    /// An unreadable log counts as empty.
    pub fn compute_stats(&self, subject: SubjectId, window: Duration) -> Result<Stats, StatsError> {
        let events = self.events.load(subject).unwrap_or_else(|e| {
            warn!(subject = %subject, error = %e, "Failed to load event log, treating it as empty.");
            Vec::new()
        });
        compute_stats_at(&events, window, Utc::now())
    }
}

/// Computes statistics over the events inside `[now - window, now]`.
///
/// Outages are adjacent down/up pairs in the filtered slice. An outage that
/// began before the window, or is still open at `now`, contributes no
/// duration.
pub fn compute_stats_at(
    events: &[Event],
    window: Duration,
    now: DateTime<Utc>,
) -> Result<Stats, StatsError> {
    let start = now - window;
    let in_window: Vec<&Event> = events
        .iter()
        .filter(|e| e.timestamp >= start && e.timestamp <= now)
        .collect();
    if in_window.len() < 2 {
        return Err(StatsError::InsufficientData);
    }

    let durations: Vec<Duration> = in_window
        .windows(2)
        .filter(|pair| pair[0].status == Status::Down && pair[1].status == Status::Up)
        .map(|pair| pair[1].timestamp - pair[0].timestamp)
        .collect();
    if durations.is_empty() {
        return Err(StatsError::InsufficientData);
    }

    let total_downtime = durations.iter().fold(Duration::zero(), |acc, d| acc + *d);
    let max_downtime = durations.iter().copied().max().unwrap_or_else(Duration::zero);

    Ok(Stats {
        window,
        outage_count: in_window.iter().filter(|e| e.status == Status::Down).count(),
        paired_outages: durations.len(),
        total_downtime,
        average_downtime: total_downtime / durations.len() as i32,
        max_downtime,
    })
}
