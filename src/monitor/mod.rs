/// Availability monitoring: change detection, per-subject scheduling and
/// downtime statistics.
pub mod detector;
pub mod scheduler;
pub mod stats;

pub use detector::{ChangeDetector, MonitoringState};
pub use scheduler::{MonitorError, MonitoringScheduler, SchedulerError, SchedulerSettings};
pub use stats::{StatsEngine, StatsError};
