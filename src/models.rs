use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a monitored subject. In practice this is the Telegram chat id
/// that owns the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub i64);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubjectId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(SubjectId)
    }
}

impl From<i64> for SubjectId {
    fn from(id: i64) -> Self {
        SubjectId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
}

impl Status {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable { Status::Up } else { Status::Down }
    }

    pub fn is_up(self) -> bool {
        matches!(self, Status::Up)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Up => write!(f, "up"),
            Status::Down => write!(f, "down"),
        }
    }
}

/// A logged state change. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub status: Status,
    pub detail: String,
}

impl Event {
    pub fn new(status: Status, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            detail: detail.into(),
        }
    }

    pub fn at(timestamp: DateTime<Utc>, status: Status, detail: impl Into<String>) -> Self {
        Self {
            timestamp,
            status,
            detail: detail.into(),
        }
    }
}

/// Shortest check interval accepted. Half of it is the smallest probe budget,
/// which must still leave room for a one second reply wait.
pub const MIN_INTERVAL_SECS: u64 = 5;

fn default_interval_secs() -> u64 {
    60
}

fn default_notifications() -> bool {
    true
}

/// Per-subject settings. Last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_notifications")]
    pub notifications_enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default)]
    pub target: Option<String>,
    /// Whether monitoring should be resumed when the process restarts.
    #[serde(default)]
    pub monitoring_active: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            notifications_enabled: default_notifications(),
            check_interval_secs: default_interval_secs(),
            target: None,
            monitoring_active: false,
        }
    }
}

impl MonitorConfig {
    pub fn with_interval(check_interval_secs: u64) -> Self {
        Self {
            check_interval_secs,
            ..Self::default()
        }
    }

    /// Returns the target if it satisfies the start invariant: non-empty and
    /// free of whitespace.
    pub fn valid_target(&self) -> Option<&str> {
        self.target.as_deref().filter(|t| is_valid_target(t))
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.check_interval_secs.max(MIN_INTERVAL_SECS))
    }
}

pub fn is_valid_target(target: &str) -> bool {
    !target.is_empty() && !target.chars().any(char::is_whitespace)
}

/// Outcome of a change detection step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub subject: SubjectId,
    /// `None` for the first observation of a run with an empty log.
    pub previous: Option<Status>,
    pub current: Status,
    /// Time spent in the previous status, when known.
    pub duration: Option<Duration>,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl Transition {
    pub fn is_initial(&self) -> bool {
        self.previous.is_none()
    }
}

/// Downtime statistics over a trailing window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub window: Duration,
    /// Number of `down` events inside the window, paired or not.
    pub outage_count: usize,
    /// Number of down->up pairs the durations were derived from.
    pub paired_outages: usize,
    pub total_downtime: Duration,
    pub average_downtime: Duration,
    pub max_downtime: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_validation() {
        assert!(is_valid_target("example.com"));
        assert!(is_valid_target("192.168.0.1"));
        assert!(!is_valid_target(""));
        assert!(!is_valid_target("example .com"));
        assert!(!is_valid_target("example.com\n"));

        let mut cfg = MonitorConfig::default();
        assert_eq!(cfg.valid_target(), None);
        cfg.target = Some("host.example".to_string());
        assert_eq!(cfg.valid_target(), Some("host.example"));
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let cfg: MonitorConfig = toml::from_str("target = \"a.example\"").unwrap();
        assert!(cfg.notifications_enabled);
        assert_eq!(cfg.check_interval_secs, 60);
        assert!(!cfg.monitoring_active);
        assert_eq!(cfg.target.as_deref(), Some("a.example"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let event = Event::new(Status::Down, "lost");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"status\":\"down\""));
    }

    #[test]
    fn test_short_interval_is_clamped() {
        let cfg = MonitorConfig::with_interval(0);
        assert_eq!(cfg.interval(), std::time::Duration::from_secs(MIN_INTERVAL_SECS));
        let cfg = MonitorConfig::with_interval(2);
        assert_eq!(cfg.interval(), std::time::Duration::from_secs(MIN_INTERVAL_SECS));
        assert_eq!(MonitorConfig::with_interval(90).interval().as_secs(), 90);
    }
}
