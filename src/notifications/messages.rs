//! User-facing message texts.
use chrono::{DateTime, Duration, Utc};

use crate::models::{Event, Stats, Status, Transition};

fn status_line(status: Status) -> &'static str {
    match status {
        Status::Up => "🟢 Host is UP",
        Status::Down => "🔴 Host is DOWN",
    }
}

fn clock(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Renders a duration as `2d 3h 4m`, `3h 4m`, `4m 5s` or `5s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (days, hours, mins, secs) = (secs / 86_400, secs % 86_400 / 3600, secs % 3600 / 60, secs % 60);
    match (days, hours, mins) {
        (0, 0, 0) => format!("{secs}s"),
        (0, 0, _) => format!("{mins}m {secs}s"),
        (0, _, _) => format!("{hours}h {mins}m"),
        _ => format!("{days}d {hours}h {mins}m"),
    }
}

pub fn transition(transition: &Transition) -> String {
    if transition.is_initial() {
        return format!(
            "Monitoring active. Current status:\n{}\n{}",
            status_line(transition.current),
            transition.detail
        );
    }

    let mut text = format!(
        "Status changed!\n{}\nAt: {}\n{}",
        status_line(transition.current),
        clock(transition.at),
        transition.detail
    );
    if let (Some(previous), Some(duration)) = (transition.previous, transition.duration) {
        let label = match previous {
            Status::Up => "Was up for",
            Status::Down => "Outage lasted",
        };
        text.push_str(&format!("\n{label}: {}", format_duration(duration)));
    }
    text
}

pub fn reminder(down_for: Option<Duration>, consecutive_down: u32) -> String {
    match down_for {
        Some(elapsed) => format!(
            "⚠️ Reminder: host is still DOWN\nDown for: {} ({consecutive_down} checks)",
            format_duration(elapsed)
        ),
        None => format!("⚠️ Reminder: host is still DOWN ({consecutive_down} checks)"),
    }
}

pub fn probe_result(reachable: bool, detail: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}\n{detail}\nChecked: {}",
        status_line(Status::from_reachable(reachable)),
        clock(at)
    )
}

pub fn stats(stats: &Stats) -> String {
    format!(
        "Downtime over the last {}:\nOutages: {}\nTotal downtime: {}\nAverage outage: {}\nLongest outage: {}",
        format_duration(stats.window),
        stats.outage_count,
        format_duration(stats.total_downtime),
        format_duration(stats.average_downtime),
        format_duration(stats.max_downtime),
    )
}

pub fn event_line(event: &Event) -> String {
    let icon = if event.status.is_up() { "🟢" } else { "🔴" };
    format!("{icon} {} {} ({})", clock(event.timestamp), event.status, event.detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubjectId;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(5)), "5s");
        assert_eq!(format_duration(Duration::seconds(65)), "1m 5s");
        assert_eq!(format_duration(Duration::minutes(125)), "2h 5m");
        assert_eq!(format_duration(Duration::hours(49)), "2d 1h 0m");
        assert_eq!(format_duration(Duration::seconds(-3)), "0s");
    }

    #[test]
    fn test_transition_message_includes_outage_length() {
        let t = Transition {
            subject: SubjectId(1),
            previous: Some(Status::Down),
            current: Status::Up,
            duration: Some(Duration::minutes(42)),
            detail: "avg 12.0 ms, 0% loss".to_string(),
            at: Utc::now(),
        };
        let text = transition(&t);
        assert!(text.contains("Host is UP"));
        assert!(text.contains("Outage lasted: 42m 0s"));
    }

    #[test]
    fn test_initial_message() {
        let t = Transition {
            subject: SubjectId(1),
            previous: None,
            current: Status::Down,
            duration: None,
            detail: "no reply".to_string(),
            at: Utc::now(),
        };
        let text = transition(&t);
        assert!(text.starts_with("Monitoring active"));
        assert!(text.contains("Host is DOWN"));
    }
}
