use crate::models::MIN_INTERVAL_SECS;

/// A chat command understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    /// One-off probe of the configured target.
    Status,
    StartMonitoring,
    StopMonitoring,
    History,
    Stats { hours: u64 },
    Interval(u64),
    Target(String),
    Notifications(bool),
    Clear,
    /// A known command used with bad arguments; carries the usage hint.
    Invalid(&'static str),
    Unknown,
}

pub const DEFAULT_STATS_HOURS: u64 = 24;

const INTERVAL_USAGE: &str = "Usage: /interval <seconds>, at least 5 seconds";

impl Command {
    pub fn parse(text: &str) -> Self {
        let mut parts = text.split_whitespace();
        let Some(head) = parts.next() else {
            return Command::Unknown;
        };
        // "/status@some_bot" addresses a specific bot in group chats.
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let arg = parts.next();
        let extra = parts.next().is_some();

        match (name.as_str(), arg, extra) {
            ("/start" | "/help", _, _) => Command::Help,
            ("/status" | "/check", None, _) => Command::Status,
            ("/monitor" | "/start_monitoring", None, _) => Command::StartMonitoring,
            ("/stop" | "/stop_monitoring", None, _) => Command::StopMonitoring,
            ("/history", None, _) => Command::History,
            ("/stats", None, _) => Command::Stats {
                hours: DEFAULT_STATS_HOURS,
            },
            ("/stats", Some(hours), false) => match hours.parse::<u64>() {
                Ok(hours) if hours > 0 => Command::Stats { hours },
                _ => Command::Invalid("Usage: /stats [hours], hours > 0"),
            },
            ("/stats", _, _) => Command::Invalid("Usage: /stats [hours], hours > 0"),
            ("/interval", Some(secs), false) => match secs.parse::<u64>() {
                Ok(secs) if secs >= MIN_INTERVAL_SECS => Command::Interval(secs),
                _ => Command::Invalid(INTERVAL_USAGE),
            },
            ("/interval", _, _) => Command::Invalid(INTERVAL_USAGE),
            ("/target", Some(host), false) => Command::Target(host.to_string()),
            ("/target", _, _) => Command::Invalid("Usage: /target <host or IP>"),
            ("/notify", Some(flag), false) => match flag.to_ascii_lowercase().as_str() {
                "on" => Command::Notifications(true),
                "off" => Command::Notifications(false),
                _ => Command::Invalid("Usage: /notify on|off"),
            },
            ("/notify", _, _) => Command::Invalid("Usage: /notify on|off"),
            ("/clear", None, _) => Command::Clear,
            _ => Command::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("/start"), Command::Help);
        assert_eq!(Command::parse("/status"), Command::Status);
        assert_eq!(Command::parse("/status@light_bot"), Command::Status);
        assert_eq!(Command::parse("/start_monitoring"), Command::StartMonitoring);
        assert_eq!(Command::parse("/STOP"), Command::StopMonitoring);
        assert_eq!(Command::parse("/clear"), Command::Clear);
        assert_eq!(Command::parse("hello"), Command::Unknown);
        assert_eq!(Command::parse("   "), Command::Unknown);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(Command::parse("/stats"), Command::Stats { hours: 24 });
        assert_eq!(Command::parse("/stats 168"), Command::Stats { hours: 168 });
        assert!(matches!(Command::parse("/stats 0"), Command::Invalid(_)));
        assert_eq!(Command::parse("/interval 90"), Command::Interval(90));
        assert!(matches!(Command::parse("/interval"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/interval -5"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/interval 2"), Command::Invalid(_)));
        assert_eq!(Command::parse("/interval 5"), Command::Interval(5));
        assert_eq!(
            Command::parse("/target home.example.net"),
            Command::Target("home.example.net".to_string())
        );
        assert!(matches!(Command::parse("/target two words"), Command::Invalid(_)));
        assert_eq!(Command::parse("/notify OFF"), Command::Notifications(false));
        assert!(matches!(Command::parse("/notify maybe"), Command::Invalid(_)));
    }
}
