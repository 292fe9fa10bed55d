use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::commands::Command;
use crate::models::{MonitorConfig, Status, SubjectId, is_valid_target};
use crate::monitor::scheduler::probe_timeout;
use crate::monitor::{
    ChangeDetector, MonitoringScheduler, SchedulerError, SchedulerSettings, StatsEngine, StatsError,
};
use crate::notifications::messages;
use crate::probe::Prober;
use crate::storage::{ConfigStore, EventStore};

const HISTORY_EVENTS: usize = 10;

/// Executes chat commands against the stores and the scheduler and returns
/// the reply text.
pub struct CommandHandler {
    configs: Arc<dyn ConfigStore>,
    events: Arc<dyn EventStore>,
    detector: Arc<ChangeDetector>,
    scheduler: Arc<MonitoringScheduler>,
    stats: StatsEngine,
    prober: Arc<dyn Prober>,
    settings: SchedulerSettings,
}

impl CommandHandler {
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        events: Arc<dyn EventStore>,
        detector: Arc<ChangeDetector>,
        scheduler: Arc<MonitoringScheduler>,
        prober: Arc<dyn Prober>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            stats: StatsEngine::new(events.clone()),
            configs,
            events,
            detector,
            scheduler,
            prober,
            settings,
        }
    }

    pub async fn handle(&self, subject: SubjectId, command: Command) -> String {
        info!(subject = %subject, command = ?command, "Handling command.");
        match command {
            Command::Help => self.help(subject),
            Command::Status => self.check_now(subject).await,
            Command::StartMonitoring => self.start_monitoring(subject).await,
            Command::StopMonitoring => self.stop_monitoring(subject).await,
            Command::History => self.history(subject).await,
            Command::Stats { hours } => self.stats(subject, hours),
            Command::Interval(secs) => self.update(subject, |cfg| cfg.check_interval_secs = secs)
                .map(|_| format!("Check interval set to {secs} s."))
                .unwrap_or_else(|e| e),
            Command::Target(target) => self.set_target(subject, target).await,
            Command::Notifications(enabled) => self
                .update(subject, |cfg| cfg.notifications_enabled = enabled)
                .map(|_| format!("Notifications {}.", if enabled { "enabled" } else { "disabled" }))
                .unwrap_or_else(|e| e),
            Command::Clear => match self.events.clear(subject) {
                Ok(()) => "History cleared.".to_string(),
                Err(e) => {
                    error!(subject = %subject, error = %e, "Failed to clear event log.");
                    "Failed to clear history.".to_string()
                }
            },
            Command::Invalid(usage) => usage.to_string(),
            Command::Unknown => "Unknown command. Use /help for the list of commands.".to_string(),
        }
    }

    /// The subject's config, falling back to defaults when it cannot be read.
    fn config(&self, subject: SubjectId) -> MonitorConfig {
        self.configs.load(subject).unwrap_or_else(|e| {
            warn!(subject = %subject, error = %e, "Failed to load config, using defaults.");
            MonitorConfig::default()
        })
    }

    fn update(
        &self,
        subject: SubjectId,
        change: impl FnOnce(&mut MonitorConfig),
    ) -> Result<MonitorConfig, String> {
        let mut config = self.config(subject);
        change(&mut config);
        self.configs.save(subject, &config).map_err(|e| {
            error!(subject = %subject, error = %e, "Failed to save config.");
            "Failed to save settings, please try again.".to_string()
        })?;
        Ok(config)
    }

    fn help(&self, subject: SubjectId) -> String {
        let config = self.config(subject);
        format!(
            "Host availability monitor\n\n\
             Target: {}\n\
             Check interval: {} s\n\
             Notifications: {}\n\n\
             /status - check the target now\n\
             /monitor - start monitoring\n\
             /stop - stop monitoring\n\
             /history - current state and recent changes\n\
             /stats [hours] - downtime statistics (default 24 h)\n\
             /target <host> - set the host to monitor\n\
             /interval <seconds> - set the check interval\n\
             /notify on|off - toggle notifications\n\
             /clear - clear the history",
            config.target.as_deref().unwrap_or("not set"),
            config.check_interval_secs,
            if config.notifications_enabled { "on" } else { "off" },
        )
    }

    async fn check_now(&self, subject: SubjectId) -> String {
        let config = self.config(subject);
        let Some(target) = config.valid_target() else {
            return "No target set. Use /target <host> first.".to_string();
        };
        let timeout = probe_timeout(self.settings.probe_timeout, config.interval());
        match self
            .prober
            .probe(target, timeout, self.settings.probe_samples)
            .await
        {
            Ok(outcome) => messages::probe_result(outcome.reachable, &outcome.detail, Utc::now()),
            Err(e) => format!("Check failed: {e}"),
        }
    }

    async fn start_monitoring(&self, subject: SubjectId) -> String {
        let config = self.config(subject);
        if config.valid_target().is_none() {
            return "No target set. Use /target <host> first.".to_string();
        }
        if let Err(reply) = self.update(subject, |cfg| cfg.monitoring_active = true) {
            return reply;
        }
        match self.scheduler.start(subject).await {
            Ok(true) => format!(
                "▶️ Monitoring started for {}.\nYou will be notified when its status changes.",
                config.target.as_deref().unwrap_or_default()
            ),
            Ok(false) => "Monitoring is already running.".to_string(),
            Err(e @ SchedulerError::InvalidTarget(_)) => format!("Cannot start monitoring: {e}"),
            Err(e) => {
                error!(subject = %subject, error = %e, "Failed to start monitoring.");
                "Cannot start monitoring right now, please try again.".to_string()
            }
        }
    }

    async fn stop_monitoring(&self, subject: SubjectId) -> String {
        let stopped = self.scheduler.stop(subject).await;
        if let Err(reply) = self.update(subject, |cfg| cfg.monitoring_active = false) {
            return reply;
        }
        if stopped {
            "⏹ Monitoring stopped.".to_string()
        } else {
            "Monitoring is not running.".to_string()
        }
    }

    async fn set_target(&self, subject: SubjectId, target: String) -> String {
        if !is_valid_target(&target) {
            return "The target must be a host name or IP address without spaces.".to_string();
        }
        if let Err(reply) = self.update(subject, |cfg| cfg.target = Some(target.clone())) {
            return reply;
        }

        // A new target needs a fresh task so the baseline is re-derived.
        if self.scheduler.stop(subject).await {
            if let Err(e) = self.scheduler.start(subject).await {
                error!(subject = %subject, error = %e, "Failed to restart monitoring after target change.");
                return format!("Target set to {target}, but monitoring could not be restarted.");
            }
            return format!("Target set to {target}. Monitoring restarted.");
        }
        format!("Target set to {target}.")
    }

    async fn history(&self, subject: SubjectId) -> String {
        let running = self.scheduler.is_running(subject).await;
        let state = self.detector.state(subject).unwrap_or_default();
        let events = self.events.load(subject).unwrap_or_else(|e| {
            warn!(subject = %subject, error = %e, "Failed to load event log.");
            Vec::new()
        });
        let current = state
            .last_known
            .or_else(|| events.last().map(|e| e.status));

        let mut text = format!(
            "Monitoring: {}\nCurrent status: {}\nLast check: {}\nLast change: {}\nConsecutive down checks: {}",
            if running { "running" } else { "stopped" },
            match current {
                Some(Status::Up) => "🟢 up",
                Some(Status::Down) => "🔴 down",
                None => "unknown",
            },
            state
                .last_check
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "none yet".to_string()),
            state
                .last_transition
                .or_else(|| events.last().map(|e| e.timestamp))
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "none yet".to_string()),
            state.consecutive_down,
        );

        if !events.is_empty() {
            text.push_str("\n\nRecent changes:");
            for event in events.iter().rev().take(HISTORY_EVENTS) {
                text.push('\n');
                text.push_str(&messages::event_line(event));
            }
        }
        text
    }

    fn stats(&self, subject: SubjectId, hours: u64) -> String {
        let window = ChronoDuration::hours(hours.min(24 * 365) as i64);
        match self.stats.compute_stats(subject, window) {
            Ok(stats) => messages::stats(&stats),
            Err(StatsError::InsufficientData) => {
                format!("Not enough data for the last {hours} h yet.")
            }
        }
    }
}
