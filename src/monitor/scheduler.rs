//! Owns one cancellable monitoring task per subject.
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::detector::ChangeDetector;
use crate::models::{MonitorConfig, Status, SubjectId};
use crate::notifications::{Notifier, messages};
use crate::probe::{ProbeError, ProbeOutcome, Prober};
use crate::storage::{ConfigStore, StoreError};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Subject {0} has no valid target configured")]
    InvalidTarget(SubjectId),
    #[error("Failed to load config for subject {0}: {1}")]
    Config(SubjectId, #[source] StoreError),
}

/// Why a monitoring task gave up.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("config unreadable after {attempts} attempts: {source}")]
    ConfigUnavailable {
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error("target is missing or invalid")]
    InvalidTarget,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Upper bound for one probe. Always capped below the check interval.
    pub probe_timeout: Duration,
    pub probe_samples: u32,
    /// Pause after a failed cycle.
    pub backoff: Duration,
    pub notify_on_initial: bool,
    /// Send a reminder every N consecutive down cycles; 0 disables.
    pub reminder_every_cycles: u32,
    /// Consecutive config read failures after which the task stops.
    pub max_config_failures: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            probe_samples: 3,
            backoff: Duration::from_secs(60),
            notify_on_initial: true,
            reminder_every_cycles: 0,
            max_config_failures: 3,
        }
    }
}

/// Effective probe timeout: the configured one, but never more than half the
/// check interval.
pub fn probe_timeout(configured: Duration, interval: Duration) -> Duration {
    configured.min(interval / 2)
}

struct MonitorHandle {
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    fn is_live(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.join.is_finished()
    }

    fn signal_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // The receiver is gone if the task already exited.
        let _ = self.shutdown_tx.send(true);
    }
}

/// Clears the running flag however the task exits, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Everything a monitoring task needs, shared by all tasks.
struct Worker {
    configs: Arc<dyn ConfigStore>,
    prober: Arc<dyn Prober>,
    detector: Arc<ChangeDetector>,
    notifier: Arc<dyn Notifier>,
    settings: SchedulerSettings,
}

pub struct MonitoringScheduler {
    worker: Arc<Worker>,
    tasks: Mutex<HashMap<SubjectId, MonitorHandle>>,
}

impl MonitoringScheduler {
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        prober: Arc<dyn Prober>,
        detector: Arc<ChangeDetector>,
        notifier: Arc<dyn Notifier>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            worker: Arc::new(Worker {
                configs,
                prober,
                detector,
                notifier,
                settings,
            }),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Starts monitoring `subject`. Returns `Ok(false)` when a live task
    /// already exists.
    pub async fn start(&self, subject: SubjectId) -> Result<bool, SchedulerError> {
        let mut tasks = self.tasks.lock().await;
        if tasks.get(&subject).is_some_and(MonitorHandle::is_live) {
            debug!(subject = %subject, "Monitoring already running.");
            return Ok(false);
        }

        let config = self
            .worker
            .configs
            .load(subject)
            .map_err(|e| SchedulerError::Config(subject, e))?;
        if config.valid_target().is_none() {
            return Err(SchedulerError::InvalidTarget(subject));
        }

        // A stopped task may still be finishing its last cycle. Its successor
        // waits for it inside the new task, so the registry lock is never
        // held across that wait.
        let previous = tasks.remove(&subject).map(|handle| {
            handle.signal_stop();
            handle.join
        });
        tasks.insert(subject, self.spawn(subject, previous));
        Ok(true)
    }

    /// Asks the subject's task to stop at its next loop boundary. Returns
    /// whether a live task was signalled.
    pub async fn stop(&self, subject: SubjectId) -> bool {
        let tasks = self.tasks.lock().await;
        match tasks.get(&subject) {
            Some(handle) if handle.is_live() => {
                info!(subject = %subject, "Stopping monitoring task.");
                handle.signal_stop();
                true
            }
            _ => false,
        }
    }

    pub async fn is_running(&self, subject: SubjectId) -> bool {
        self.tasks
            .lock()
            .await
            .get(&subject)
            .is_some_and(MonitorHandle::is_live)
    }

    pub async fn running_subjects(&self) -> Vec<SubjectId> {
        let tasks = self.tasks.lock().await;
        let mut subjects: Vec<SubjectId> = tasks
            .iter()
            .filter(|(_, handle)| handle.is_live())
            .map(|(subject, _)| *subject)
            .collect();
        subjects.sort();
        subjects
    }

    /// Stops every task and waits for all of them to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<(SubjectId, MonitorHandle)> = self.tasks.lock().await.drain().collect();
        info!(count = handles.len(), "Shutting down monitoring tasks.");
        for (_, handle) in &handles {
            handle.signal_stop();
        }
        for (subject, handle) in handles {
            if let Err(e) = handle.join.await {
                warn!(subject = %subject, error = %e, "Monitoring task ended abnormally.");
            }
        }
    }

    fn spawn(&self, subject: SubjectId, previous: Option<JoinHandle<()>>) -> MonitorHandle {
        let running = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = self.worker.clone();
        let flag = running.clone();

        let join = tokio::spawn(async move {
            let _guard = RunningGuard(flag.clone());
            if let Some(previous) = previous {
                debug!(subject = %subject, "Waiting for the previous task to finish its cycle.");
                if let Err(e) = previous.await {
                    warn!(subject = %subject, error = %e, "Previous monitoring task ended abnormally.");
                }
            }
            info!(subject = %subject, "Monitoring task started.");
            match worker.run(subject, &flag, shutdown_rx).await {
                Ok(()) => info!(subject = %subject, "Monitoring task stopped."),
                Err(e) => error!(subject = %subject, error = %e, "Monitoring task terminated."),
            }
        });

        MonitorHandle {
            running,
            shutdown_tx,
            join,
        }
    }
}

/// Sleeps for `duration` unless a stop is signalled first. Returns `false`
/// when the task should exit.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow_and_update() {
        return false;
    }
    tokio::select! {
        biased;
        // Either a stop signal or a dropped sender.
        _ = shutdown.changed() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

impl Worker {
    async fn run(
        &self,
        subject: SubjectId,
        running: &AtomicBool,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), MonitorError> {
        // Start from the durable record, never from a previous run's memory.
        self.detector.reset(subject);
        let mut config_failures = 0;

        while running.load(Ordering::SeqCst) {
            let config = match self.configs.load(subject) {
                Ok(config) => {
                    config_failures = 0;
                    config
                }
                Err(e) => {
                    config_failures += 1;
                    if config_failures >= self.settings.max_config_failures {
                        return Err(MonitorError::ConfigUnavailable {
                            attempts: config_failures,
                            source: e,
                        });
                    }
                    warn!(subject = %subject, attempt = config_failures, error = %e, "Failed to read config, backing off.");
                    if !pause(self.settings.backoff, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            let Some(target) = config.valid_target() else {
                return Err(MonitorError::InvalidTarget);
            };
            let interval = config.interval();
            let timeout = probe_timeout(self.settings.probe_timeout, interval);

            let outcome = tokio::time::timeout(
                timeout,
                self.prober.probe(target, timeout, self.settings.probe_samples),
            )
            .await
            .unwrap_or(Err(ProbeError::Timeout(timeout)));

            let next = match outcome {
                Ok(outcome) => {
                    self.handle_outcome(subject, &config, outcome).await;
                    interval
                }
                Err(e) => {
                    warn!(subject = %subject, target = %target, error = %e, "Probe failed, backing off.");
                    self.settings.backoff
                }
            };

            if !pause(next, &mut shutdown).await {
                break;
            }
        }
        Ok(())
    }

    async fn handle_outcome(&self, subject: SubjectId, config: &MonitorConfig, outcome: ProbeOutcome) {
        debug!(subject = %subject, reachable = outcome.reachable, detail = %outcome.detail, "Probe finished.");

        let Some(transition) = self
            .detector
            .observe(subject, outcome.reachable, &outcome.detail)
        else {
            self.maybe_remind(subject, config).await;
            return;
        };

        info!(
            subject = %subject,
            from = ?transition.previous,
            to = %transition.current,
            "Status transition detected."
        );
        if !config.notifications_enabled {
            return;
        }
        if transition.is_initial() && !self.settings.notify_on_initial {
            debug!(subject = %subject, "Initial notification suppressed.");
            return;
        }
        self.notify(subject, &messages::transition(&transition)).await;
    }

    async fn maybe_remind(&self, subject: SubjectId, config: &MonitorConfig) {
        let every = self.settings.reminder_every_cycles;
        if every == 0 || !config.notifications_enabled {
            return;
        }
        let Some(state) = self.detector.state(subject) else {
            return;
        };
        if state.last_known == Some(Status::Down)
            && state.consecutive_down > 0
            && state.consecutive_down % every == 0
        {
            let down_for = state.last_transition.map(|since| Utc::now() - since);
            self.notify(subject, &messages::reminder(down_for, state.consecutive_down))
                .await;
        }
    }

    async fn notify(&self, subject: SubjectId, message: &str) {
        if let Err(e) = self.notifier.send(subject, message).await {
            warn!(subject = %subject, error = %e, "Failed to deliver notification.");
        }
    }
}
