//! Reachability probes.
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod icmp;
pub mod system;

pub use icmp::IcmpProber;
pub use system::SystemPingProber;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Failed to resolve {0}")]
    Resolution(String),
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("Probe tool unavailable: {0}")]
    Unavailable(String),
}

/// Smallest total probe budget that still fits a one second reply wait.
pub const MIN_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Share of the probe budget adapters may spend waiting for replies. The rest
/// covers resolution and process startup so a silent host reports down
/// before the hard timeout fires.
pub(crate) fn reply_budget(timeout: Duration) -> Duration {
    timeout - timeout / 5
}

/// Aggregated result of one probe invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub reachable: bool,
    /// Human-readable latency/loss summary.
    pub detail: String,
}

impl ProbeOutcome {
    pub fn up(detail: impl Into<String>) -> Self {
        Self {
            reachable: true,
            detail: detail.into(),
        }
    }

    pub fn down(detail: impl Into<String>) -> Self {
        Self {
            reachable: false,
            detail: detail.into(),
        }
    }

    /// Builds an outcome from per-sample round trip times, `None` meaning a
    /// lost packet. The target counts as reachable if any sample got a reply.
    pub fn from_samples(samples: &[Option<Duration>]) -> Self {
        let replies: Vec<Duration> = samples.iter().flatten().copied().collect();
        let sent = samples.len().max(1);
        let loss = (sent - replies.len()) * 100 / sent;

        if replies.is_empty() {
            return Self::down(format!("no reply, {loss}% loss"));
        }
        let avg_ms = replies.iter().map(Duration::as_secs_f64).sum::<f64>() * 1000.0
            / replies.len() as f64;
        Self::up(format!("avg {avg_ms:.1} ms, {loss}% loss"))
    }
}

/// A reachability check for one target.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probes `target` with `samples` echo requests, spending at most
    /// `timeout` in total.
    async fn probe(
        &self,
        target: &str,
        timeout: Duration,
        samples: u32,
    ) -> Result<ProbeOutcome, ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeBackend {
    /// Raw ICMP echo through `surge-ping`. Needs ping socket permissions.
    Icmp,
    /// The system `ping` binary.
    #[default]
    System,
}

impl std::str::FromStr for ProbeBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "icmp" => Ok(ProbeBackend::Icmp),
            "system" => Ok(ProbeBackend::System),
            other => Err(format!("Unknown probe backend: {other}")),
        }
    }
}

pub fn build_prober(backend: ProbeBackend) -> Arc<dyn Prober> {
    match backend {
        ProbeBackend::Icmp => Arc::new(IcmpProber::new()),
        ProbeBackend::System => Arc::new(SystemPingProber::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_budget_leaves_slack() {
        assert_eq!(reply_budget(Duration::from_secs(5)), Duration::from_secs(4));
        assert!(reply_budget(MIN_PROBE_TIMEOUT) < MIN_PROBE_TIMEOUT);
    }

    #[test]
    fn test_outcome_from_samples() {
        let all_lost = ProbeOutcome::from_samples(&[None, None, None]);
        assert!(!all_lost.reachable);
        assert_eq!(all_lost.detail, "no reply, 100% loss");

        let partial = ProbeOutcome::from_samples(&[
            Some(Duration::from_millis(10)),
            None,
            Some(Duration::from_millis(20)),
        ]);
        assert!(partial.reachable);
        assert_eq!(partial.detail, "avg 15.0 ms, 33% loss");
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("ICMP".parse::<ProbeBackend>(), Ok(ProbeBackend::Icmp));
        assert_eq!("system".parse::<ProbeBackend>(), Ok(ProbeBackend::System));
        assert!("carrier-pigeon".parse::<ProbeBackend>().is_err());
    }
}
