use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

use super::{ProbeError, ProbeOutcome, Prober, reply_budget};

/// Shells out to the system `ping` utility.
#[derive(Debug, Clone)]
pub struct SystemPingProber {
    program: String,
}

impl Default for SystemPingProber {
    fn default() -> Self {
        Self::new("ping")
    }
}

impl SystemPingProber {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Prober for SystemPingProber {
    async fn probe(
        &self,
        target: &str,
        timeout: Duration,
        samples: u32,
    ) -> Result<ProbeOutcome, ProbeError> {
        let mut command = Command::new(&self.program);
        command
            .args(ping_args(timeout, samples))
            .arg(target)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(program = %self.program, "ping binary not found.");
                return Err(ProbeError::Unavailable(format!("{} not found", self.program)));
            }
            Ok(Err(e)) => return Err(ProbeError::Unavailable(e.to_string())),
            Err(_) => return Err(ProbeError::Timeout(timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(target = %target, status = ?output.status, "ping finished.");

        match output.status.code() {
            Some(0) => Ok(outcome_from_output(&stdout, true)),
            Some(1) => Ok(outcome_from_output(&stdout, false)),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ProbeError::Resolution(format!(
                    "{target}: {}",
                    stderr.trim().lines().next().unwrap_or("ping failed")
                )))
            }
        }
    }
}

/// Arguments bounding ping's total run time. `-w` ends the run after the
/// deadline even when nothing answers, and the deadline stays inside the
/// reply budget so ping exits on its own before `timeout`.
fn ping_args(timeout: Duration, samples: u32) -> Vec<String> {
    let deadline_secs = reply_budget(timeout).as_secs().max(1);
    // Five requests per second at `-i 0.2`.
    let count = samples.clamp(1, (deadline_secs * 5).min(u32::MAX as u64) as u32);
    vec![
        "-n".to_string(),
        "-c".to_string(),
        count.to_string(),
        "-i".to_string(),
        "0.2".to_string(),
        "-W".to_string(),
        "1".to_string(),
        "-w".to_string(),
        deadline_secs.to_string(),
    ]
}

fn outcome_from_output(stdout: &str, reachable: bool) -> ProbeOutcome {
    let times = parse_reply_times(stdout);
    let loss = parse_packet_loss(stdout);

    let mut detail = if times.is_empty() {
        "no reply".to_string()
    } else {
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        format!("avg {avg:.1} ms")
    };
    if let Some(loss) = loss {
        detail.push_str(&format!(", {loss}% loss"));
    }

    ProbeOutcome { reachable, detail }
}

/// Extracts the `time=<ms>` values from ping's reply lines.
pub(crate) fn parse_reply_times(stdout: &str) -> Vec<f64> {
    stdout
        .lines()
        .filter_map(|line| line.split_once("time=").map(|(_, rest)| rest))
        .filter_map(|rest| {
            rest.trim_start()
                .split(|c: char| c.is_whitespace() || c == 'm')
                .next()
                .and_then(|value| value.parse::<f64>().ok())
        })
        .collect()
}

/// Extracts the percentage from the `x% packet loss` summary line.
pub(crate) fn parse_packet_loss(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .find(|line| line.contains("packet loss"))
        .and_then(|line| {
            line.split(',')
                .find(|part| part.contains("packet loss"))
                .and_then(|part| part.trim().split('%').next())
                .and_then(|value| value.trim().parse::<f64>().ok())
        })
}
