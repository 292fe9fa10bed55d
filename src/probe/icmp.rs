use async_trait::async_trait;
use rand::random;
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tracing::{debug, warn};

use super::{ProbeError, ProbeOutcome, Prober, reply_budget};

const PAYLOAD: [u8; 56] = [0; 56];

/// Sends ICMP echo requests directly instead of spawning `ping`.
#[derive(Debug, Default, Clone)]
pub struct IcmpProber;

impl IcmpProber {
    pub fn new() -> Self {
        Self
    }
}

/// Resolves a host name or IP literal on a blocking thread.
async fn resolve(target: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    let host = target.to_string();
    let resolved = tokio::task::spawn_blocking(move || {
        use std::net::ToSocketAddrs;
        format!("{host}:0").to_socket_addrs()
    })
    .await;

    match resolved {
        Ok(Ok(mut addrs)) => addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| ProbeError::Resolution(format!("{target}: no addresses"))),
        Ok(Err(e)) => Err(ProbeError::Resolution(format!("{target}: {e}"))),
        Err(e) => Err(ProbeError::Resolution(format!("{target}: {e}"))),
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(
        &self,
        target: &str,
        timeout: Duration,
        samples: u32,
    ) -> Result<ProbeOutcome, ProbeError> {
        let samples = samples.max(1);
        let addr = resolve(target).await?;

        let config = match addr {
            IpAddr::V4(_) => Config::default(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
        };
        let client = Client::new(&config).map_err(|e| {
            warn!(error = %e, "Could not open ICMP socket.");
            ProbeError::Unavailable(format!("ICMP socket: {e}"))
        })?;

        let mut pinger = client.pinger(addr, PingIdentifier(random())).await;
        pinger.timeout(reply_budget(timeout) / samples);

        let mut rtts = Vec::with_capacity(samples as usize);
        for seq in 0..samples {
            match pinger.ping(PingSequence(seq as u16), &PAYLOAD).await {
                Ok((_reply, rtt)) => rtts.push(Some(rtt)),
                Err(e) => {
                    debug!(target = %target, seq, error = %e, "Echo request lost.");
                    rtts.push(None);
                }
            }
        }

        Ok(ProbeOutcome::from_samples(&rtts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        assert_eq!(
            resolve("127.0.0.1").await.unwrap(),
            "127.0.0.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(resolve("::1").await.unwrap(), "::1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_invalid_host_fails() {
        let result = resolve("no such host!").await;
        assert!(matches!(result, Err(ProbeError::Resolution(_))));
    }
}
