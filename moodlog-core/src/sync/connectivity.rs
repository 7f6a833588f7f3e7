//! Connectivity gate consulted before each sync
//!
//! A gate answering `false` means "skip the drain for now"; it is never an
//! error.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::config::{ConnectivityConfig, ConnectivityMode};
use crate::error::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Decides whether network operations may be attempted.
#[allow(async_fn_in_trait)]
pub trait ConnectivityGate {
    async fn connect(&self) -> bool;
}

/// Gate that always reports the network as reachable.
pub struct AlwaysOnline;

impl ConnectivityGate for AlwaysOnline {
    async fn connect(&self) -> bool {
        true
    }
}

/// Gate that never allows a sync.
pub struct Offline;

impl ConnectivityGate for Offline {
    async fn connect(&self) -> bool {
        false
    }
}

/// Probes reachability by opening a TCP connection to the endpoint host,
/// retrying at a fixed interval.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    attempts: u32,
    interval: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, attempts: u32, interval: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            attempts: attempts.max(1),
            interval,
        }
    }

    /// Probe the host and port of an endpoint URL.
    pub fn for_endpoint(url: &str, config: &ConnectivityConfig) -> Result<Self> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| Error::Config(format!("endpoint.url is not a valid URL: {}", e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::Config("endpoint.url has no host".to_string()))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| Error::Config("endpoint.url has no port".to_string()))?;

        Ok(Self::new(
            host,
            port,
            config.attempts,
            Duration::from_millis(config.interval_ms),
        ))
    }
}

impl ConnectivityGate for TcpProbe {
    async fn connect(&self) -> bool {
        for attempt in 1..=self.attempts {
            if attempt > 1 {
                tokio::time::sleep(self.interval).await;
            }

            let probe = TcpStream::connect((self.host.as_str(), self.port));
            match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
                Ok(Ok(_)) => {
                    tracing::debug!(host = %self.host, port = self.port, attempt, "Endpoint reachable");
                    return true;
                }
                Ok(Err(e)) => {
                    tracing::debug!(host = %self.host, attempt, error = %e, "Probe failed");
                }
                Err(_) => {
                    tracing::debug!(host = %self.host, attempt, "Probe timed out");
                }
            }
        }

        tracing::info!(host = %self.host, attempts = self.attempts, "Endpoint unreachable, skipping sync");
        false
    }
}

/// Gate selected from configuration.
pub enum Gate {
    Always(AlwaysOnline),
    Never(Offline),
    Probe(TcpProbe),
}

impl Gate {
    /// Build the configured gate. Probing without an endpoint never connects.
    pub fn from_config(config: &ConnectivityConfig, endpoint: Option<&str>) -> Result<Self> {
        Ok(match (config.mode, endpoint) {
            (ConnectivityMode::Always, _) => Gate::Always(AlwaysOnline),
            (ConnectivityMode::Never, _) | (ConnectivityMode::Probe, None) => Gate::Never(Offline),
            (ConnectivityMode::Probe, Some(url)) => Gate::Probe(TcpProbe::for_endpoint(url, config)?),
        })
    }
}

impl ConnectivityGate for Gate {
    async fn connect(&self) -> bool {
        match self {
            Gate::Always(gate) => gate.connect().await,
            Gate::Never(gate) => gate.connect().await,
            Gate::Probe(gate) => gate.connect().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn config(mode: ConnectivityMode) -> ConnectivityConfig {
        ConnectivityConfig {
            mode,
            attempts: 2,
            interval_ms: 10,
        }
    }

    #[test]
    fn test_probe_uses_default_port() {
        let probe =
            TcpProbe::for_endpoint("https://script.google.com/macros/exec", &config(ConnectivityMode::Probe)).unwrap();
        assert_eq!(probe.host, "script.google.com");
        assert_eq!(probe.port, 443);
        assert_eq!(probe.attempts, 2);
    }

    #[test]
    fn test_gate_from_config() {
        let gate = Gate::from_config(&config(ConnectivityMode::Probe), None).unwrap();
        assert!(matches!(gate, Gate::Never(_)));

        let gate = Gate::from_config(&config(ConnectivityMode::Always), None).unwrap();
        assert!(matches!(gate, Gate::Always(_)));

        let gate = Gate::from_config(&config(ConnectivityMode::Probe), Some("http://localhost:9/x")).unwrap();
        assert!(matches!(gate, Gate::Probe(_)));
    }

    #[tokio::test]
    async fn test_probe_reachable_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new("127.0.0.1", port, 1, Duration::from_millis(10));
        assert!(probe.connect().await);
    }

    #[tokio::test]
    async fn test_probe_unreachable_gives_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::new("127.0.0.1", port, 2, Duration::from_millis(10));
        assert!(!probe.connect().await);
    }

    #[tokio::test]
    async fn test_fixed_gates() {
        assert!(AlwaysOnline.connect().await);
        assert!(!Offline.connect().await);
    }
}
