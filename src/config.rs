use std::time::Duration;

use client::SessionConfig;

use crate::metadata::AssemblerConfig;
use crate::output::OverwritePolicy;

/// Tunables for one acquisition.
#[derive(Debug, Clone)]
pub struct Config {
    /// Wall-clock limit for fetching the metadata.
    pub timeout: Duration,
    /// Upper bound on concurrently connected peers.
    pub max_connections: usize,
    pub session: SessionConfig,
    pub assembler: AssemblerConfig,
    /// Per-source limit for one discovery round.
    pub discovery_timeout: Duration,
    /// Delay between the end of a discovery round and the next one.
    pub rediscover_interval: Duration,
    pub progress_interval: Duration,
    /// Bootstrap routers for DHT lookups. Empty disables the DHT.
    pub dht_routers: Vec<String>,
    /// Limit for one DHT lookup, below `discovery_timeout`.
    pub dht_timeout: Duration,
    /// Port reported to trackers.
    pub port: u16,
    pub on_conflict: OverwritePolicy,
    pub created_by: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_connections: 30,
            session: SessionConfig {
                client_name: Self::client_name(),
                ..SessionConfig::default()
            },
            assembler: AssemblerConfig::default(),
            discovery_timeout: Duration::from_secs(15),
            rediscover_interval: Duration::from_secs(10),
            progress_interval: Duration::from_secs(1),
            dht_routers: dht::DEFAULT_ROUTERS.iter().map(|r| r.to_string()).collect(),
            dht_timeout: Duration::from_secs(12),
            port: 6881,
            on_conflict: OverwritePolicy::default(),
            created_by: Self::client_name(),
        }
    }
}

impl Config {
    fn client_name() -> String {
        concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
    }
}
