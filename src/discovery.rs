//! Peer discovery. Each source is asked once per round; rounds repeat while
//! the acquisition needs more peers.

use std::{net::SocketAddr, time::Duration};

use client::proto::{InfoHash, PeerId};
use futures::{
    future::BoxFuture,
    stream::{self, BoxStream, FuturesUnordered},
    FutureExt, StreamExt,
};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::announce::{announce, AnnounceRequest};

pub trait Discovery: Send + Sync {
    fn describe(&self) -> String;

    fn discover(
        &self,
        info_hash: InfoHash,
        peer_id: PeerId,
    ) -> BoxFuture<'static, anyhow::Result<Vec<SocketAddr>>>;
}

/// Peers named directly in the magnet link.
#[derive(Debug, Clone)]
pub struct PeerHints(pub Vec<SocketAddr>);

impl Discovery for PeerHints {
    fn describe(&self) -> String {
        format!("{} peer hints", self.0.len())
    }

    fn discover(&self, _: InfoHash, _: PeerId) -> BoxFuture<'static, anyhow::Result<Vec<SocketAddr>>> {
        let peers = self.0.clone();
        async move { Ok(peers) }.boxed()
    }
}

#[derive(Debug, Clone)]
pub struct TrackerDiscovery {
    url: String,
    port: u16,
    left: u64,
}

impl TrackerDiscovery {
    pub fn new(url: impl Into<String>, port: u16) -> Self {
        Self {
            url: url.into(),
            port,
            // Size is unknown until the metadata arrives. Some trackers
            // return no peers for a zero `left`.
            left: 16384,
        }
    }
}

impl Discovery for TrackerDiscovery {
    fn describe(&self) -> String {
        format!("tracker {}", self.url)
    }

    fn discover(
        &self,
        info_hash: InfoHash,
        peer_id: PeerId,
    ) -> BoxFuture<'static, anyhow::Result<Vec<SocketAddr>>> {
        let this = self.clone();
        async move {
            let req = AnnounceRequest {
                info_hash: &info_hash,
                peer_id: &peer_id,
                port: this.port,
                left: this.left,
            };
            let resp = announce(&this.url, req).await?;
            trace!("{} returned {} peers", this.url, resp.peers.len());
            Ok(resp.peers)
        }
        .boxed()
    }
}

/// A mainline DHT lookup started from the given bootstrap routers.
#[derive(Debug, Clone)]
pub struct DhtDiscovery {
    routers: Vec<String>,
    limit: Duration,
}

impl DhtDiscovery {
    /// `limit` bounds one lookup. Keep it below the discovery timeout so the
    /// peers found so far are still returned.
    pub fn new(routers: Vec<String>, limit: Duration) -> Self {
        Self { routers, limit }
    }
}

impl Discovery for DhtDiscovery {
    fn describe(&self) -> String {
        format!("DHT via {} routers", self.routers.len())
    }

    fn discover(&self, info_hash: InfoHash, _: PeerId) -> BoxFuture<'static, anyhow::Result<Vec<SocketAddr>>> {
        let this = self.clone();
        async move { dht::get_peers(&this.routers, *info_hash.as_bytes(), this.limit).await }.boxed()
    }
}

pub struct PeerSource {
    sources: Vec<Box<dyn Discovery>>,
    info_hash: InfoHash,
    peer_id: PeerId,
    timeout: Duration,
}

impl PeerSource {
    pub fn new(info_hash: InfoHash, peer_id: PeerId, timeout: Duration) -> Self {
        Self {
            sources: vec![],
            info_hash,
            peer_id,
            timeout,
        }
    }

    pub fn add(&mut self, source: impl Discovery + 'static) {
        self.sources.push(Box::new(source));
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Query every source concurrently. Peers are yielded as each source
    /// answers; failing or slow sources are logged and skipped.
    pub fn round(&self) -> BoxStream<'static, SocketAddr> {
        let limit = self.timeout;
        let futs: FuturesUnordered<_> = self
            .sources
            .iter()
            .map(|source| {
                let name = source.describe();
                let fut = source.discover(self.info_hash, self.peer_id);
                async move {
                    match timeout(limit, fut).await {
                        Ok(Ok(peers)) => peers,
                        Ok(Err(e)) => {
                            debug!("Discovery via {} failed: {}", name, e);
                            vec![]
                        }
                        Err(_) => {
                            debug!("Discovery via {} timed out", name);
                            vec![]
                        }
                    }
                }
            })
            .collect();

        futs.flat_map(stream::iter).boxed()
    }
}
