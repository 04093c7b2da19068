//! Tracker announces, used only to learn peer endpoints.

use std::net::SocketAddr;

use anyhow::bail;
use client::proto::{InfoHash, PeerId};

mod http;
mod udp;

#[derive(Debug, Clone, Copy)]
pub struct AnnounceRequest<'a> {
    pub info_hash: &'a InfoHash,
    pub peer_id: &'a PeerId,
    pub port: u16,
    /// Bytes left to download. Unknown before the metadata arrives.
    pub left: u64,
}

#[derive(Debug)]
pub struct AnnounceResponse {
    pub interval: u64,
    pub peers: Vec<SocketAddr>,
}

pub async fn announce(url: &str, req: AnnounceRequest<'_>) -> anyhow::Result<AnnounceResponse> {
    if url.starts_with("http://") || url.starts_with("https://") {
        http::announce(url, req).await
    } else if url.starts_with("udp://") {
        udp::announce(url, req).await
    } else {
        bail!("Unsupported tracker URL: {}", url)
    }
}
