//! Peer lookups on the mainline DHT (BEP 5).
//!
//! A lookup starts from a few bootstrap routers and walks towards the
//! info-hash with `get_peers`. Nothing is kept between lookups and queries
//! from other nodes are not served.

mod contact;
mod id;
mod lookup;
mod msg;

use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{sleep, sleep_until};
use tracing::{debug, trace};

pub use contact::Contact;
pub use id::NodeId;
pub use lookup::{Lookup, Transmit, REQUEST_TIMEOUT};

pub const DEFAULT_ROUTERS: &[&str] = &[
    "router.bittorrent.com:6881",
    "dht.transmissionbt.com:6881",
    "dht.libtorrent.org:25401",
];

/// Run one lookup for `info_hash` and return the peers found when it
/// converges or when `limit` runs out, whichever comes first.
pub async fn get_peers<S>(
    routers: &[S],
    info_hash: [u8; 20],
    limit: Duration,
) -> anyhow::Result<Vec<SocketAddr>>
where
    S: AsRef<str>,
{
    let mut nodes = vec![];
    for router in routers {
        match lookup_host(router.as_ref()).await {
            Ok(addrs) => nodes.extend(addrs.filter(SocketAddr::is_ipv4)),
            Err(e) => debug!("Cannot resolve {}: {}", router.as_ref(), e),
        }
    }
    anyhow::ensure!(!nodes.is_empty(), "No DHT router could be resolved");

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    let mut lookup = Lookup::new(NodeId::gen(), info_hash.into(), &nodes, Instant::now());
    let mut buf = [0; 2048];

    let deadline = sleep(limit);
    tokio::pin!(deadline);

    loop {
        while let Some(t) = lookup.poll_transmit() {
            if let Err(e) = socket.send_to(&t.data, t.addr).await {
                trace!("Cannot send to {}: {}", t.addr, e);
                lookup.set_failed(t.addr, Instant::now());
            }
        }

        if lookup.is_done() {
            break;
        }

        let wake = lookup
            .next_timeout()
            .unwrap_or_else(|| Instant::now() + REQUEST_TIMEOUT);

        tokio::select! {
            _ = &mut deadline => {
                debug!("DHT lookup cut short after {:?}", limit);
                break;
            }
            _ = sleep_until(wake.into()) => lookup.tick(Instant::now()),
            resp = socket.recv_from(&mut buf) => match resp {
                Ok((n, from)) => lookup.receive(&buf[..n], from, Instant::now()),
                Err(e) => trace!("Receive failed: {}", e),
            },
        }
    }

    debug!("DHT lookup found {} peers", lookup.peers().len());
    Ok(lookup.into_peers())
}

#[cfg(test)]
mod tests {
    use ben::{Dict, DictEncoder, Parser};

    use super::*;

    /// A node that answers every `get_peers` with one peer and no nodes.
    async fn spawn_node(peer: [u8; 6]) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0; 1024];
            let mut parser = Parser::new();
            loop {
                let (n, from) = socket.recv_from(&mut buf).await.unwrap();
                let dict = parser.parse::<Dict>(&buf[..n]).unwrap();
                let txn_id = dict.get_bytes("t").unwrap().to_vec();

                let mut resp = vec![];
                let mut d = DictEncoder::new(&mut resp);
                {
                    let mut r = d.insert_dict("r");
                    r.insert("id", NodeId::all(5));
                    r.insert_list("values").push(&peer[..]);
                }
                d.insert("t", &txn_id[..]);
                d.insert("y", "r");
                d.finish();
                socket.send_to(&resp, from).await.unwrap();
            }
        });

        addr
    }

    #[tokio::test]
    async fn lookup_against_local_node() {
        let node = spawn_node([10, 0, 0, 1, 0x1a, 0xe1]).await;
        let routers = [node.to_string()];

        let peers = get_peers(&routers, [9; 20], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(vec!["10.0.0.1:6881".parse::<SocketAddr>().unwrap()], peers);
    }

    #[tokio::test]
    async fn silent_node_yields_nothing() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let routers = [socket.local_addr().unwrap().to_string()];

        let peers = get_peers(&routers, [9; 20], Duration::from_millis(300))
            .await
            .unwrap();
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn no_routers() {
        let routers: [&str; 0] = [];
        assert!(get_peers(&routers, [9; 20], Duration::from_secs(1)).await.is_err());
    }
}
