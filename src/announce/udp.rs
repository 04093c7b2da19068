//! UDP tracker protocol (BEP 15).

use std::io::{Cursor, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::{bail, ensure, Context};
use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use rand::Rng;
use tokio::net::{lookup_host, UdpSocket};
use tracing::trace;
use url::Url;

use crate::announce::{AnnounceRequest, AnnounceResponse};
use crate::peer::compact_v4;

const TRACKER_CONSTANT: u64 = 0x0417_2710_1980;
const MAX_PACKET_LEN: usize = 4096;

mod action {
    pub const CONNECT: u32 = 0;
    pub const ANNOUNCE: u32 = 1;
    pub const ERROR: u32 = 3;
}

const EVENT_STARTED: u32 = 2;

pub async fn announce(url: &str, req: AnnounceRequest<'_>) -> anyhow::Result<AnnounceResponse> {
    let addr = resolve_addr(url).await?;
    let mut t = UdpTracker::new(addr).await?;
    let buf = &mut [0; MAX_PACKET_LEN];
    t.connect(buf).await?;
    t.announce(&req, buf).await
}

struct UdpTracker {
    socket: UdpSocket,
    addr: SocketAddr,
    conn_id: u64,
    txn_id: u32,
    pending_action: u32,
}

impl UdpTracker {
    async fn new(addr: SocketAddr) -> anyhow::Result<UdpTracker> {
        let local: SocketAddr = match addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;

        Ok(UdpTracker {
            socket,
            addr,
            conn_id: 0,
            txn_id: 0,
            pending_action: 0,
        })
    }

    fn update_txn_id(&mut self) {
        self.txn_id = rand::thread_rng().gen();
    }

    async fn send(&mut self, buf: &[u8], action: u32) -> anyhow::Result<()> {
        let written = self.socket.send_to(buf, &self.addr).await?;
        ensure!(written == buf.len(), "Error sending data");
        self.pending_action = action;
        Ok(())
    }

    async fn connect(&mut self, buf: &mut [u8]) -> anyhow::Result<()> {
        self.update_txn_id();

        trace!("Sending connect to {}, txn id: {}", self.addr, self.txn_id);

        let n = write_connect(buf, self.txn_id)?;
        self.send(&buf[..n], action::CONNECT).await?;

        let (_, mut c) = self.read_response(buf, 16).await?;
        self.conn_id = c.read_u64::<BE>()?;
        trace!("conn_id: {}", self.conn_id);

        Ok(())
    }

    async fn announce(
        &mut self,
        req: &AnnounceRequest<'_>,
        buf: &mut [u8],
    ) -> anyhow::Result<AnnounceResponse> {
        self.update_txn_id();

        trace!("Sending announce to {}, txn id: {}", self.addr, self.txn_id);

        let n = write_announce(buf, self.conn_id, self.txn_id, req)?;
        self.send(&buf[..n], action::ANNOUNCE).await?;

        let (len, mut c) = self.read_response(buf, 20).await?;

        let interval = c.read_u32::<BE>()?;
        let leechers = c.read_u32::<BE>()?;
        let seeders = c.read_u32::<BE>()?;

        trace!(
            "interval: {}, seeders: {}, leechers: {}",
            interval,
            seeders,
            leechers
        );

        let start = c.position() as usize;
        let peers = &c.into_inner()[start..len];
        ensure!(peers.len() % 6 == 0, "IPs should be 6 byte each");

        let peers: Vec<SocketAddr> = peers.chunks_exact(6).filter_map(compact_v4).collect();
        trace!("Got peers: {:?}", peers);

        Ok(AnnounceResponse {
            interval: u64::from(interval),
            peers,
        })
    }

    async fn read_response<'a>(
        &mut self,
        buf: &'a mut [u8],
        min_len: usize,
    ) -> anyhow::Result<(usize, Cursor<&'a [u8]>)> {
        let (len, addr) = self.socket.recv_from(buf).await?;

        ensure!(addr == self.addr, "Packet received from unexpected address");
        ensure!(len >= 8, "Packet too small");

        let buf = &buf[..len];

        let mut c = Cursor::new(buf);
        let action = c.read_u32::<BE>()?;
        let txn_id = c.read_u32::<BE>()?;

        trace!("Received action: {}, txn_id: {}", action, txn_id);

        ensure!(self.txn_id == txn_id, "Txn Id mismatch");

        if action == action::ERROR {
            let msg = String::from_utf8_lossy(&buf[8..]);
            bail!("Tracker error: {}", msg);
        }

        ensure!(self.pending_action == action, "Incorrect msg action received");
        ensure!(len >= min_len, "Packet too small");

        Ok((len, c))
    }
}

fn write_connect(buf: &mut [u8], txn_id: u32) -> anyhow::Result<usize> {
    let mut c = Cursor::new(buf);
    c.write_u64::<BE>(TRACKER_CONSTANT)?;
    c.write_u32::<BE>(action::CONNECT)?;
    c.write_u32::<BE>(txn_id)?;
    Ok(c.position() as usize)
}

fn write_announce(
    buf: &mut [u8],
    conn_id: u64,
    txn_id: u32,
    req: &AnnounceRequest<'_>,
) -> anyhow::Result<usize> {
    let mut c = Cursor::new(buf);
    c.write_u64::<BE>(conn_id)?;
    c.write_u32::<BE>(action::ANNOUNCE)?;
    c.write_u32::<BE>(txn_id)?;
    c.write_all(req.info_hash.as_bytes())?;
    c.write_all(req.peer_id)?;
    c.write_u64::<BE>(0)?; // downloaded
    c.write_u64::<BE>(req.left)?;
    c.write_u64::<BE>(0)?; // uploaded
    c.write_u32::<BE>(EVENT_STARTED)?;
    c.write_u32::<BE>(0)?; // IP addr
    c.write_u32::<BE>(rand::thread_rng().gen())?; // key
    c.write_i32::<BE>(-1)?; // num_want
    c.write_u16::<BE>(req.port)?;
    Ok(c.position() as usize)
}

async fn resolve_addr(url: &str) -> anyhow::Result<SocketAddr> {
    let url: Url = url.parse().context("Failed to parse tracker url")?;
    ensure!(url.scheme() == "udp", "Not a UDP url");

    let host = url.host_str().context("Missing host")?;
    let port = url.port().context("Missing port")?;

    let addr = lookup_host((host, port))
        .await?
        .next()
        .context("Host/port is not resolved to a socket addr")?;
    trace!("Resolved {}:{} to {}", host, port, addr);
    Ok(addr)
}
