use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::id::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub id: NodeId,
    pub addr: SocketAddr,
}

/// Decode a compact node list: 20-byte id followed by a compact address,
/// 26 bytes per node for IPv4 (`nodes`) and 38 for IPv6 (`nodes6`).
pub fn decode_nodes(buf: &[u8], ipv6: bool) -> anyhow::Result<Vec<Contact>> {
    let size = if ipv6 { 38 } else { 26 };
    anyhow::ensure!(
        buf.len() % size == 0,
        "Compact node list must have length multiple of {}, actual: {}",
        size,
        buf.len()
    );

    let nodes = buf
        .chunks_exact(size)
        .filter_map(|c| {
            Some(Contact {
                id: NodeId::from_bytes(&c[..20])?,
                addr: decode_addr(&c[20..])?,
            })
        })
        .collect();
    Ok(nodes)
}

/// Decode a compact peer address, 6 bytes for IPv4 or 18 for IPv6.
pub fn decode_addr(buf: &[u8]) -> Option<SocketAddr> {
    match buf.len() {
        6 => {
            let ip: [u8; 4] = buf[..4].try_into().ok()?;
            let port = u16::from_be_bytes([buf[4], buf[5]]);
            Some(SocketAddr::new(Ipv4Addr::from(ip).into(), port))
        }
        18 => {
            let ip: [u8; 16] = buf[..16].try_into().ok()?;
            let port = u16::from_be_bytes([buf[16], buf[17]]);
            Some(SocketAddr::new(Ipv6Addr::from(ip).into(), port))
        }
        _ => None,
    }
}
