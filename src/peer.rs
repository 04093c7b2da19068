use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use client::proto::PeerId;
use rand::{distributions::Alphanumeric, Rng};

/// Azureus-style peer id: client tag followed by random alphanumerics.
pub fn generate_peer_id() -> PeerId {
    let mut buf = *b"-MT0100-000000000000";
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .zip(&mut buf[8..])
        .for_each(|(c, b)| *b = c as u8);
    buf
}

/// Decode a 6-byte compact IPv4 peer.
pub fn compact_v4(bytes: &[u8]) -> Option<SocketAddr> {
    match *bytes {
        [a, b, c, d, p0, p1] => Some(SocketAddr::new(
            Ipv4Addr::new(a, b, c, d).into(),
            u16::from_be_bytes([p0, p1]),
        )),
        _ => None,
    }
}

/// Decode an 18-byte compact IPv6 peer.
pub fn compact_v6(bytes: &[u8]) -> Option<SocketAddr> {
    if bytes.len() != 18 {
        return None;
    }
    let mut ip = [0; 16];
    ip.copy_from_slice(&bytes[..16]);
    let port = u16::from_be_bytes([bytes[16], bytes[17]]);
    Some(SocketAddr::new(Ipv6Addr::from(ip).into(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_shape() {
        let id = generate_peer_id();
        assert_eq!(b"-MT0100-", &id[..8]);
        assert!(id[8..].iter().all(u8::is_ascii_alphanumeric));
    }

    #[test]
    fn decode_compact() {
        assert_eq!(
            Some("10.0.0.1:6881".parse().unwrap()),
            compact_v4(&[10, 0, 0, 1, 0x1a, 0xe1])
        );
        assert_eq!(None, compact_v4(&[1, 2, 3]));

        let mut v6 = [0; 18];
        v6[15] = 1;
        v6[17] = 80;
        assert_eq!(Some("[::1]:80".parse().unwrap()), compact_v6(&v6));
    }
}
