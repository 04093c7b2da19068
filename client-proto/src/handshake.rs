use thiserror::Error;
use tracing::trace;

use crate::{Extensions, InfoHash, PeerId};

const PROTOCOL: &[u8; 20] = b"\x13BitTorrent protocol";
pub const HANDSHAKE_LEN: usize = 68;

/// Reserved byte and bit that advertise the extension protocol.
const EXTENDED_BYTE: usize = 5;
const EXTENDED_BIT: u8 = 0x10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub extensions: Extensions,
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(info_hash: InfoHash, peer_id: PeerId) -> Self {
        Self::with_extensions(Extensions::default(), info_hash, peer_id)
    }

    pub fn with_extensions(extensions: Extensions, info_hash: InfoHash, peer_id: PeerId) -> Self {
        Self {
            extensions,
            info_hash,
            peer_id,
        }
    }

    pub fn set_extended(&mut self, enable: bool) {
        if enable {
            self.extensions[EXTENDED_BYTE] |= EXTENDED_BIT;
        } else {
            self.extensions[EXTENDED_BYTE] &= !EXTENDED_BIT;
        }
    }

    pub fn is_extended(&self) -> bool {
        self.extensions[EXTENDED_BYTE] & EXTENDED_BIT != 0
    }

    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0; HANDSHAKE_LEN];
        buf[..20].copy_from_slice(PROTOCOL);
        buf[20..28].copy_from_slice(&self.extensions);
        buf[28..48].copy_from_slice(self.info_hash.as_bytes());
        buf[48..].copy_from_slice(&self.peer_id);
        buf
    }

    /// Parse the remote's handshake and check it belongs to the same torrent
    /// as ours.
    pub fn read(&self, buf: &[u8]) -> Result<Handshake, Error> {
        trace!("Read handshake message");

        if buf.len() != HANDSHAKE_LEN {
            return Err(Error::Invalid);
        }

        if buf[..20] != PROTOCOL[..] {
            return Err(Error::Protocol);
        }

        let mut extensions = Extensions::default();
        extensions.copy_from_slice(&buf[20..28]);

        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let info_hash = InfoHash::new(info_hash);

        if self.info_hash != info_hash {
            return Err(Error::Infohash);
        }

        let mut peer_id = PeerId::default();
        peer_id.copy_from_slice(&buf[48..]);

        Ok(Handshake {
            extensions,
            info_hash,
            peer_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Invalid handshake data")]
    Invalid,
    #[error("Infohash mismatch")]
    Infohash,
    #[error("Protocol mismatch")]
    Protocol,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ih(b: u8) -> InfoHash {
        InfoHash::new([b; 20])
    }

    #[test]
    fn handshake_read_ok() {
        let h = Handshake::new(ih(1), [2; 20]);
        let mut b = Handshake::new(ih(1), [3; 20]);
        b.set_extended(true);
        let other = h.read(&b.to_bytes()).unwrap();
        assert_eq!([3; 20], other.peer_id);
        assert!(other.is_extended());
    }

    #[test]
    fn infohash_mismatch() {
        let h = Handshake::new(ih(1), [2; 20]);
        let b = Handshake::new(ih(2), [3; 20]);
        let err = h.read(&b.to_bytes()).unwrap_err();
        assert_eq!(err, Error::Infohash);
    }

    #[test]
    fn protocol_mismatch() {
        let h = Handshake::new(ih(1), [2; 20]);
        let b = &[0; 68];
        let err = h.read(b).unwrap_err();
        assert_eq!(err, Error::Protocol);
    }

    #[test]
    fn invalid_length() {
        let h = Handshake::new(ih(1), [2; 20]);
        let b = &[0];
        let err = h.read(b).unwrap_err();
        assert_eq!(err, Error::Invalid);
    }

    #[test]
    fn handshake_bytes() {
        let mut h = Handshake::new(ih(1), [2; 20]);
        h.set_extended(true);
        let mut b = [0; 68];
        b[..20].copy_from_slice(PROTOCOL);
        b[25] = 0x10;
        b[28..48].fill(1);
        b[48..68].fill(2);
        assert_eq!(b, h.to_bytes());
    }

    #[test]
    fn extended_bit_toggle() {
        let mut h = Handshake::new(ih(1), [2; 20]);
        assert!(!h.is_extended());
        h.set_extended(true);
        assert!(h.is_extended());
        h.set_extended(false);
        assert!(!h.is_extended());
    }
}
