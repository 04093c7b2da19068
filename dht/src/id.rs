use std::fmt;
use std::ops::{BitXor, Deref};

use ben::Encode;
use data_encoding::HEXLOWER;
use rand::Rng;

/// 160-bit identifier shared by DHT nodes and info-hashes.
#[derive(Copy, Clone, Default, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct NodeId([u8; 20]);

impl NodeId {
    pub const fn all(b: u8) -> Self {
        Self([b; 20])
    }

    pub fn gen() -> Self {
        let mut id = [0; 20];
        rand::thread_rng().fill(&mut id[..]);
        Self(id)
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let id: [u8; 20] = buf.try_into().ok()?;
        Some(Self(id))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&HEXLOWER.encode(&self.0))
    }
}

impl From<[u8; 20]> for NodeId {
    fn from(buf: [u8; 20]) -> Self {
        Self(buf)
    }
}

impl Deref for NodeId {
    type Target = [u8; 20];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Encode for NodeId {
    fn encode(&self, buf: &mut Vec<u8>) {
        ben::encode_bytes(buf, &self.0);
    }
}

/// XOR distance. Ordering the results orders nodes by closeness.
impl BitXor for NodeId {
    type Output = NodeId;

    fn bitxor(mut self, other: NodeId) -> NodeId {
        self.0.iter_mut().zip(&other.0).for_each(|(a, b)| *a ^= b);
        self
    }
}
