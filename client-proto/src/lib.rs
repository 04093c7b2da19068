//! Sans-IO pieces of the BitTorrent peer wire protocol needed to fetch a
//! torrent's metadata: handshakes, message framing, the extension protocol,
//! magnet links and `.torrent` encoding.

pub type PeerId = [u8; 20];
pub type Extensions = [u8; 8];

pub mod conn;
pub mod ext;
pub mod handshake;
mod info_hash;
pub mod magnet;
pub mod metainfo;
pub mod msg;
pub mod torrent;

pub use info_hash::InfoHash;
