use std::net::SocketAddr;

use thiserror::Error;
use url::{form_urlencoded, Url};

use crate::InfoHash;

const SCHEME: &str = "magnet";
const INFOHASH_PREFIX: &str = "urn:btih:";

const TORRENT_ID: &str = "xt";
const DISPLAY_NAME: &str = "dn";
const TRACKER_URL: &str = "tr";
const PEER: &str = "x.pe";

/// Number of hex characters used as a name when the magnet carries none.
const FALLBACK_NAME_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MagnetError {
    #[error("Invalid URI: {0}")]
    Uri(#[from] url::ParseError),

    #[error("Incorrect scheme `{0}`")]
    Scheme(String),

    #[error("No infohash found")]
    MissingInfoHash,

    #[error("Invalid infohash `{0}`")]
    InvalidInfoHash(String),

    #[error("Multiple infohashes found")]
    MultipleInfoHashes,

    #[error("Invalid peer address `{0}`")]
    InvalidPeer(String),
}

/// A parsed `magnet:` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetUri {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    /// Tracker URLs in order of appearance, without duplicates.
    pub trackers: Vec<String>,
    /// Peer endpoints given as `x.pe` hints, without duplicates.
    pub peers: Vec<SocketAddr>,
}

impl MagnetUri {
    /// Parse a magnet link, rejecting malformed peer hints.
    pub fn parse(uri: &str) -> Result<Self, MagnetError> {
        Self::parse_with(uri, true)
    }

    /// Parse a magnet link, skipping peer hints that are not socket addresses.
    pub fn parse_lenient(uri: &str) -> Result<Self, MagnetError> {
        Self::parse_with(uri, false)
    }

    fn parse_with(uri: &str, strict: bool) -> Result<Self, MagnetError> {
        let url = Url::parse(uri.trim())?;
        if url.scheme() != SCHEME {
            return Err(MagnetError::Scheme(url.scheme().to_string()));
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::<String>::new();
        let mut peers = Vec::new();

        for (key, value) in url.query_pairs() {
            match &key[..] {
                TORRENT_ID => {
                    let encoded = match strip_prefix_ignore_case(&value, INFOHASH_PREFIX) {
                        Some(encoded) => encoded,
                        // Other hash kinds (e.g. `urn:btmh:`) are not supported
                        None => continue,
                    };
                    let ih = decode_infohash(encoded)?;
                    match info_hash {
                        Some(existing) if existing != ih => {
                            return Err(MagnetError::MultipleInfoHashes)
                        }
                        _ => info_hash = Some(ih),
                    }
                }
                DISPLAY_NAME => {
                    if !value.is_empty() {
                        display_name = Some(value.into_owned());
                    }
                }
                TRACKER_URL => {
                    if !value.is_empty() && !trackers.iter().any(|t| *t == value) {
                        trackers.push(value.into_owned());
                    }
                }
                PEER => match value.parse::<SocketAddr>() {
                    Ok(addr) => {
                        if !peers.contains(&addr) {
                            peers.push(addr);
                        }
                    }
                    Err(_) if strict => return Err(MagnetError::InvalidPeer(value.into_owned())),
                    Err(_) => {}
                },
                _ => {}
            }
        }

        Ok(MagnetUri {
            info_hash: info_hash.ok_or(MagnetError::MissingInfoHash)?,
            display_name,
            trackers,
            peers,
        })
    }

    /// Display name, or a short prefix of the hex infohash if none was given.
    pub fn name(&self) -> String {
        match &self.display_name {
            Some(name) => name.clone(),
            None => {
                let mut hex = self.info_hash.encode_hex();
                hex.truncate(FALLBACK_NAME_LEN);
                hex
            }
        }
    }

    /// Render back into a magnet link.
    pub fn to_uri(&self) -> String {
        let mut uri = format!("{}:?{}={}{}", SCHEME, TORRENT_ID, INFOHASH_PREFIX, self.info_hash);

        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(name) = &self.display_name {
            query.append_pair(DISPLAY_NAME, name);
        }
        for tracker in &self.trackers {
            query.append_pair(TRACKER_URL, tracker);
        }
        for peer in &self.peers {
            query.append_pair(PEER, &peer.to_string());
        }

        let query = query.finish();
        if !query.is_empty() {
            uri.push('&');
            uri.push_str(&query);
        }
        uri
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}

fn decode_infohash(encoded: &str) -> Result<InfoHash, MagnetError> {
    use data_encoding::{BASE32, HEXLOWER_PERMISSIVE as HEX};

    let invalid = || MagnetError::InvalidInfoHash(encoded.to_string());
    let mut info_hash = [0; 20];

    let result = match encoded.len() {
        40 => HEX.decode_mut(encoded.as_bytes(), &mut info_hash),
        32 => BASE32.decode_mut(encoded.to_ascii_uppercase().as_bytes(), &mut info_hash),
        _ => return Err(invalid()),
    };

    match result {
        Ok(_) => Ok(InfoHash::new(info_hash)),
        Err(_) => Err(invalid()),
    }
}
