use ben::{decode::Dict, DictEncoder, Parser};
use bytes::Bytes;
use thiserror::Error;

use crate::{metainfo::InfoSummary, InfoHash};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TorrentError {
    #[error("Malformed info dictionary: {0}")]
    MalformedInfoDict(ben::Error),

    #[error("Bencode error: {0}")]
    Bencode(#[from] ben::Error),

    #[error("Torrent Info dictionary is required")]
    InfoDictRequired,
}

/// A `.torrent` file built around an info dictionary whose bytes are kept
/// exactly as received, so its hash never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    pub info: Bytes,
    pub trackers: Vec<String>,
    pub created_by: Option<String>,
    pub creation_date: Option<i64>,
}

impl Torrent {
    pub fn new(info: impl Into<Bytes>, trackers: Vec<String>) -> Self {
        Self {
            info: info.into(),
            trackers,
            created_by: None,
            creation_date: None,
        }
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn with_creation_date(mut self, unix_secs: i64) -> Self {
        self.creation_date = Some(unix_secs);
        self
    }

    pub fn info_hash(&self) -> InfoHash {
        InfoHash::of(&self.info)
    }

    pub fn summary(&self) -> anyhow::Result<InfoSummary> {
        InfoSummary::parse(&self.info)
    }

    /// Bencode the torrent file. Keys are emitted in byte order and the info
    /// dictionary is copied verbatim.
    pub fn encode(&self) -> Result<Vec<u8>, TorrentError> {
        let mut parser = Parser::new();
        parser.sorted_keys(false);
        parser
            .parse::<Dict>(&self.info)
            .map_err(TorrentError::MalformedInfoDict)?;

        let mut buf = Vec::with_capacity(self.info.len() + 256);
        let mut dict = DictEncoder::new(&mut buf);

        if let Some(announce) = self.trackers.first() {
            dict.insert("announce", announce);

            let mut tiers = dict.insert_list("announce-list");
            for tracker in &self.trackers {
                let mut tier = tiers.push_list();
                tier.push(tracker);
            }
        }
        if let Some(created_by) = &self.created_by {
            dict.insert("created by", created_by);
        }
        if let Some(date) = self.creation_date {
            dict.insert("creation date", date);
        }
        dict.insert_raw("info", &self.info);
        dict.finish();

        Ok(buf)
    }

    /// Read a `.torrent` file back.
    pub fn parse(data: &[u8], parser: &mut Parser) -> Result<Self, TorrentError> {
        let dict = parser.parse::<Dict>(data)?;
        let info = dict.get_dict("info").ok_or(TorrentError::InfoDictRequired)?;

        let mut trackers: Vec<String> = Vec::new();
        let mut add = |url: &str| {
            if !trackers.iter().any(|t| t == url) {
                trackers.push(url.to_string());
            }
        };

        if let Some(announce) = dict.get_str("announce") {
            add(announce);
        }
        if let Some(list) = dict.get_list("announce-list") {
            list.iter()
                .filter_map(|tier| tier.as_list())
                .flatten()
                .filter_map(|url| url.as_str())
                .for_each(&mut add);
        }

        Ok(Torrent {
            info: Bytes::copy_from_slice(info.as_raw_bytes()),
            trackers,
            created_by: dict.get_str("created by").map(String::from),
            creation_date: dict.get_int("creation date"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &[u8] = b"d6:lengthi100e4:name3:foo12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaae";

    #[test]
    fn encode_full() {
        let torrent = Torrent::new(INFO, vec!["udp://a:1".into(), "http://b/ann".into()])
            .with_created_by("m2t")
            .with_creation_date(1600000000);
        let bytes = torrent.encode().unwrap();

        let mut expected = b"d8:announce9:udp://a:113:announce-listll9:udp://a:1el12:http://b/annee10:created by3:m2t13:creation datei1600000000e4:info".to_vec();
        expected.extend_from_slice(INFO);
        expected.push(b'e');
        assert_eq!(expected, bytes);
    }

    #[test]
    fn encode_without_trackers() {
        let bytes = Torrent::new(INFO, vec![]).encode().unwrap();
        let mut expected = b"d4:info".to_vec();
        expected.extend_from_slice(INFO);
        expected.push(b'e');
        assert_eq!(expected, bytes);
    }

    #[test]
    fn encode_is_deterministic() {
        let torrent = Torrent::new(INFO, vec!["udp://a:1".into()]).with_creation_date(1);
        assert_eq!(torrent.encode().unwrap(), torrent.encode().unwrap());
    }

    #[test]
    fn malformed_info() {
        let err = Torrent::new(&b"d4:name"[..], vec![]).encode().unwrap_err();
        assert!(matches!(err, TorrentError::MalformedInfoDict(_)));

        let err = Torrent::new(&b"l1:ae"[..], vec![]).encode().unwrap_err();
        assert!(matches!(err, TorrentError::MalformedInfoDict(_)));
    }

    #[test]
    fn info_hash_is_preserved() {
        let torrent = Torrent::new(INFO, vec!["udp://a:1".into()]);
        let bytes = torrent.encode().unwrap();
        let parsed = Torrent::parse(&bytes, &mut Parser::new()).unwrap();
        assert_eq!(InfoHash::of(INFO), parsed.info_hash());
        assert_eq!(torrent, parsed);
    }

    #[test]
    fn summary_of_info() {
        let summary = Torrent::new(INFO, vec![]).summary().unwrap();
        assert_eq!(Some("foo".to_string()), summary.name);
        assert_eq!(100, summary.length);
    }
}
