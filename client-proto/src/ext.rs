//! Extension protocol (BEP 10) and the `ut_metadata` extension (BEP 9).

use std::collections::BTreeMap;

use ben::{DictEncoder, Encode, Entry, Parser};
use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

/// Size of every metadata piece except possibly the last.
pub const METADATA_PIECE_LEN: usize = 0x4000;

/// Upper bound on an info dictionary we are willing to fetch.
pub const MAX_METADATA_SIZE: usize = 16 * 1024 * 1024;

/// Extended message id of the extension handshake.
pub const HANDSHAKE_ID: u8 = 0;

pub const UT_METADATA: &str = "ut_metadata";

/// Id under which we ask peers to send us `ut_metadata` messages.
pub const LOCAL_UT_METADATA_ID: u8 = 3;

mod msg_type {
    pub const REQUEST: i64 = 0;
    pub const DATA: i64 = 1;
    pub const REJECT: i64 = 2;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtError {
    #[error("Bencode error: {0}")]
    Bencode(#[from] ben::Error),
    #[error("Extended message is not a dictionary")]
    NotADict,
    #[error("`{0}` not found")]
    MissingField(&'static str),
    #[error("Unknown metadata message type {0}")]
    UnknownMsgType(i64),
    #[error("Metadata piece of {0} bytes is larger than 16kB")]
    PieceTooLarge(usize),
}

/// The extension handshake payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtHandshake {
    /// Extension name to message id, as found in the `m` dictionary.
    pub extensions: BTreeMap<String, u8>,
    pub metadata_size: Option<usize>,
    pub client: Option<String>,
    pub reqq: Option<u32>,
}

impl ExtHandshake {
    /// Our own handshake: we only speak `ut_metadata`.
    pub fn local(client: &str) -> Self {
        let mut extensions = BTreeMap::new();
        extensions.insert(UT_METADATA.to_string(), LOCAL_UT_METADATA_ID);
        Self {
            extensions,
            metadata_size: None,
            client: Some(client.to_string()),
            reqq: None,
        }
    }

    /// The id the remote wants `ut_metadata` messages sent with, if enabled.
    pub fn ut_metadata(&self) -> Option<u8> {
        self.extensions
            .get(UT_METADATA)
            .copied()
            .filter(|&id| id != 0)
    }

    pub fn parse(payload: &[u8], parser: &mut Parser) -> Result<Self, ExtError> {
        let (entry, _) = parser.parse_prefix::<Entry>(payload)?;
        trace!("ext handshake: {:?}", entry);
        let dict = entry.as_dict().ok_or(ExtError::NotADict)?;

        let mut extensions = BTreeMap::new();
        if let Some(m) = dict.get_dict("m") {
            for (name, id) in m {
                if let Some(id) = id.as_int::<u8>() {
                    extensions.insert(name.to_string(), id);
                }
            }
        }

        Ok(Self {
            extensions,
            metadata_size: dict.get_int("metadata_size"),
            client: dict.get_str("v").map(String::from),
            reqq: dict.get_int("reqq"),
        })
    }
}

impl Encode for ExtHandshake {
    fn encode(&self, buf: &mut Vec<u8>) {
        let mut dict = DictEncoder::new(buf);
        {
            let mut m = dict.insert_dict("m");
            for (name, id) in &self.extensions {
                m.insert(name, i64::from(*id));
            }
        }
        if let Some(size) = self.metadata_size {
            dict.insert("metadata_size", size as i64);
        }
        if let Some(reqq) = self.reqq {
            dict.insert("reqq", i64::from(reqq));
        }
        if let Some(client) = &self.client {
            dict.insert("v", client);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataMsg {
    Request(u32),
    Data {
        piece: u32,
        total_size: Option<usize>,
        data: Bytes,
    },
    Reject(u32),
}

impl MetadataMsg {
    /// Parse a `ut_metadata` payload. The piece data of a `Data` message
    /// follows the bencoded header and is sliced out without copying.
    pub fn parse(payload: Bytes, parser: &mut Parser) -> Result<Self, ExtError> {
        let (msg, header_len) = {
            let (entry, header_len) = parser.parse_prefix::<Entry>(&payload)?;
            trace!("metadata message: {:?}", entry);
            let dict = entry.as_dict().ok_or(ExtError::NotADict)?;

            let msg_type = dict
                .get_int::<i64>("msg_type")
                .ok_or(ExtError::MissingField("msg_type"))?;
            let piece = dict
                .get_int::<u32>("piece")
                .ok_or(ExtError::MissingField("piece"))?;

            let msg = match msg_type {
                msg_type::REQUEST => MetadataMsg::Request(piece),
                msg_type::REJECT => MetadataMsg::Reject(piece),
                msg_type::DATA => MetadataMsg::Data {
                    piece,
                    total_size: dict.get_int("total_size"),
                    data: Bytes::new(),
                },
                other => return Err(ExtError::UnknownMsgType(other)),
            };
            (msg, header_len)
        };

        match msg {
            MetadataMsg::Data {
                piece, total_size, ..
            } => {
                let data = payload.slice(header_len..);
                if data.len() > METADATA_PIECE_LEN {
                    return Err(ExtError::PieceTooLarge(data.len()));
                }
                Ok(MetadataMsg::Data {
                    piece,
                    total_size,
                    data,
                })
            }
            msg => Ok(msg),
        }
    }
}

impl Encode for MetadataMsg {
    fn encode(&self, buf: &mut Vec<u8>) {
        let mut dict = DictEncoder::new(buf);
        match self {
            MetadataMsg::Request(piece) => {
                dict.insert("msg_type", msg_type::REQUEST);
                dict.insert("piece", i64::from(*piece));
            }
            MetadataMsg::Reject(piece) => {
                dict.insert("msg_type", msg_type::REJECT);
                dict.insert("piece", i64::from(*piece));
            }
            MetadataMsg::Data {
                piece, total_size, ..
            } => {
                dict.insert("msg_type", msg_type::DATA);
                dict.insert("piece", i64::from(*piece));
                if let Some(total_size) = total_size {
                    dict.insert("total_size", *total_size as i64);
                }
            }
        }
        dict.finish();

        if let MetadataMsg::Data { data, .. } = self {
            buf.extend_from_slice(data);
        }
    }
}
