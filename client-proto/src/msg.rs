use bytes::{Buf, Bytes};
use thiserror::Error;

pub const CHOKE: u8 = 0;
pub const UNCHOKE: u8 = 1;
pub const INTERESTED: u8 = 2;
pub const NOT_INTERESTED: u8 = 3;
pub const HAVE: u8 = 4;
pub const BITFIELD: u8 = 5;
pub const REQUEST: u8 = 6;
pub const PIECE: u8 = 7;
pub const CANCEL: u8 = 8;
pub const PORT: u8 = 9;
pub const EXTENDED: u8 = 20;

/// Largest frame (excluding the length prefix) accepted from a peer.
pub const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Bytes),
    Request { index: u32, begin: u32, len: u32 },
    Piece { index: u32, begin: u32, data: Bytes },
    Cancel { index: u32, begin: u32, len: u32 },
    Port(u16),
    Extended { id: u8, payload: Bytes },
    Unknown { id: u8, payload: Bytes },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("Frame of {0} bytes exceeds the limit")]
    TooLarge(usize),
    #[error("Message {id} has invalid length {len}")]
    InvalidLength { id: u8, len: usize },
}

impl Message {
    /// Parse a frame body, that is everything after the 4-byte length prefix.
    pub fn parse(mut frame: Bytes) -> Result<Message, MessageError> {
        if frame.is_empty() {
            return Ok(Message::KeepAlive);
        }
        if frame.len() > MAX_FRAME_LEN {
            return Err(MessageError::TooLarge(frame.len()));
        }

        let id = frame.get_u8();
        let len = frame.len();
        let ensure_len = |expected: usize| {
            if len == expected {
                Ok(())
            } else {
                Err(MessageError::InvalidLength { id, len })
            }
        };

        let msg = match id {
            CHOKE => ensure_len(0).map(|_| Message::Choke)?,
            UNCHOKE => ensure_len(0).map(|_| Message::Unchoke)?,
            INTERESTED => ensure_len(0).map(|_| Message::Interested)?,
            NOT_INTERESTED => ensure_len(0).map(|_| Message::NotInterested)?,
            HAVE => {
                ensure_len(4)?;
                Message::Have(frame.get_u32())
            }
            BITFIELD => Message::Bitfield(frame),
            REQUEST | CANCEL => {
                ensure_len(12)?;
                let index = frame.get_u32();
                let begin = frame.get_u32();
                let len = frame.get_u32();
                if id == REQUEST {
                    Message::Request { index, begin, len }
                } else {
                    Message::Cancel { index, begin, len }
                }
            }
            PIECE => {
                if len < 8 {
                    return Err(MessageError::InvalidLength { id, len });
                }
                let index = frame.get_u32();
                let begin = frame.get_u32();
                Message::Piece {
                    index,
                    begin,
                    data: frame,
                }
            }
            PORT => {
                ensure_len(2)?;
                Message::Port(frame.get_u16())
            }
            EXTENDED => {
                if len < 1 {
                    return Err(MessageError::InvalidLength { id, len });
                }
                let ext_id = frame.get_u8();
                Message::Extended {
                    id: ext_id,
                    payload: frame,
                }
            }
            _ => Message::Unknown { id, payload: frame },
        };

        Ok(msg)
    }
}
