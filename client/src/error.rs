use std::io;

use proto::{ext::ExtError, handshake, msg::MessageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("Infohash mismatch")]
    HandshakeMismatch,

    #[error("Peer does not support {0}")]
    UnsupportedPeer(&'static str),

    #[error("Peer timed out during {0}")]
    PeerTimeout(&'static str),

    #[error("Handshake failed: {0}")]
    Handshake(handshake::Error),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Extension(#[from] ExtError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<handshake::Error> for SessionError {
    fn from(e: handshake::Error) -> Self {
        match e {
            handshake::Error::Infohash => SessionError::HandshakeMismatch,
            e => SessionError::Handshake(e),
        }
    }
}
