//! Minimal bencode support for the BitTorrent wire and file formats.
//!
//! Parsing produces a flat token list instead of a tree. The decoded views
//! borrow from the input, so the exact bytes of any nested value (an `info`
//! dictionary for example) stay available.

pub mod decode;
mod encode;
mod error;
mod parse;
mod token;

pub use decode::{Decode, Dict, Entry, List};
pub use encode::{encode_bytes, encode_int, DictEncoder, Encode, ListEncoder};
pub use error::{Error, Result};
pub use parse::Parser;
