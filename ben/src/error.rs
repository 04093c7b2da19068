use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The input is not a full Bencode value, more bytes expected
    #[error("Unexpected end of input")]
    Eof,

    /// Invalid data at given position
    #[error("Invalid input at {pos}: {reason}")]
    Invalid { reason: &'static str, pos: usize },

    /// Exceeded Token limit
    #[error("Exceeded token limit of {limit}")]
    TokenLimit { limit: usize },

    /// Exceeded Depth limit
    #[error("Exceeded depth limit of {limit}")]
    DepthLimit { limit: usize },

    /// A string length does not fit in memory
    #[error("Length overflow at {pos}")]
    Overflow { pos: usize },

    /// Bytes left over after a complete value
    #[error("Trailing data at {pos}")]
    TrailingData { pos: usize },

    /// The value is not of the requested type
    #[error("Type mismatch: {0}")]
    TypeMismatch(&'static str),
}
