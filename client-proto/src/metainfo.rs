use anyhow::Context;
use ben::{decode::Dict, Parser};
use thiserror::Error;

/// What a user wants to know about an info dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoSummary {
    pub name: Option<String>,
    /// Total payload length across all files.
    pub length: u64,
    pub piece_len: u64,
    pub piece_count: usize,
    pub file_count: usize,
}

impl InfoSummary {
    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let mut parser = Parser::new();
        parser.sorted_keys(false);
        Self::parse_with(data, &mut parser)
    }

    pub fn parse_with(data: &[u8], parser: &mut Parser) -> anyhow::Result<Self> {
        use ParseError::*;
        let info = parser.parse::<Dict>(data)?;

        let piece_len = info.get_int("piece length").context(PieceLengthRequired)?;
        let pieces = info.get_bytes("pieces").context(PiecesRequired)?;
        anyhow::ensure!(pieces.len() % 20 == 0, PiecesMalformed);
        let name = info.get_str("name").map(String::from);

        let (length, file_count) = match info.get_list("files") {
            Some(files) => {
                let mut total = 0u64;
                let mut count = 0;
                for file in files {
                    let file = file.as_dict().context(LengthRequired)?;
                    let len: u64 = file.get_int("length").context(LengthRequired)?;
                    total = total.checked_add(len).context(LengthRequired)?;
                    count += 1;
                }
                (total, count)
            }
            None => (info.get_int("length").context(LengthRequired)?, 1),
        };

        Ok(InfoSummary {
            name,
            length,
            piece_len,
            piece_count: pieces.len() / 20,
            file_count,
        })
    }
}

#[derive(Error, Debug)]
pub(crate) enum ParseError {
    #[error("Torrent Piece hash is required")]
    PiecesRequired,

    #[error("Torrent Piece hashes must be a multiple of 20 bytes")]
    PiecesMalformed,

    #[error("Torrent Piece length is required")]
    PieceLengthRequired,

    #[error("Torrent length is required")]
    LengthRequired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_file() {
        let info = b"d6:lengthi100e4:name3:foo12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaae";
        let summary = InfoSummary::parse(info).unwrap();
        assert_eq!(
            InfoSummary {
                name: Some("foo".into()),
                length: 100,
                piece_len: 16384,
                piece_count: 1,
                file_count: 1,
            },
            summary
        );
    }

    #[test]
    fn multi_file() {
        let info = b"d5:filesld6:lengthi10e4:pathl1:aeed6:lengthi5e4:pathl1:beee4:name3:dir12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaae";
        let summary = InfoSummary::parse(info).unwrap();
        assert_eq!(15, summary.length);
        assert_eq!(2, summary.file_count);
        assert_eq!(Some("dir"), summary.name.as_deref());
    }

    #[test]
    fn missing_length() {
        let info = b"d4:name3:foo12:piece lengthi16384e6:pieces0:e";
        let err = InfoSummary::parse(info).unwrap_err();
        assert_eq!("Torrent length is required", err.to_string());
    }
}
