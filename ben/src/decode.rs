use std::fmt;

use crate::error::{Error, Result};
use crate::token::{Kind, Token};

mod dict;
mod list;

pub use dict::{Dict, DictIter};
pub use list::{List, ListIter};

/// Types a parsed value can be viewed as.
pub trait Decode<'b, 'p>: Sized {
    fn decode(entry: Entry<'b, 'p>) -> Result<Self>;
}

impl<'b, 'p> Decode<'b, 'p> for Entry<'b, 'p> {
    fn decode(entry: Entry<'b, 'p>) -> Result<Self> {
        Ok(entry)
    }
}

impl<'b, 'p> Decode<'b, 'p> for Dict<'b, 'p> {
    fn decode(entry: Entry<'b, 'p>) -> Result<Self> {
        entry.as_dict().ok_or(Error::TypeMismatch("Not a dictionary"))
    }
}

impl<'b, 'p> Decode<'b, 'p> for List<'b, 'p> {
    fn decode(entry: Entry<'b, 'p>) -> Result<Self> {
        entry.as_list().ok_or(Error::TypeMismatch("Not a list"))
    }
}

impl<'b, 'p> Decode<'b, 'p> for &'b [u8] {
    fn decode(entry: Entry<'b, 'p>) -> Result<Self> {
        entry.as_bytes().ok_or(Error::TypeMismatch("Not a byte string"))
    }
}

impl<'b, 'p> Decode<'b, 'p> for i64 {
    fn decode(entry: Entry<'b, 'p>) -> Result<Self> {
        entry.as_int().ok_or(Error::TypeMismatch("Not an integer"))
    }
}

/// A value inside a parsed buffer. `'b` is the input, `'p` the parser that
/// holds the tokens.
#[derive(Clone, Copy)]
pub struct Entry<'b, 'p> {
    buf: &'b [u8],
    tokens: &'p [Token],
    index: usize,
}

impl<'b, 'p> Entry<'b, 'p> {
    pub(crate) fn new(buf: &'b [u8], tokens: &'p [Token], index: usize) -> Self {
        Self { buf, tokens, index }
    }

    fn token(&self) -> Token {
        self.tokens[self.index]
    }

    fn kind(&self) -> Kind {
        self.token().kind
    }

    /// Children of a container, as `(first, end)` token indices.
    pub(crate) fn children(&self) -> (usize, usize) {
        (self.index + 1, self.index + self.token().span as usize)
    }

    /// The entry at token `index`, and the index of the one after it.
    pub(crate) fn sibling(&self, index: usize) -> (Entry<'b, 'p>, usize) {
        let entry = Entry::new(self.buf, self.tokens, index);
        let next = index + entry.token().span as usize;
        (entry, next)
    }

    /// The bytes of this value as they appear in the input. Containers are
    /// returned whole, strings and integers without their framing.
    ///
    /// ```
    /// use ben::{Entry, Parser};
    ///
    /// let mut parser = Parser::new();
    /// let entry = parser.parse::<Entry>(b"d4:infod4:name1:xee").unwrap();
    /// let info = entry.as_dict().unwrap().get("info").unwrap();
    /// assert_eq!(b"d4:name1:xe", info.as_raw_bytes());
    /// ```
    pub fn as_raw_bytes(&self) -> &'b [u8] {
        &self.buf[self.token().range()]
    }

    pub fn is_dict(&self) -> bool {
        self.kind() == Kind::Dict
    }

    pub fn is_list(&self) -> bool {
        self.kind() == Kind::List
    }

    pub fn is_bytes(&self) -> bool {
        self.kind() == Kind::Bytes
    }

    pub fn is_int(&self) -> bool {
        self.kind() == Kind::Int
    }

    pub fn as_dict(&self) -> Option<Dict<'b, 'p>> {
        self.is_dict().then(|| Dict { entry: *self })
    }

    pub fn as_list(&self) -> Option<List<'b, 'p>> {
        self.is_list().then(|| List { entry: *self })
    }

    pub fn as_bytes(&self) -> Option<&'b [u8]> {
        self.is_bytes().then(|| self.as_raw_bytes())
    }

    pub fn as_str(&self) -> Option<&'b str> {
        std::str::from_utf8(self.as_bytes()?).ok()
    }

    /// The integer value, if this is an integer that fits in `I`.
    /// Values outside the `i64` range are never returned.
    pub fn as_int<I>(&self) -> Option<I>
    where
        I: TryFrom<i64>,
    {
        if !self.is_int() {
            return None;
        }
        // The parser only accepts an optional '-' followed by digits
        let n: i64 = std::str::from_utf8(self.as_raw_bytes()).ok()?.parse().ok()?;
        I::try_from(n).ok()
    }
}

impl PartialEq for Entry<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.as_raw_bytes() == other.as_raw_bytes()
    }
}

impl fmt::Debug for Entry<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Kind::Dict => Dict { entry: *self }.fmt(f),
            Kind::List => List { entry: *self }.fmt(f),
            Kind::Int => f.write_str(&String::from_utf8_lossy(self.as_raw_bytes())),
            Kind::Bytes => {
                let bytes = self.as_raw_bytes();
                if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                    write!(f, "\"{}\"", String::from_utf8_lossy(bytes))
                } else {
                    write!(f, "<{}>", data_encoding::HEXLOWER.encode(bytes))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Entry, Parser};

    #[test]
    fn int_widths() {
        let mut parser = Parser::new();
        let entry = parser.parse::<Entry>(b"i300e").unwrap();
        assert_eq!(Some(300), entry.as_int::<i64>());
        assert_eq!(Some(300), entry.as_int::<u16>());
        assert_eq!(None, entry.as_int::<u8>());

        let entry = parser.parse::<Entry>(b"i-1e").unwrap();
        assert_eq!(Some(-1), entry.as_int::<i32>());
        assert_eq!(None, entry.as_int::<usize>());
    }

    #[test]
    fn text_and_binary() {
        let mut parser = Parser::new();
        let err = parser.parse::<Entry>(b"7:uTorrent").unwrap_err();
        assert_eq!(crate::Error::TrailingData { pos: 9 }, err);

        let entry = parser.parse::<Entry>(b"8:uTorrent").unwrap();
        assert_eq!(Some("uTorrent"), entry.as_str());
        assert!(entry.as_int::<i64>().is_none());
        assert!(entry.as_list().is_none());

        let entry = parser.parse::<Entry>(&[b'2', b':', 0xde, 0xad]).unwrap();
        assert_eq!(Some(&[0xde, 0xad][..]), entry.as_bytes());
        assert_eq!(None, entry.as_str());
    }

    #[test]
    fn debug_output() {
        let mut parser = Parser::new();
        let entry = parser.parse::<Entry>(b"d1:ai1e1:bl1:x2:\x01\x02ee").unwrap();
        assert_eq!(r#"{"a": 1, "b": ["x", <0102>]}"#, format!("{:?}", entry));
    }

    #[test]
    fn equality_ignores_position() {
        let mut a = Parser::new();
        let mut b = Parser::new();
        let x = a.parse::<Entry>(b"l1:xe").unwrap().as_list().unwrap();
        let y = b.parse::<Entry>(b"li1e1:xe").unwrap().as_list().unwrap();
        assert_eq!(x.iter().next(), y.iter().nth(1));
        assert_ne!(x.iter().next(), y.iter().next());
    }
}
