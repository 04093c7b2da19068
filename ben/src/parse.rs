use std::ops::Range;

use crate::decode::{Decode, Entry};
use crate::error::{Error, Result};
use crate::token::{Kind, Token};

const DEFAULT_DEPTH_LIMIT: usize = 64;

/// Reusable bencode parser. The token buffer is kept between calls, so one
/// parser per connection avoids reallocating for every message.
pub struct Parser {
    tokens: Vec<Token>,
    token_limit: usize,
    depth_limit: usize,
    sorted_keys: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            token_limit: usize::MAX,
            depth_limit: DEFAULT_DEPTH_LIMIT,
            sorted_keys: true,
        }
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of values in one input.
    pub fn token_limit(&mut self, limit: usize) {
        self.token_limit = limit;
    }

    /// Maximum container nesting. Defaults to 64.
    pub fn depth_limit(&mut self, limit: usize) {
        self.depth_limit = limit;
    }

    /// Require dictionary keys in strictly increasing byte order (the
    /// default). Other clients are not always canonical, so wire parsers
    /// turn this off.
    pub fn sorted_keys(&mut self, sorted: bool) {
        self.sorted_keys = sorted;
    }

    /// Parse `buf`, which must hold exactly one value.
    pub fn parse<'b, 'p, T>(&'p mut self, buf: &'b [u8]) -> Result<T>
    where
        T: Decode<'b, 'p>,
    {
        let (entry, len) = self.tokenize(buf)?;
        if len != buf.len() {
            return Err(Error::TrailingData { pos: len });
        }
        T::decode(entry)
    }

    /// Parse the value at the start of `buf`. Returns it together with the
    /// number of bytes it took, for payloads that carry raw data after a
    /// bencoded header.
    pub fn parse_prefix<'b, 'p, T>(&'p mut self, buf: &'b [u8]) -> Result<(T, usize)>
    where
        T: Decode<'b, 'p>,
    {
        let (entry, len) = self.tokenize(buf)?;
        Ok((T::decode(entry)?, len))
    }

    fn tokenize<'b, 'p>(&'p mut self, buf: &'b [u8]) -> Result<(Entry<'b, 'p>, usize)> {
        if buf.len() > u32::MAX as usize {
            return Err(Error::Overflow { pos: 0 });
        }

        self.tokens.clear();
        let mut cursor = Cursor {
            buf,
            pos: 0,
            tokens: &mut self.tokens,
            token_limit: self.token_limit,
            depth_limit: self.depth_limit,
            sorted_keys: self.sorted_keys,
        };
        cursor.value(0)?;
        let len = cursor.pos;

        Ok((Entry::new(buf, &self.tokens, 0), len))
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    tokens: &'a mut Vec<Token>,
    token_limit: usize,
    depth_limit: usize,
    sorted_keys: bool,
}

impl Cursor<'_> {
    fn invalid(&self, reason: &'static str, pos: usize) -> Error {
        Error::Invalid { reason, pos }
    }

    fn peek(&self) -> Result<u8> {
        self.buf.get(self.pos).copied().ok_or(Error::Eof)
    }

    fn push(&mut self, kind: Kind, start: usize, end: usize) -> Result<usize> {
        if self.tokens.len() >= self.token_limit {
            return Err(Error::TokenLimit {
                limit: self.token_limit,
            });
        }

        self.tokens.push(Token {
            kind,
            start: start as u32,
            end: end as u32,
            span: 1,
        });
        Ok(self.tokens.len() - 1)
    }

    fn value(&mut self, depth: usize) -> Result<()> {
        match self.peek()? {
            b'd' => self.container(Kind::Dict, depth),
            b'l' => self.container(Kind::List, depth),
            b'i' => self.int(),
            b'0'..=b'9' => self.string().map(drop),
            _ => Err(self.invalid("Unexpected character", self.pos)),
        }
    }

    fn container(&mut self, kind: Kind, depth: usize) -> Result<()> {
        if depth >= self.depth_limit {
            return Err(Error::DepthLimit {
                limit: self.depth_limit,
            });
        }

        let index = self.push(kind, self.pos, self.pos)?;
        self.pos += 1;

        let mut last_key = None;
        while self.peek()? != b'e' {
            if kind == Kind::Dict {
                last_key = Some(self.key(last_key)?);
                if self.peek()? == b'e' {
                    return Err(self.invalid("Missing dictionary value", self.pos));
                }
            }
            self.value(depth + 1)?;
        }
        self.pos += 1;

        let span = self.tokens.len() - index;
        let token = &mut self.tokens[index];
        token.end = self.pos as u32;
        token.span = span as u32;
        Ok(())
    }

    fn key(&mut self, last: Option<Range<usize>>) -> Result<Range<usize>> {
        let at = self.pos;
        if !self.peek()?.is_ascii_digit() {
            return Err(self.invalid("Dictionary key must be a string", at));
        }

        let key = self.string()?;
        let buf = self.buf;
        if std::str::from_utf8(&buf[key.clone()]).is_err() {
            return Err(self.invalid("Dictionary key is not UTF-8", at));
        }

        if let Some(last) = last {
            if self.sorted_keys && buf[last] >= buf[key.clone()] {
                return Err(self.invalid("Dictionary keys must be sorted and unique", at));
            }
        }
        Ok(key)
    }

    fn int(&mut self) -> Result<()> {
        self.pos += 1;
        let start = self.pos;
        if self.peek()? == b'-' {
            self.pos += 1;
        }

        let digits = self.pos;
        while self.peek()?.is_ascii_digit() {
            self.pos += 1;
        }

        let end = self.pos;
        match &self.buf[digits..end] {
            [] => return Err(self.invalid("Expected a digit", digits)),
            [b'0', _, ..] => return Err(self.invalid("Leading zero", digits)),
            [b'0'] if digits > start => return Err(self.invalid("Negative zero", start)),
            _ => {}
        }

        if self.peek()? != b'e' {
            return Err(self.invalid("Expected end of integer", self.pos));
        }
        self.pos += 1;

        self.push(Kind::Int, start, end)?;
        Ok(())
    }

    /// Parses a byte string and returns the range of its contents.
    fn string(&mut self) -> Result<Range<usize>> {
        let header = self.pos;
        while self.peek()?.is_ascii_digit() {
            self.pos += 1;
        }

        let digits = &self.buf[header..self.pos];
        if digits.len() > 1 && digits[0] == b'0' {
            return Err(self.invalid("Leading zero", header));
        }

        let len = digits
            .iter()
            .try_fold(0usize, |n, d| n.checked_mul(10)?.checked_add((d - b'0') as usize))
            .ok_or(Error::Overflow { pos: header })?;

        if self.peek()? != b':' {
            return Err(self.invalid("Expected ':' after string length", self.pos));
        }
        self.pos += 1;

        if len > self.buf.len() - self.pos {
            return Err(Error::Eof);
        }

        let start = self.pos;
        self.pos += len;
        self.push(Kind::Bytes, start, self.pos)?;
        Ok(start..self.pos)
    }
}
