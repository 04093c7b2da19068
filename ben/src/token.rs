use std::ops::Range;

/// One parsed value. A container is followed by the tokens of its children,
/// depth first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: Kind,
    /// Strings and integers exclude their framing, containers include it.
    pub start: u32,
    pub end: u32,
    /// Tokens in this subtree, this one included.
    pub span: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Dict,
    List,
    Bytes,
    Int,
}

impl Token {
    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}
