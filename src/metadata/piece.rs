use std::{collections::BTreeSet, net::SocketAddr};

use bytes::{Bytes, BytesMut};
use client::proto::ext::METADATA_PIECE_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PieceState {
    Missing,
    Requested { peer: SocketAddr },
    Received { from: SocketAddr, data: Bytes },
}

#[derive(Debug, PartialEq, Eq)]
pub enum Insert {
    Filled,
    /// The slot was already filled; the response is dropped.
    Duplicate,
    WrongLength { expected: usize, got: usize },
    OutOfRange,
}

/// Metadata pieces of one fetch round, indexed by piece number.
#[derive(Debug)]
pub struct PieceTable {
    total_size: usize,
    pieces: Vec<PieceState>,
    received: usize,
}

impl PieceTable {
    pub fn new(total_size: usize) -> Self {
        let count = (total_size + METADATA_PIECE_LEN - 1) / METADATA_PIECE_LEN;
        Self {
            total_size,
            pieces: vec![PieceState::Missing; count],
            received: 0,
        }
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.pieces.len()
    }

    pub fn state(&self, index: u32) -> Option<&PieceState> {
        self.pieces.get(index as usize)
    }

    /// Expected length of the given piece: full pieces except for the last.
    pub fn piece_len(&self, index: u32) -> usize {
        let start = index as usize * METADATA_PIECE_LEN;
        METADATA_PIECE_LEN.min(self.total_size.saturating_sub(start))
    }

    /// First missing piece for which `skip` returns false.
    pub fn next_missing(&self, skip: impl Fn(u32) -> bool) -> Option<u32> {
        self.pieces
            .iter()
            .enumerate()
            .filter(|(_, state)| matches!(state, PieceState::Missing))
            .map(|(i, _)| i as u32)
            .find(|&i| !skip(i))
    }

    pub fn mark_requested(&mut self, index: u32, peer: SocketAddr) {
        if let Some(state) = self.pieces.get_mut(index as usize) {
            if *state == PieceState::Missing {
                *state = PieceState::Requested { peer };
            }
        }
    }

    /// Return a piece requested from `peer` to `Missing`.
    pub fn release(&mut self, index: u32, peer: SocketAddr) {
        if let Some(state) = self.pieces.get_mut(index as usize) {
            if *state == (PieceState::Requested { peer }) {
                *state = PieceState::Missing;
            }
        }
    }

    /// Return every piece requested from `peer` to `Missing`.
    pub fn release_peer(&mut self, peer: SocketAddr) {
        for state in &mut self.pieces {
            if *state == (PieceState::Requested { peer }) {
                *state = PieceState::Missing;
            }
        }
    }

    pub fn insert(&mut self, index: u32, from: SocketAddr, data: Bytes) -> Insert {
        let expected = self.piece_len(index);
        let state = match self.pieces.get_mut(index as usize) {
            Some(state) => state,
            None => return Insert::OutOfRange,
        };

        if let PieceState::Received { .. } = state {
            return Insert::Duplicate;
        }
        if data.len() != expected {
            return Insert::WrongLength {
                expected,
                got: data.len(),
            };
        }

        *state = PieceState::Received { from, data };
        self.received += 1;
        Insert::Filled
    }

    /// Peers that delivered at least one received piece.
    pub fn contributors(&self) -> BTreeSet<SocketAddr> {
        self.pieces
            .iter()
            .filter_map(|state| match state {
                PieceState::Received { from, .. } => Some(*from),
                _ => None,
            })
            .collect()
    }

    /// Concatenate all pieces in index order, if every piece is present.
    pub fn assemble(&self) -> Option<Bytes> {
        let mut buf = BytesMut::with_capacity(self.total_size);
        for state in &self.pieces {
            match state {
                PieceState::Received { data, .. } => buf.extend_from_slice(data),
                _ => return None,
            }
        }
        Some(buf.freeze())
    }
}
