//! Sans-IO state machine that collects `ut_metadata` pieces from many peers
//! and verifies the result against the info-hash.
//!
//! The orchestrator feeds peer events in and forwards the piece assignments
//! returned by [`Assembler::schedule`] to the peers' sessions.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    net::SocketAddr,
    time::{Duration, Instant},
};

use bytes::Bytes;
use client::proto::{ext::MAX_METADATA_SIZE, InfoHash};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

mod piece;

pub use piece::{Insert, PieceState, PieceTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingSize,
    FetchingPieces,
    Verifying,
    Complete,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::AwaitingSize => "Waiting for metadata size",
            Phase::FetchingPieces => "Fetching metadata",
            Phase::Verifying => "Verifying metadata",
            Phase::Complete => "Metadata complete",
            Phase::Failed => "Metadata failed",
        };
        f.write_str(s)
    }
}

/// Snapshot published while an acquisition runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub phase: Phase,
    pub received: usize,
    /// Number of pieces, once the metadata size is known.
    pub total: Option<usize>,
    pub peers: usize,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            phase: Phase::AwaitingSize,
            received: 0,
            total: None,
            peers: 0,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(
                f,
                "{}: {}/{} pieces, {} peers",
                self.phase, self.received, total, self.peers
            ),
            None => write!(f, "{}: {} peers", self.phase, self.peers),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("Metadata failed verification {attempts} times")]
    VerificationExhausted { attempts: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    InProgress,
    Complete(Bytes),
    Failed(AssemblyError),
}

#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Outstanding requests allowed per peer.
    pub max_in_flight: usize,
    /// A request unanswered for this long counts as rejected.
    pub request_timeout: Duration,
    /// Failed verifications tolerated before giving up.
    pub max_attempts: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 2,
            request_timeout: Duration::from_secs(20),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    /// Spread requests over every usable peer.
    Parallel,
    /// Fetch a whole round from one peer, to single out a peer that serves
    /// corrupt data. `None` until a peer is picked.
    SingleSource(Option<SocketAddr>),
}

#[derive(Debug, Default)]
struct PeerSlot {
    advertised_size: Option<usize>,
    in_flight: HashMap<u32, Instant>,
    rejected: HashSet<u32>,
}

#[derive(Debug)]
pub struct Assembler {
    info_hash: InfoHash,
    config: AssemblerConfig,
    phase: Phase,
    table: Option<PieceTable>,
    peers: BTreeMap<SocketAddr, PeerSlot>,
    mode: FetchMode,
    tried_alone: HashSet<SocketAddr>,
    banned: HashSet<SocketAddr>,
    failures: usize,
    drops: Vec<SocketAddr>,
    status: Status,
}

impl Assembler {
    pub fn new(info_hash: InfoHash, config: AssemblerConfig) -> Self {
        Self {
            info_hash,
            config,
            phase: Phase::AwaitingSize,
            table: None,
            peers: BTreeMap::new(),
            mode: FetchMode::Parallel,
            tried_alone: HashSet::new(),
            banned: HashSet::new(),
            failures: 0,
            drops: Vec::new(),
            status: Status::InProgress,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn is_banned(&self, addr: &SocketAddr) -> bool {
        self.banned.contains(addr)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            phase: self.phase,
            received: self.table.as_ref().map_or(0, PieceTable::received),
            total: self.table.as_ref().map(PieceTable::len),
            peers: self.peers.len(),
        }
    }

    fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Complete | Phase::Failed)
    }

    /// Register a peer that completed the extension handshake. Returns false
    /// if the peer is banned and must not be used.
    pub fn add_peer(&mut self, addr: SocketAddr, metadata_size: Option<usize>) -> bool {
        if self.banned.contains(&addr) {
            return false;
        }

        debug!("Peer {} ready, advertised size: {:?}", addr, metadata_size);
        self.peers.insert(
            addr,
            PeerSlot {
                advertised_size: metadata_size,
                ..PeerSlot::default()
            },
        );
        true
    }

    /// Forget a peer and release the pieces it was asked for.
    pub fn remove_peer(&mut self, addr: SocketAddr) {
        if self.peers.remove(&addr).is_none() {
            return;
        }

        if let Some(table) = &mut self.table {
            table.release_peer(addr);
        }

        if !self.is_done() && self.mode == FetchMode::SingleSource(Some(addr)) {
            self.discard_round();
        }
    }

    /// Peers the orchestrator should disconnect: faulty or banned.
    pub fn take_drops(&mut self) -> Vec<SocketAddr> {
        std::mem::take(&mut self.drops)
    }

    fn drop_peer(&mut self, addr: SocketAddr, reason: &str) {
        debug!("Dropping peer {}: {}", addr, reason);
        self.remove_peer(addr);
        self.drops.push(addr);
    }

    pub fn on_reject(&mut self, addr: SocketAddr, piece: u32) {
        if self.is_done() {
            return;
        }

        let slot = match self.peers.get_mut(&addr) {
            Some(slot) => slot,
            None => return,
        };

        if slot.in_flight.remove(&piece).is_none() {
            return;
        }
        trace!("Peer {} rejected piece {}", addr, piece);
        slot.rejected.insert(piece);

        if let Some(table) = &mut self.table {
            table.release(piece, addr);
        }

        // A single source must be able to serve every piece
        if self.mode == FetchMode::SingleSource(Some(addr)) {
            self.discard_round();
        }
    }

    pub fn on_piece(
        &mut self,
        addr: SocketAddr,
        piece: u32,
        total_size: Option<usize>,
        data: Bytes,
    ) {
        if self.is_done() {
            return;
        }

        let slot = match self.peers.get_mut(&addr) {
            Some(slot) => slot,
            None => return,
        };

        if slot.in_flight.remove(&piece).is_none() {
            trace!("Ignoring unsolicited piece {} from {}", piece, addr);
            return;
        }
        let reported = total_size.or(slot.advertised_size);

        let fresh = self.table.is_none();
        let table = match &mut self.table {
            Some(table) => table,
            None => {
                let size = match reported {
                    Some(size) => size,
                    None => return self.drop_peer(addr, "metadata size unknown"),
                };
                if size == 0 || size > MAX_METADATA_SIZE {
                    return self.drop_peer(addr, "invalid metadata size");
                }

                let table = PieceTable::new(size);
                info!(
                    "Metadata size is {} bytes in {} pieces",
                    size,
                    table.len()
                );
                self.phase = Phase::FetchingPieces;
                self.table.insert(table)
            }
        };

        if let Some(size) = reported {
            if size != table.total_size() {
                // The size is unverified until the hash matches, so either
                // side may be lying
                if self.mode == FetchMode::Parallel {
                    warn!(
                        "Peers disagree on metadata size: {} vs {} from {}",
                        table.total_size(),
                        size,
                        addr
                    );
                    return self.discard_round();
                }
                return self.drop_peer(addr, "contradicting metadata size");
            }
        }

        let reason = match table.insert(piece, addr, data) {
            Insert::Filled => {
                trace!("Piece {} received from {}", piece, addr);
                None
            }
            Insert::Duplicate => {
                trace!("Duplicate piece {} from {}", piece, addr);
                None
            }
            Insert::WrongLength { expected, got } => {
                debug!("Piece {}: expected {} bytes, got {}", piece, expected, got);
                Some("wrong piece length")
            }
            Insert::OutOfRange => Some("piece out of range"),
        };

        if let Some(reason) = reason {
            // A size that its own source cannot back up is not kept
            if fresh {
                self.table = None;
                self.phase = Phase::AwaitingSize;
            }
            return self.drop_peer(addr, reason);
        }

        if table.is_complete() {
            self.verify();
        }
    }

    fn verify(&mut self) {
        self.phase = Phase::Verifying;

        let (data, contributors) = match &self.table {
            Some(table) => (table.assemble(), table.contributors()),
            None => return,
        };
        let data = match data {
            Some(data) => data,
            None => return,
        };

        if InfoHash::of(&data) == self.info_hash {
            info!("Metadata verified");
            self.phase = Phase::Complete;
            self.status = Status::Complete(data);
            return;
        }

        self.failures += 1;
        warn!(
            "Metadata verification failed ({}/{}), contributors: {:?}",
            self.failures, self.config.max_attempts, contributors
        );

        if self.failures >= self.config.max_attempts {
            self.phase = Phase::Failed;
            self.status = Status::Failed(AssemblyError::VerificationExhausted {
                attempts: self.failures,
            });
            return;
        }

        if contributors.len() == 1 {
            for addr in contributors {
                self.banned.insert(addr);
                self.drop_peer(addr, "served corrupt metadata");
            }
        }

        self.discard_round();
    }

    /// Forget the current round, metadata size included, and fetch the next
    /// one from a single peer. Answers to requests of the discarded round are
    /// ignored as unsolicited.
    fn discard_round(&mut self) {
        self.table = None;
        self.phase = Phase::AwaitingSize;
        for slot in self.peers.values_mut() {
            slot.in_flight.clear();
            slot.rejected.clear();
        }
        self.mode = FetchMode::SingleSource(None);
    }

    fn pick_single_source(&mut self) -> Option<SocketAddr> {
        let addr = self
            .peers
            .keys()
            .find(|addr| !self.tried_alone.contains(*addr))
            .or_else(|| self.peers.keys().next())
            .copied()?;

        debug!("Fetching next round from {} alone", addr);
        self.tried_alone.insert(addr);
        self.mode = FetchMode::SingleSource(Some(addr));
        Some(addr)
    }

    /// Expire stale requests and hand out new ones. Returns `(peer, piece)`
    /// pairs to request.
    pub fn schedule(&mut self, now: Instant) -> Vec<(SocketAddr, u32)> {
        if self.is_done() {
            return Vec::new();
        }

        self.expire(now);

        let eligible: Vec<SocketAddr> = match self.mode {
            FetchMode::Parallel => self.peers.keys().copied().collect(),
            FetchMode::SingleSource(Some(addr)) => vec![addr],
            FetchMode::SingleSource(None) => self.pick_single_source().into_iter().collect(),
        };

        let mut assignments = Vec::new();
        let (table, peers) = match &mut self.table {
            Some(table) => (table, &mut self.peers),
            None => {
                // Piece 0 tells the size
                for addr in eligible {
                    if let Some(slot) = self.peers.get_mut(&addr) {
                        if slot.in_flight.is_empty() && !slot.rejected.contains(&0) {
                            slot.in_flight.insert(0, now);
                            assignments.push((addr, 0));
                        }
                    }
                }
                return assignments;
            }
        };

        // Round-robin so that pieces spread over peers
        loop {
            let mut assigned = false;
            for addr in &eligible {
                let slot = match peers.get_mut(addr) {
                    Some(slot) => slot,
                    None => continue,
                };
                if slot.in_flight.len() >= self.config.max_in_flight {
                    continue;
                }

                let rejected = &slot.rejected;
                if let Some(piece) = table.next_missing(|i| rejected.contains(&i)) {
                    table.mark_requested(piece, *addr);
                    slot.in_flight.insert(piece, now);
                    assignments.push((*addr, piece));
                    assigned = true;
                }
            }
            if !assigned {
                break;
            }
        }

        assignments
    }

    fn expire(&mut self, now: Instant) {
        let timeout = self.config.request_timeout;
        let mut expired = Vec::new();
        for (addr, slot) in &self.peers {
            for (piece, sent) in &slot.in_flight {
                if now.saturating_duration_since(*sent) >= timeout {
                    expired.push((*addr, *piece));
                }
            }
        }

        for (addr, piece) in expired {
            debug!("Request for piece {} to {} timed out", piece, addr);
            self.on_reject(addr, piece);
        }
    }
}

#[cfg(test)]
mod tests {
    use client::proto::ext::METADATA_PIECE_LEN;

    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn metadata(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    fn piece(data: &[u8], index: u32) -> Bytes {
        let start = index as usize * METADATA_PIECE_LEN;
        let end = (start + METADATA_PIECE_LEN).min(data.len());
        Bytes::copy_from_slice(&data[start..end])
    }

    fn corrupt(mut b: Vec<u8>) -> Bytes {
        b[0] ^= 0xff;
        b.into()
    }

    fn assembler(data: &[u8]) -> Assembler {
        Assembler::new(InfoHash::of(data), AssemblerConfig::default())
    }

    #[test]
    fn single_peer_happy_path() {
        let data = metadata(41768);
        let mut a = assembler(&data);
        let now = Instant::now();

        assert_eq!(Phase::AwaitingSize, a.phase());
        assert!(a.add_peer(addr(1), Some(41768)));
        assert_eq!(vec![(addr(1), 0)], a.schedule(now));
        // Piece 0 already outstanding
        assert!(a.schedule(now).is_empty());

        a.on_piece(addr(1), 0, Some(41768), piece(&data, 0));
        assert_eq!(Phase::FetchingPieces, a.phase());
        assert_eq!(Some(3), a.progress().total);

        assert_eq!(vec![(addr(1), 1), (addr(1), 2)], a.schedule(now));
        a.on_piece(addr(1), 2, Some(41768), piece(&data, 2));
        a.on_piece(addr(1), 1, Some(41768), piece(&data, 1));

        assert_eq!(Phase::Complete, a.phase());
        assert_eq!(&Status::Complete(Bytes::from(data)), a.status());
    }

    #[test]
    fn size_from_extension_handshake() {
        let data = metadata(100);
        let mut a = assembler(&data);
        a.add_peer(addr(1), Some(100));
        a.schedule(Instant::now());
        a.on_piece(addr(1), 0, None, piece(&data, 0));
        assert_eq!(Phase::Complete, a.phase());
    }

    #[test]
    fn unknown_or_invalid_size_drops_peer() {
        let data = metadata(100);
        let mut a = assembler(&data);
        a.add_peer(addr(1), None);
        a.add_peer(addr(2), None);
        a.schedule(Instant::now());

        a.on_piece(addr(1), 0, None, piece(&data, 0));
        a.on_piece(addr(2), 0, Some(MAX_METADATA_SIZE + 1), piece(&data, 0));
        assert_eq!(vec![addr(1), addr(2)], a.take_drops());
        assert_eq!(Phase::AwaitingSize, a.phase());
        assert_eq!(0, a.progress().peers);
    }

    #[test]
    fn pieces_spread_over_peers() {
        let data = metadata(4 * METADATA_PIECE_LEN);
        let mut a = Assembler::new(
            InfoHash::of(&data),
            AssemblerConfig {
                max_in_flight: 1,
                ..AssemblerConfig::default()
            },
        );
        let now = Instant::now();
        a.add_peer(addr(1), None);
        a.add_peer(addr(2), None);
        assert_eq!(vec![(addr(1), 0), (addr(2), 0)], a.schedule(now));

        a.on_piece(addr(1), 0, Some(data.len()), piece(&data, 0));
        // addr(2) still has its piece 0 request outstanding
        assert_eq!(vec![(addr(1), 1)], a.schedule(now));

        a.on_piece(addr(2), 0, Some(data.len()), piece(&data, 0));
        assert_eq!(vec![(addr(2), 2)], a.schedule(now));
        assert_eq!(Some(&PieceState::Requested { peer: addr(1) }), a.table.as_ref().and_then(|t| t.state(1)));
    }

    #[test]
    fn duplicate_response_is_noop() {
        let data = metadata(2 * METADATA_PIECE_LEN);
        let mut a = assembler(&data);
        let now = Instant::now();
        a.add_peer(addr(1), None);
        a.add_peer(addr(2), None);
        a.schedule(now);

        a.on_piece(addr(1), 0, Some(data.len()), piece(&data, 0));
        a.on_piece(addr(2), 0, Some(data.len()), corrupt(piece(&data, 0).to_vec()));
        assert_eq!(1, a.progress().received);
        assert!(a.take_drops().is_empty());

        for (peer, index) in a.schedule(now) {
            a.on_piece(peer, index, Some(data.len()), piece(&data, index));
        }
        assert_eq!(Phase::Complete, a.phase());
    }

    #[test]
    fn reject_moves_piece_to_other_peer() {
        let data = metadata(2 * METADATA_PIECE_LEN);
        let mut a = Assembler::new(
            InfoHash::of(&data),
            AssemblerConfig {
                max_in_flight: 1,
                ..AssemblerConfig::default()
            },
        );
        let now = Instant::now();
        a.add_peer(addr(1), None);
        assert_eq!(vec![(addr(1), 0)], a.schedule(now));
        a.on_piece(addr(1), 0, Some(data.len()), piece(&data, 0));
        assert_eq!(vec![(addr(1), 1)], a.schedule(now));

        a.on_reject(addr(1), 1);
        assert!(a.schedule(now).is_empty());

        a.add_peer(addr(2), None);
        assert_eq!(vec![(addr(2), 1)], a.schedule(now));
        a.on_piece(addr(2), 1, Some(data.len()), piece(&data, 1));
        assert_eq!(Phase::Complete, a.phase());
    }

    #[test]
    fn request_timeout_counts_as_reject() {
        let data = metadata(2 * METADATA_PIECE_LEN);
        let mut a = assembler(&data);
        let start = Instant::now();
        a.add_peer(addr(1), None);
        a.schedule(start);
        a.on_piece(addr(1), 0, Some(data.len()), piece(&data, 0));
        assert_eq!(vec![(addr(1), 1)], a.schedule(start));

        a.add_peer(addr(2), None);
        let later = start + Duration::from_secs(21);
        assert_eq!(vec![(addr(2), 1)], a.schedule(later));
    }

    #[test]
    fn disconnect_releases_requests() {
        let data = metadata(2 * METADATA_PIECE_LEN);
        let mut a = assembler(&data);
        let now = Instant::now();
        a.add_peer(addr(1), None);
        a.schedule(now);
        a.on_piece(addr(1), 0, Some(data.len()), piece(&data, 0));
        a.schedule(now);

        a.remove_peer(addr(1));
        a.add_peer(addr(2), None);
        assert_eq!(vec![(addr(2), 1)], a.schedule(now));
    }

    #[test]
    fn contradicting_size_restarts_round() {
        let data = metadata(2 * METADATA_PIECE_LEN);
        let mut a = assembler(&data);
        let now = Instant::now();
        a.add_peer(addr(1), None);
        a.add_peer(addr(2), None);
        a.schedule(now);
        a.on_piece(addr(1), 0, Some(data.len()), piece(&data, 0));
        a.schedule(now);
        a.on_piece(addr(2), 0, Some(data.len() + 1), piece(&data, 0));

        assert!(a.take_drops().is_empty());
        assert_eq!(Phase::AwaitingSize, a.phase());
        assert_eq!(None, a.progress().total);
        assert_eq!(2, a.progress().peers);
        // Only one peer is asked for piece 0 now
        assert_eq!(vec![(addr(1), 0)], a.schedule(now));
    }

    #[test]
    fn wrong_length_drops_peer() {
        let data = metadata(2 * METADATA_PIECE_LEN);
        let mut a = assembler(&data);
        let now = Instant::now();
        a.add_peer(addr(1), None);
        a.schedule(now);
        a.on_piece(addr(1), 0, Some(data.len()), Bytes::from_static(b"short"));
        assert_eq!(vec![addr(1)], a.take_drops());
        assert_eq!(Phase::AwaitingSize, a.phase());
        assert_eq!(None, a.progress().total);
    }

    #[test]
    fn bogus_size_is_forgotten() {
        let data = metadata(41768);
        let mut a = assembler(&data);
        let hostile = addr(1);
        let now = Instant::now();
        a.add_peer(hostile, None);
        assert_eq!(vec![(hostile, 0)], a.schedule(now));

        a.on_piece(hostile, 0, Some(100), Bytes::from(vec![0; 100]));
        assert!(a.is_banned(&hostile));
        assert_eq!(vec![hostile], a.take_drops());
        assert_eq!(Phase::AwaitingSize, a.phase());
        assert_eq!(None, a.progress().total);

        for port in 10..=14 {
            a.add_peer(addr(port), Some(data.len()));
        }
        let mut rounds = 0;
        while a.phase() != Phase::Complete {
            rounds += 1;
            assert!(rounds < 10, "no progress");
            for (peer, index) in a.schedule(now) {
                a.on_piece(peer, index, Some(data.len()), piece(&data, index));
            }
        }
        assert!(a.take_drops().is_empty());
        assert_eq!(&Status::Complete(Bytes::from(data)), a.status());
    }

    #[test]
    fn bogus_size_racing_honest_peer() {
        let data = metadata(41768);
        let mut a = assembler(&data);
        let hostile = addr(1);
        let honest = addr(2);
        let bogus = 2 * METADATA_PIECE_LEN;
        let now = Instant::now();
        a.add_peer(hostile, None);
        a.add_peer(honest, None);

        let serve = |a: &mut Assembler, peer: SocketAddr, index: u32| {
            if peer == hostile {
                a.on_piece(peer, index, Some(bogus), Bytes::from(vec![0; METADATA_PIECE_LEN]));
            } else {
                a.on_piece(peer, index, Some(data.len()), piece(&data, index));
            }
        };

        assert_eq!(vec![(hostile, 0), (honest, 0)], a.schedule(now));
        serve(&mut a, hostile, 0);
        assert_eq!(Some(2), a.progress().total);
        serve(&mut a, honest, 0);
        assert!(a.take_drops().is_empty());
        assert_eq!(Phase::AwaitingSize, a.phase());

        let mut rounds = 0;
        while a.phase() != Phase::Complete {
            rounds += 1;
            assert!(rounds < 10, "no progress");
            for (peer, index) in a.schedule(now) {
                serve(&mut a, peer, index);
            }
        }
        assert!(a.is_banned(&hostile));
        assert!(!a.is_banned(&honest));
        assert_eq!(vec![hostile], a.take_drops());
    }

    #[test]
    fn slow_peer_retried_next_round() {
        let data = metadata(100);
        let mut a = assembler(&data);
        let start = Instant::now();
        let later = start + Duration::from_secs(21);
        a.add_peer(addr(1), None);
        assert_eq!(vec![(addr(1), 0)], a.schedule(start));

        a.add_peer(addr(2), None);
        assert_eq!(vec![(addr(2), 0)], a.schedule(later));
        a.on_piece(addr(2), 0, Some(100), corrupt(data.clone()));
        assert!(a.is_banned(&addr(2)));

        assert_eq!(vec![(addr(1), 0)], a.schedule(later));
        a.on_piece(addr(1), 0, Some(100), piece(&data, 0));
        assert_eq!(Phase::Complete, a.phase());
    }

    #[test]
    fn corrupt_peer_isolated_and_banned() {
        let data = metadata(41768);
        let mut a = assembler(&data);
        let honest = addr(2);
        let hostile = addr(1);
        let now = Instant::now();
        a.add_peer(hostile, None);
        a.add_peer(honest, None);

        let serve = |a: &mut Assembler, peer: SocketAddr, index: u32| {
            let p = piece(&data, index);
            let p = if peer == hostile { corrupt(p.to_vec()) } else { p };
            a.on_piece(peer, index, Some(data.len()), p);
        };

        // Round 1: both peers contribute, verification fails
        let mut rounds = 0;
        while a.phase() != Phase::Complete {
            rounds += 1;
            assert!(rounds < 10, "no progress");
            for (peer, index) in a.schedule(now) {
                serve(&mut a, peer, index);
            }
        }

        assert!(a.is_banned(&hostile));
        assert!(!a.is_banned(&honest));
        assert_eq!(vec![hostile], a.take_drops());
        assert_eq!(&Status::Complete(Bytes::from(data.clone())), a.status());
        assert!(!a.add_peer(hostile, None));
    }

    #[test]
    fn verification_exhausted() {
        let data = metadata(100);
        let mut a = Assembler::new(
            InfoHash::of(&data),
            AssemblerConfig {
                max_attempts: 2,
                ..AssemblerConfig::default()
            },
        );
        let now = Instant::now();
        for port in 1..=3 {
            a.add_peer(addr(port), None);
        }

        while a.phase() != Phase::Failed {
            let assignments = a.schedule(now);
            assert!(!assignments.is_empty());
            for (peer, index) in assignments {
                a.on_piece(peer, index, Some(100), corrupt(data.clone()));
            }
        }

        assert_eq!(
            &Status::Failed(AssemblyError::VerificationExhausted { attempts: 2 }),
            a.status()
        );
        assert!(a.schedule(now).is_empty());
    }
}
