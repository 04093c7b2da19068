use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use ben::{Encode, Parser};
use tracing::{debug, trace};

use crate::id::NodeId;
use crate::msg::{GetPeers, Msg, Response, TxnId};

/// Alive nodes closest to the target after which the lookup stops.
const K: usize = 8;
/// Requests in flight at once.
const BRANCH_FACTOR: usize = 3;
const MAX_NODES: usize = 100;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

bitflags::bitflags! {
    struct Status: u8 {
        const INITIAL = 1 << 0;
        const QUERIED = 1 << 1;
        const ALIVE   = 1 << 2;
        const FAILED  = 1 << 3;
        /// A bootstrap router, its id is learnt from its answer.
        const NO_ID   = 1 << 4;
    }
}

#[derive(Debug)]
struct Node {
    id: NodeId,
    /// Distance to the target.
    key: NodeId,
    addr: SocketAddr,
    status: Status,
}

#[derive(Debug)]
struct Pending {
    addr: SocketAddr,
    sent: Instant,
}

/// A datagram to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    pub addr: SocketAddr,
    pub data: Vec<u8>,
}

/// Iterative `get_peers` walk towards one info-hash. The caller moves
/// datagrams in and out and drives the clock.
pub struct Lookup {
    own_id: NodeId,
    target: NodeId,
    nodes: Vec<Node>,
    txns: HashMap<TxnId, Pending>,
    next_txn: TxnId,
    peers: Vec<SocketAddr>,
    seen: HashSet<SocketAddr>,
    outgoing: VecDeque<Transmit>,
    parser: Parser,
    done: bool,
}

impl Lookup {
    pub fn new(own_id: NodeId, target: NodeId, routers: &[SocketAddr], now: Instant) -> Self {
        let nodes = routers
            .iter()
            .map(|&addr| Node {
                id: NodeId::default(),
                key: NodeId::all(0xff),
                addr,
                status: Status::INITIAL | Status::NO_ID,
            })
            .collect();

        let mut parser = Parser::new();
        parser.sorted_keys(false);

        let mut lookup = Self {
            own_id,
            target,
            nodes,
            txns: HashMap::new(),
            next_txn: TxnId(rand::random()),
            peers: vec![],
            seen: HashSet::new(),
            outgoing: VecDeque::new(),
            parser,
            done: false,
        };
        lookup.add_requests(now);
        lookup
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }

    pub fn into_peers(self) -> Vec<SocketAddr> {
        self.peers
    }

    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.outgoing.pop_front()
    }

    /// When the oldest outstanding request expires.
    pub fn next_timeout(&self) -> Option<Instant> {
        self.txns.values().map(|p| p.sent + REQUEST_TIMEOUT).min()
    }

    pub fn receive(&mut self, buf: &[u8], from: SocketAddr, now: Instant) {
        let msg = match Msg::parse(&mut self.parser, buf) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Error parsing message from {}: {}", from, e);
                return;
            }
        };

        match msg {
            Msg::Response(resp) => self.handle_response(resp, from),
            Msg::Error { txn_id, code } => {
                if self.take_txn(txn_id, from) {
                    debug!("Error {} from {}", code, from);
                    self.mark_failed(from);
                }
            }
            Msg::Query { .. } => trace!("Ignoring query from {}", from),
        }

        self.add_requests(now);
    }

    /// Expire requests older than [`REQUEST_TIMEOUT`].
    pub fn tick(&mut self, now: Instant) {
        let expired: Vec<_> = self
            .txns
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.sent) >= REQUEST_TIMEOUT)
            .map(|(txn_id, p)| (*txn_id, p.addr))
            .collect();

        for (txn_id, addr) in expired {
            trace!("Request to {} timed out", addr);
            self.txns.remove(&txn_id);
            self.mark_failed(addr);
        }

        self.add_requests(now);
    }

    /// The node could not be sent to.
    pub fn set_failed(&mut self, addr: SocketAddr, now: Instant) {
        self.txns.retain(|_, p| p.addr != addr);
        self.mark_failed(addr);
        self.add_requests(now);
    }

    fn mark_failed(&mut self, addr: SocketAddr) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.addr == addr) {
            node.status.insert(Status::FAILED);
        }
    }

    fn take_txn(&mut self, txn_id: TxnId, from: SocketAddr) -> bool {
        match self.txns.get(&txn_id) {
            Some(p) if p.addr == from => {
                self.txns.remove(&txn_id);
                true
            }
            _ => {
                trace!("Unexpected transaction {:?} from {}", txn_id, from);
                false
            }
        }
    }

    fn handle_response(&mut self, resp: Response, from: SocketAddr) {
        if !self.take_txn(resp.txn_id, from) {
            return;
        }

        let target = self.target;
        if let Some(node) = self.nodes.iter_mut().find(|n| n.addr == from) {
            node.id = resp.id;
            node.key = resp.id ^ target;
            node.status.remove(Status::NO_ID);
            node.status.insert(Status::ALIVE);
        }

        if !resp.values.is_empty() {
            debug!("{} returned {} peers", from, resp.values.len());
        }
        for peer in resp.values {
            if self.seen.insert(peer) {
                self.peers.push(peer);
            }
        }

        for c in resp.nodes {
            let known = self
                .nodes
                .iter()
                .any(|n| n.addr == c.addr || (n.id == c.id && !n.status.contains(Status::NO_ID)));
            if !known {
                self.nodes.push(Node {
                    id: c.id,
                    key: c.id ^ target,
                    addr: c.addr,
                    status: Status::INITIAL,
                });
            }
        }

        self.nodes.sort_by_key(|n| n.key);
        self.nodes.truncate(MAX_NODES);
    }

    fn add_requests(&mut self, now: Instant) {
        let mut pending = 0;
        let mut alive = 0;

        for node in &mut self.nodes {
            if alive == K || pending == BRANCH_FACTOR {
                break;
            }

            if node.status.contains(Status::FAILED) {
                continue;
            }
            if node.status.contains(Status::ALIVE) {
                alive += 1;
                continue;
            }
            if node.status.contains(Status::QUERIED) {
                pending += 1;
                continue;
            }

            let msg = GetPeers {
                txn_id: self.next_txn.next_id(),
                id: self.own_id,
                info_hash: self.target,
            };
            trace!("Send get_peers to {}", node.addr);
            self.outgoing.push_back(Transmit {
                addr: node.addr,
                data: msg.encode_to_vec(),
            });
            self.txns.insert(
                msg.txn_id,
                Pending {
                    addr: node.addr,
                    sent: now,
                },
            );
            node.status.insert(Status::QUERIED);
            pending += 1;
        }

        trace!("Pending: {}, alive: {}, peers: {}", pending, alive, self.peers.len());
        self.done = (pending == 0 && alive == K) || self.txns.is_empty();
    }
}
