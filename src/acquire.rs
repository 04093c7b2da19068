//! Drives one magnet-to-metadata acquisition: discovery rounds feed peer
//! sessions, sessions feed the assembler, the assembler decides what each
//! peer is asked for.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    net::SocketAddr,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use client::{
    proto::{ext::MetadataMsg, magnet::MagnetUri, torrent::Torrent, InfoHash, PeerId},
    SessionConfig, SessionError, SessionReader, SessionWriter,
};
use futures::{
    future::{self, BoxFuture},
    stream::{BoxStream, FuturesUnordered},
    FutureExt, StreamExt,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        watch,
    },
    time::{interval, sleep, sleep_until, Instant},
};
use tracing::{debug, info, info_span, trace, Instrument};

use crate::{
    config::Config,
    discovery::{DhtDiscovery, Discovery, PeerHints, PeerSource, TrackerDiscovery},
    error::{Error, Result},
    metadata::{Assembler, Progress, Status},
    output, peer,
};

/// A verified info dictionary.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub info_hash: InfoHash,
    pub info: Bytes,
}

impl Metadata {
    /// Wrap the info dictionary into a `.torrent` stamped with `created_by`
    /// and the current time.
    pub fn into_torrent(self, trackers: Vec<String>, created_by: impl Into<String>) -> Torrent {
        let torrent = Torrent::new(self.info, trackers).with_created_by(created_by);
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(now) => torrent.with_creation_date(now.as_secs() as i64),
            Err(_) => torrent,
        }
    }
}

#[derive(Debug)]
enum PeerEvent {
    Ready {
        addr: SocketAddr,
        metadata_size: Option<usize>,
    },
    Piece {
        addr: SocketAddr,
        piece: u32,
        total_size: Option<usize>,
        data: Bytes,
    },
    Rejected {
        addr: SocketAddr,
        piece: u32,
    },
}

pub struct Acquisition {
    info_hash: InfoHash,
    peer_id: PeerId,
    config: Config,
    source: PeerSource,
    trackers: Vec<String>,
    name: String,
    progress_tx: watch::Sender<Progress>,
    progress_rx: watch::Receiver<Progress>,
}

impl Acquisition {
    pub fn new(magnet: &MagnetUri, config: Config) -> Self {
        let peer_id = peer::generate_peer_id();
        debug!("Our peer_id: {:?}", String::from_utf8_lossy(&peer_id));

        let mut source = PeerSource::new(magnet.info_hash, peer_id, config.discovery_timeout);
        if !magnet.peers.is_empty() {
            source.add(PeerHints(magnet.peers.clone()));
        }
        for url in &magnet.trackers {
            source.add(TrackerDiscovery::new(url, config.port));
        }
        if !config.dht_routers.is_empty() {
            source.add(DhtDiscovery::new(config.dht_routers.clone(), config.dht_timeout));
        }

        let (progress_tx, progress_rx) = watch::channel(Progress::default());
        Self {
            info_hash: magnet.info_hash,
            peer_id,
            config,
            source,
            trackers: magnet.trackers.clone(),
            name: magnet.name(),
            progress_tx,
            progress_rx,
        }
    }

    /// Add another peer source.
    pub fn with_discovery(mut self, discovery: impl Discovery + 'static) -> Self {
        self.source.add(discovery);
        self
    }

    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress_rx.clone()
    }

    pub async fn run(self) -> Result<Metadata> {
        if self.source.is_empty() {
            return Err(Error::NoPeerSources);
        }

        let Acquisition {
            info_hash,
            peer_id,
            config,
            source,
            progress_tx,
            ..
        } = self;

        let started = Instant::now();
        let deadline = sleep(config.timeout);
        tokio::pin!(deadline);
        let mut tick = interval(config.progress_interval);

        let mut assembler = Assembler::new(info_hash, config.assembler.clone());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut peers: HashMap<SocketAddr, UnboundedSender<u32>> = HashMap::new();
        let mut live = HashSet::new();
        let mut sessions = FuturesUnordered::<BoxFuture<'static, SocketAddr>>::new();

        let mut backlog = VecDeque::new();
        let mut seen = HashSet::new();
        let mut round = Some(source.round());
        let mut rediscover_at = None;
        let mut phase = assembler.phase();

        info!("Looking for peers via {} sources", source.len());
        loop {
            while live.len() < config.max_connections {
                let addr = match backlog.pop_front() {
                    Some(addr) => addr,
                    None => break,
                };
                if live.contains(&addr) || assembler.is_banned(&addr) {
                    continue;
                }

                let (tx, rx) = mpsc::unbounded_channel();
                peers.insert(addr, tx);
                live.insert(addr);
                let session = run_peer(
                    addr,
                    info_hash,
                    peer_id,
                    config.session.clone(),
                    rx,
                    event_tx.clone(),
                );
                sessions.push(session.instrument(info_span!("peer", %addr)).boxed());
            }

            tokio::select! {
                _ = &mut deadline => {
                    let progress = assembler.progress();
                    debug!("Deadline reached: {}", progress);
                    let _ = progress_tx.send(progress.clone());
                    return Err(Error::Timeout {
                        elapsed: started.elapsed(),
                        progress,
                    });
                }
                addr = next_in(&mut round) => match addr {
                    Some(addr) => {
                        if seen.insert(addr) {
                            trace!("Discovered {}", addr);
                            backlog.push_back(addr);
                        }
                    }
                    None => {
                        debug!("Discovery round finished, {} peers seen", seen.len());
                        round = None;
                        rediscover_at = Some(Instant::now() + config.rediscover_interval);
                    }
                },
                _ = wait_until(rediscover_at) => {
                    rediscover_at = None;
                    seen.clear();
                    round = Some(source.round());
                }
                Some(addr) = sessions.next() => {
                    live.remove(&addr);
                    peers.remove(&addr);
                    assembler.remove_peer(addr);
                }
                Some(event) = event_rx.recv() => match event {
                    PeerEvent::Ready { addr, metadata_size } => {
                        admit(&mut assembler, &mut peers, addr, metadata_size);
                    }
                    PeerEvent::Piece { addr, piece, total_size, data } => {
                        assembler.on_piece(addr, piece, total_size, data);
                    }
                    PeerEvent::Rejected { addr, piece } => assembler.on_reject(addr, piece),
                },
                _ = tick.tick() => {
                    let _ = progress_tx.send(assembler.progress());
                }
            }

            for addr in assembler.take_drops() {
                peers.remove(&addr);
            }

            for (addr, piece) in assembler.schedule(std::time::Instant::now()) {
                if let Some(tx) = peers.get(&addr) {
                    let _ = tx.send(piece);
                }
            }

            if assembler.phase() != phase {
                phase = assembler.phase();
                let _ = progress_tx.send(assembler.progress());
            }

            match assembler.status() {
                Status::InProgress => {}
                Status::Complete(info) => {
                    info!("Metadata received in {:?}", started.elapsed());
                    return Ok(Metadata {
                        info_hash,
                        info: info.clone(),
                    });
                }
                Status::Failed(e) => return Err(e.clone().into()),
            }
        }
    }

    /// Fetch the metadata and wrap it into a `.torrent` listing the magnet's
    /// trackers.
    pub async fn torrent(self) -> Result<Torrent> {
        let trackers = self.trackers.clone();
        let created_by = self.config.created_by.clone();
        let metadata = self.run().await?;
        Ok(metadata.into_torrent(trackers, created_by))
    }

    /// Fetch the metadata and write `<name>.torrent` into `dir`. Nothing is
    /// written unless the metadata verified.
    pub async fn save(self, dir: &Path) -> Result<PathBuf> {
        let name = self.name.clone();
        let on_conflict = self.config.on_conflict;
        let torrent = self.torrent().await?;

        if let Ok(summary) = torrent.summary() {
            debug!(
                "{}: {} bytes in {} pieces of {}",
                summary.name.as_deref().unwrap_or("?"),
                summary.length,
                summary.piece_count,
                summary.piece_len
            );
        }

        let bytes = torrent.encode()?;
        output::write_torrent(dir, &name, &bytes, on_conflict)
    }
}

/// Fetch the metadata for `magnet_uri` and build the `.torrent` for it.
pub async fn acquire(magnet_uri: &str, config: Config) -> Result<Torrent> {
    let magnet = MagnetUri::parse_lenient(magnet_uri)?;
    Acquisition::new(&magnet, config).torrent().await
}

/// Hand a peer that finished both handshakes to the assembler. The event may
/// arrive after its session already ended; such a peer is not registered.
fn admit(
    assembler: &mut Assembler,
    peers: &mut HashMap<SocketAddr, UnboundedSender<u32>>,
    addr: SocketAddr,
    metadata_size: Option<usize>,
) -> bool {
    if !peers.contains_key(&addr) {
        trace!("Session of {} ended before it was registered", addr);
        return false;
    }
    if !assembler.add_peer(addr, metadata_size) {
        peers.remove(&addr);
        return false;
    }
    true
}

async fn next_in(round: &mut Option<BoxStream<'static, SocketAddr>>) -> Option<SocketAddr> {
    match round {
        Some(stream) => stream.next().await,
        None => future::pending().await,
    }
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => future::pending().await,
    }
}

async fn run_peer(
    addr: SocketAddr,
    info_hash: InfoHash,
    peer_id: PeerId,
    config: SessionConfig,
    pieces: UnboundedReceiver<u32>,
    events: UnboundedSender<PeerEvent>,
) -> SocketAddr {
    match serve_peer(addr, info_hash, peer_id, &config, pieces, &events).await {
        Ok(()) => trace!("Session closed"),
        Err(e) => debug!("Session ended: {}", e),
    }
    addr
}

async fn serve_peer(
    addr: SocketAddr,
    info_hash: InfoHash,
    peer_id: PeerId,
    config: &SessionConfig,
    pieces: UnboundedReceiver<u32>,
    events: &UnboundedSender<PeerEvent>,
) -> std::result::Result<(), SessionError> {
    let session = client::connect(addr, info_hash, peer_id, config).await?;
    let remote = session.remote();
    debug!(
        "Session ready, client: {:?}, metadata size: {:?}",
        remote.client, remote.metadata_size
    );

    let ready = PeerEvent::Ready {
        addr,
        metadata_size: remote.metadata_size,
    };
    if events.send(ready).is_err() {
        return Ok(());
    }

    let (reader, writer) = session.into_split();
    tokio::select! {
        r = read_loop(addr, reader, events) => r,
        r = write_loop(writer, pieces) => r,
    }
}

async fn read_loop<R>(
    addr: SocketAddr,
    mut reader: SessionReader<R>,
    events: &UnboundedSender<PeerEvent>,
) -> std::result::Result<(), SessionError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let event = match reader.receive_metadata().await? {
            MetadataMsg::Data {
                piece,
                total_size,
                data,
            } => PeerEvent::Piece {
                addr,
                piece,
                total_size,
                data,
            },
            MetadataMsg::Reject(piece) => PeerEvent::Rejected { addr, piece },
            MetadataMsg::Request(piece) => {
                trace!("Ignoring request for piece {}", piece);
                continue;
            }
        };

        if events.send(event).is_err() {
            return Ok(());
        }
    }
}

/// Send requests until the orchestrator drops this peer.
async fn write_loop<W>(
    mut writer: SessionWriter<W>,
    mut pieces: UnboundedReceiver<u32>,
) -> std::result::Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(piece) = pieces.recv().await {
        writer.request_piece(piece).await?;
    }
    Ok(())
}
