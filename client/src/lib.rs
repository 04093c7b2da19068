use std::{net::SocketAddr, time::Duration};

use ben::{Encode, Parser};
use bytes::{Bytes, BytesMut};
use proto::{
    conn::Connection,
    ext::{ExtHandshake, MetadataMsg, HANDSHAKE_ID, LOCAL_UT_METADATA_ID},
    handshake::{Handshake, HANDSHAKE_LEN},
    msg::{Message, MessageError, MAX_FRAME_LEN},
    InfoHash, PeerId,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, trace};

pub use proto;

mod error;

pub use error::SessionError;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    /// Bounds the BitTorrent handshake and the extension handshake together.
    pub handshake_timeout: Duration,
    /// Longest silence tolerated from a connected peer.
    pub idle_timeout: Duration,
    /// Sent as `v` in the extension handshake.
    pub client_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            client_name: concat!("magnet2torrent/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// What we learned about the remote while establishing the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    pub peer_id: PeerId,
    /// Id the remote wants `ut_metadata` messages sent with.
    pub ut_metadata: u8,
    pub metadata_size: Option<usize>,
    pub client: Option<String>,
    pub reqq: Option<u32>,
}

/// Open a TCP connection to `addr` and establish a metadata-capable session.
pub async fn connect(
    addr: SocketAddr,
    info_hash: InfoHash,
    peer_id: PeerId,
    config: &SessionConfig,
) -> Result<Session<TcpStream>, SessionError> {
    trace!("Connecting");
    let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| SessionError::PeerTimeout("connect"))?
        .map_err(SessionError::Connect)?;

    Session::establish(stream, info_hash, peer_id, config).await
}

/// A peer connection that completed both the BitTorrent handshake and the
/// extension handshake, and whose remote speaks `ut_metadata`.
pub struct Session<S> {
    reader: SessionReader<ReadHalf<S>>,
    writer: SessionWriter<WriteHalf<S>>,
    remote: RemoteInfo,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub async fn establish(
        stream: S,
        info_hash: InfoHash,
        peer_id: PeerId,
        config: &SessionConfig,
    ) -> Result<Self, SessionError> {
        let (r, w) = tokio::io::split(stream);
        let mut reader = SessionReader::new(r, config.idle_timeout);
        let mut writer = SessionWriter::new(w, config.idle_timeout);

        let remote = timeout(
            config.handshake_timeout,
            handshake(&mut reader, &mut writer, info_hash, peer_id, &config.client_name),
        )
        .await
        .map_err(|_| SessionError::PeerTimeout("handshake"))??;

        writer.ut_metadata = remote.ut_metadata;
        Ok(Session {
            reader,
            writer,
            remote,
        })
    }

    pub fn remote(&self) -> &RemoteInfo {
        &self.remote
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), SessionError> {
        self.writer.send(msg).await
    }

    pub async fn receive(&mut self) -> Result<Message, SessionError> {
        self.reader.receive().await
    }

    /// Split into halves that can be driven independently, so a pending read
    /// is never cancelled by a write.
    pub fn into_split(self) -> (SessionReader<ReadHalf<S>>, SessionWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }
}

async fn handshake<R, W>(
    reader: &mut SessionReader<R>,
    writer: &mut SessionWriter<W>,
    info_hash: InfoHash,
    peer_id: PeerId,
    client_name: &str,
) -> Result<RemoteInfo, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut ours = Handshake::new(info_hash, peer_id);
    ours.set_extended(true);
    writer.stream.write_all(&ours.to_bytes()).await?;
    writer.stream.flush().await?;

    let mut buf = [0; HANDSHAKE_LEN];
    reader.stream.read_exact(&mut buf).await?;
    let theirs = ours.read(&buf)?;

    if !theirs.is_extended() {
        return Err(SessionError::UnsupportedPeer("the extension protocol"));
    }

    let ext = ExtHandshake::local(client_name).encode_to_vec();
    writer.conn.send_extended(HANDSHAKE_ID, &ext);
    writer.flush().await?;

    let remote_ext = loop {
        match reader.receive().await? {
            Message::Extended {
                id: HANDSHAKE_ID,
                payload,
            } => break ExtHandshake::parse(&payload, &mut reader.parser)?,
            msg => trace!("Skipping {:?} before extension handshake", msg),
        }
    };

    let ut_metadata = remote_ext
        .ut_metadata()
        .ok_or(SessionError::UnsupportedPeer("ut_metadata"))?;

    debug!(
        "Extension handshake done; client: {:?}, metadata_size: {:?}",
        remote_ext.client, remote_ext.metadata_size
    );

    Ok(RemoteInfo {
        peer_id: theirs.peer_id,
        ut_metadata,
        metadata_size: remote_ext.metadata_size,
        client: remote_ext.client,
        reqq: remote_ext.reqq,
    })
}

pub struct SessionReader<R> {
    stream: R,
    buf: BytesMut,
    parser: Parser,
    idle_timeout: Duration,
}

impl<R> SessionReader<R>
where
    R: AsyncRead + Unpin,
{
    fn new(stream: R, idle_timeout: Duration) -> Self {
        let mut parser = Parser::new();
        // Peers are not always canonical about key order
        parser.sorted_keys(false);
        Self {
            stream,
            buf: BytesMut::with_capacity(1024),
            parser,
            idle_timeout,
        }
    }

    pub async fn receive(&mut self) -> Result<Message, SessionError> {
        let frame = timeout(self.idle_timeout, read_frame(&mut self.stream, &mut self.buf))
            .await
            .map_err(|_| SessionError::PeerTimeout("read"))??;

        Ok(Message::parse(frame)?)
    }

    /// Wait for the next `ut_metadata` message, skipping everything else.
    pub async fn receive_metadata(&mut self) -> Result<MetadataMsg, SessionError> {
        loop {
            match self.receive().await? {
                Message::Extended {
                    id: LOCAL_UT_METADATA_ID,
                    payload,
                } => return Ok(MetadataMsg::parse(payload, &mut self.parser)?),
                Message::KeepAlive => trace!("Keep-alive"),
                msg => trace!("Ignoring {:?}", msg),
            }
        }
    }
}

async fn read_frame<R>(stream: &mut R, buf: &mut BytesMut) -> Result<Bytes, SessionError>
where
    R: AsyncRead + Unpin,
{
    let len = stream.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(MessageError::TooLarge(len).into());
    }

    buf.clear();
    buf.resize(len, 0);
    stream.read_exact(&mut buf[..]).await?;
    Ok(buf.split_to(len).freeze())
}

pub struct SessionWriter<W> {
    stream: W,
    conn: Connection,
    ut_metadata: u8,
    idle_timeout: Duration,
}

impl<W> SessionWriter<W>
where
    W: AsyncWrite + Unpin,
{
    fn new(stream: W, idle_timeout: Duration) -> Self {
        Self {
            stream,
            conn: Connection::new(),
            ut_metadata: 0,
            idle_timeout,
        }
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), SessionError> {
        self.conn.send(msg);
        self.flush().await
    }

    /// Send a `ut_metadata` message under the id the remote asked for.
    pub async fn send_metadata(&mut self, msg: &MetadataMsg) -> Result<(), SessionError> {
        self.conn.send_extended(self.ut_metadata, &msg.encode_to_vec());
        self.flush().await
    }

    pub async fn request_piece(&mut self, piece: u32) -> Result<(), SessionError> {
        trace!("Requesting metadata piece {}", piece);
        self.send_metadata(&MetadataMsg::Request(piece)).await
    }

    async fn flush(&mut self) -> Result<(), SessionError> {
        let idle = self.idle_timeout;
        let send_buf = self.conn.get_send_buf();
        let stream = &mut self.stream;
        let write = async move {
            if !send_buf.is_empty() {
                stream.write_all(&send_buf).await?;
            }
            stream.flush().await
        };

        timeout(idle, write)
            .await
            .map_err(|_| SessionError::PeerTimeout("write"))??;
        Ok(())
    }
}
