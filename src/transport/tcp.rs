// TCP Peer Connection
// One bidirectional link to a remote node carrying newline-delimited frames

use crate::sync::Message;
use crate::transport::{ConnectionId, ConnectionState, Direction, TransportConfig, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// A single encoded frame, shared between every peer queue it is sent to
pub type Frame = Arc<str>;

// ============================================================================
// PEER CONNECTION
// ============================================================================

/// Sending side of a live peer link
///
/// Cloning is cheap; every clone feeds the same writer task. The link stays
/// open until the writer task fails or the last clone is dropped.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    id: ConnectionId,
    address: SocketAddr,
    direction: Direction,
    outbound: mpsc::Sender<Frame>,
}

impl PeerConnection {
    /// Take ownership of a connected stream.
    ///
    /// Spawns the writer task and hands back the read half so the caller
    /// decides who consumes inbound frames.
    pub fn open(
        stream: TcpStream,
        direction: Direction,
        config: &TransportConfig,
    ) -> Result<(Self, FrameReader<OwnedReadHalf>), TransportError> {
        let address = stream.peer_addr()?;
        stream.set_nodelay(config.nodelay).ok();

        let (reader, writer) = stream.into_split();
        let (outbound, queue) = mpsc::channel::<Frame>(config.send_queue_capacity);
        let id = ConnectionId::generate();

        tokio::spawn(write_loop(id, writer, queue));

        let connection = Self {
            id,
            address,
            direction,
            outbound,
        };
        Ok((connection, FrameReader::new(reader, config.max_frame_bytes)))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> ConnectionState {
        if self.outbound.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Encode and queue one message
    pub fn send(&self, message: &Message) -> Result<(), TransportError> {
        let frame = message
            .encode()
            .map_err(|e| TransportError::SerializationError(e.to_string()))?;
        self.send_frame(Frame::from(frame))
    }

    /// Queue an already encoded frame without waiting.
    ///
    /// A full queue means the peer is not keeping up; the frame is dropped
    /// for this peer only.
    pub fn send_frame(&self, frame: Frame) -> Result<(), TransportError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::SendFailed("send queue full".to_string()),
            TrySendError::Closed(_) => TransportError::NotConnected,
        })
    }
}

async fn write_loop(id: ConnectionId, mut writer: OwnedWriteHalf, mut queue: mpsc::Receiver<Frame>) {
    while let Some(frame) = queue.recv().await {
        let mut bytes = Vec::with_capacity(frame.len() + 1);
        bytes.extend_from_slice(frame.as_bytes());
        bytes.push(b'\n');

        if let Err(e) = writer.write_all(&bytes).await {
            debug!(peer = %id, error = %e, "write failed, closing link");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

// ============================================================================
// FRAME READER
// ============================================================================

/// Splits an inbound byte stream into newline-delimited frames
pub struct FrameReader<R> {
    inner: BufReader<R>,
    max_frame_bytes: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_frame_bytes,
            buf: Vec::new(),
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream. An oversized
    /// frame is skipped up to its terminating newline and reported as
    /// `PayloadTooLarge`, and a frame that is not UTF-8 as `InvalidEncoding`;
    /// the reader can keep being used after either.
    pub async fn next_frame(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            self.buf.clear();
            let limit = self.max_frame_bytes as u64 + 1;
            let read = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if read == 0 {
                return Ok(None);
            }

            let terminated = self.buf.last() == Some(&b'\n');
            if terminated {
                self.buf.pop();
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
            } else if self.buf.len() > self.max_frame_bytes {
                let skipped = self.discard_line().await?;
                return Err(TransportError::PayloadTooLarge {
                    size: self.buf.len() + skipped,
                    limit: self.max_frame_bytes,
                });
            }

            if self.buf.iter().all(u8::is_ascii_whitespace) {
                if terminated {
                    continue;
                }
                return Ok(None);
            }

            return std::str::from_utf8(&self.buf)
                .map(|frame| Some(frame.to_owned()))
                .map_err(|e| TransportError::InvalidEncoding(e.to_string()));
        }
    }

    async fn discard_line(&mut self) -> Result<usize, TransportError> {
        let mut skipped = 0;
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(skipped);
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.inner.consume(pos + 1);
                    return Ok(skipped + pos);
                }
                None => {
                    let len = available.len();
                    self.inner.consume(len);
                    skipped += len;
                }
            }
        }
    }
}

// ============================================================================
// DIALING
// ============================================================================

/// Strip an optional `ws://` / `tcp://` scheme and trailing slash from a seed
pub fn normalize_address(address: &str) -> Result<String, TransportError> {
    let trimmed = address.trim();
    let without_scheme = ["ws://", "tcp://"]
        .iter()
        .find_map(|scheme| trimmed.strip_prefix(scheme))
        .unwrap_or(trimmed);
    let host_port = without_scheme.trim_end_matches('/');

    match host_port.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(host_port.to_string())
        }
        _ => Err(TransportError::InvalidAddress(address.to_string())),
    }
}

/// Open an outbound TCP connection
pub async fn dial(address: &str, config: &TransportConfig) -> Result<TcpStream, TransportError> {
    let target = normalize_address(address)?;
    let connect = TcpStream::connect(target);

    match config.connect_timeout_secs {
        Some(secs) => timeout(Duration::from_secs(secs as u64), connect)
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string())),
        None => connect
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string())),
    }
}
