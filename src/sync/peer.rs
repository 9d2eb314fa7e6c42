// Peer Registry - the set of live peer connections
//
// Accepted and dialed connections converge on one registration path:
// the new peer is sent our full chain, then joins the live set, then a
// reader task feeds its frames to the gossip handler until the link dies
// and the entry is evicted. Broadcasts send to a snapshot of the set.

use crate::ledger::Ledger;
use crate::sync::gossip::{GossipHandler, GossipStats};
use crate::sync::protocol::Message;
use crate::transport::{
    dial, ConnectionId, Direction, Frame, FrameReader, PeerConnection, TransportConfig,
    TransportError,
};
use crate::wallet::{Transaction, TransactionPool};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

// ============================================================================
// BROADCASTER
// ============================================================================

/// Fan-out of ledger updates to every connected peer.
///
/// Each call returns how many peers the message was queued to.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast_chain(&self) -> usize;

    async fn broadcast_transaction(&self, transaction: &Transaction) -> usize;

    async fn broadcast_clear_transactions(&self) -> usize;
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Read-only view of one live peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerSummary {
    pub id: ConnectionId,
    pub address: SocketAddr,
    pub direction: Direction,
}

struct PeerEntry {
    connection: PeerConnection,
    reader: JoinHandle<()>,
}

struct Listening {
    address: SocketAddr,
    task: JoinHandle<()>,
}

struct RegistryInner {
    config: TransportConfig,
    ledger: Arc<dyn Ledger>,
    gossip: GossipHandler,
    peers: RwLock<HashMap<ConnectionId, PeerEntry>>,
    listener: Mutex<Option<Listening>>,
}

/// Owner of every live peer connection. Cheap to clone.
#[derive(Clone)]
pub struct PeerRegistry {
    inner: Arc<RegistryInner>,
}

impl PeerRegistry {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        pool: Arc<dyn TransactionPool>,
        config: TransportConfig,
    ) -> Self {
        let gossip = GossipHandler::new(ledger.clone(), pool);
        Self {
            inner: Arc::new(RegistryInner {
                config,
                ledger,
                gossip,
                peers: RwLock::new(HashMap::new()),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Start accepting peers on `listen_address` and dial every seed.
    ///
    /// Returns the bound address (useful with port 0). Seeds are dialed in
    /// the background, independently of each other; an unreachable seed
    /// only produces a warning.
    pub async fn start(
        &self,
        listen_address: SocketAddr,
        seed_peers: &[String],
    ) -> Result<SocketAddr, TransportError> {
        let mut listening = self.inner.listener.lock().await;
        if listening.is_some() {
            return Err(TransportError::AlreadyRunning);
        }

        let listener = TcpListener::bind(listen_address)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let address = listener.local_addr()?;

        let task = tokio::spawn(self.clone().accept_loop(listener));
        *listening = Some(Listening { address, task });
        drop(listening);

        info!(addr = %address, "listening for peer-to-peer connections");

        for seed in seed_peers {
            self.spawn_connect(seed.clone());
        }

        Ok(address)
    }

    /// Stop accepting and drop every connection
    pub async fn shutdown(&self) {
        if let Some(listening) = self.inner.listener.lock().await.take() {
            listening.task.abort();
        }

        let drained: Vec<PeerEntry> = self.inner.peers.write().await.drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.reader.abort();
        }
        info!(peers = drained.len(), "peer registry shut down");
    }

    /// Address we are listening on, once started
    pub async fn local_address(&self) -> Option<SocketAddr> {
        self.inner.listener.lock().await.as_ref().map(|l| l.address)
    }

    /// Dial one peer and register it
    pub async fn connect(&self, address: &str) -> Result<ConnectionId, TransportError> {
        let stream = dial(address, &self.inner.config).await?;
        self.register(stream, Direction::Outbound).await
    }

    fn spawn_connect(&self, address: String) {
        let registry = self.clone();
        tokio::spawn(async move {
            match registry.connect(&address).await {
                Ok(id) => debug!(peer = %id, seed = %address, "seed peer connected"),
                Err(e) => warn!(seed = %address, error = %e, "could not connect to seed peer"),
            }
        });
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    if let Err(e) = self.register(stream, Direction::Inbound).await {
                        warn!(addr = %addr, error = %e, "rejected inbound peer");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Common path for accepted and dialed connections.
    ///
    /// The join chain is queued while the live-set lock is held and before
    /// the peer becomes visible to broadcasts, so it is always the first
    /// frame the peer receives and it is never older than a chain broadcast
    /// the peer misses.
    async fn register(
        &self,
        stream: TcpStream,
        direction: Direction,
    ) -> Result<ConnectionId, TransportError> {
        let (connection, reader) = PeerConnection::open(stream, direction, &self.inner.config)?;
        let id = connection.id();

        {
            let mut peers = self.inner.peers.write().await;
            if peers.len() >= self.inner.config.max_connections as usize {
                return Err(TransportError::MaxConnectionsReached);
            }

            let chain = Message::Chain {
                chain: self.inner.ledger.units(),
            };
            connection.send(&chain)?;

            let reader = tokio::spawn(self.clone().read_loop(id, reader));
            peers.insert(
                id,
                PeerEntry {
                    connection: connection.clone(),
                    reader,
                },
            );
        }

        info!(peer = %id, addr = %connection.address(), %direction, "peer connected");
        Ok(id)
    }

    async fn read_loop(self, id: ConnectionId, mut reader: FrameReader<OwnedReadHalf>) {
        let reason = loop {
            match reader.next_frame().await {
                Ok(Some(frame)) => match self.inner.gossip.handle_frame(&frame) {
                    Ok(outcome) => debug!(peer = %id, ?outcome, "handled peer message"),
                    Err(e) => warn!(peer = %id, error = %e, "dropping undecodable frame"),
                },
                Ok(None) => break "closed by peer".to_string(),
                Err(TransportError::PayloadTooLarge { size, limit }) => {
                    // a full chain above the limit never arrives; the peers stop converging
                    warn!(peer = %id, size, limit, "dropping oversized frame");
                }
                Err(e) if e.is_recoverable() => {
                    warn!(peer = %id, error = %e, "dropping frame");
                }
                Err(e) => break e.to_string(),
            }
        };

        if self.remove(&id).await.is_some() {
            info!(peer = %id, reason = %reason, "peer disconnected");
        }
    }

    async fn remove(&self, id: &ConnectionId) -> Option<PeerEntry> {
        self.inner.peers.write().await.remove(id)
    }

    /// Drop a connection from the live set, closing it
    pub async fn evict(&self, id: &ConnectionId) -> bool {
        match self.remove(id).await {
            Some(entry) => {
                entry.reader.abort();
                info!(peer = %id, "peer evicted");
                true
            }
            None => false,
        }
    }

    pub async fn peer_count(&self) -> usize {
        self.inner.peers.read().await.len()
    }

    pub async fn has_peer(&self, id: &ConnectionId) -> bool {
        self.inner.peers.read().await.contains_key(id)
    }

    pub async fn peers(&self) -> Vec<PeerSummary> {
        self.inner
            .peers
            .read()
            .await
            .values()
            .map(|e| PeerSummary {
                id: e.connection.id(),
                address: e.connection.address(),
                direction: e.connection.direction(),
            })
            .collect()
    }

    pub fn gossip_stats(&self) -> GossipStats {
        self.inner.gossip.stats()
    }

    async fn snapshot(&self) -> Vec<PeerConnection> {
        self.inner
            .peers
            .read()
            .await
            .values()
            .map(|e| e.connection.clone())
            .collect()
    }

    /// Queue `message` to every live peer.
    ///
    /// The frame is encoded once. Peers whose link is already closed are
    /// evicted; a full queue only skips that peer.
    pub async fn broadcast(&self, message: &Message) -> usize {
        let frame = match message.encode() {
            Ok(frame) => Frame::from(frame),
            Err(e) => {
                warn!(kind = %message.message_type(), error = %e, "could not encode broadcast");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for peer in self.snapshot().await {
            match peer.send_frame(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TransportError::NotConnected) => dead.push(peer.id()),
                Err(e) => warn!(peer = %peer.id(), kind = %message.message_type(), error = %e, "send failed"),
            }
        }

        for id in dead {
            self.evict(&id).await;
        }

        debug!(kind = %message.message_type(), peers = delivered, "broadcast");
        delivered
    }
}

#[async_trait]
impl Broadcaster for PeerRegistry {
    async fn broadcast_chain(&self) -> usize {
        let message = Message::Chain {
            chain: self.inner.ledger.units(),
        };
        self.broadcast(&message).await
    }

    async fn broadcast_transaction(&self, transaction: &Transaction) -> usize {
        let message = Message::Transaction {
            transaction: transaction.clone(),
        };
        self.broadcast(&message).await
    }

    async fn broadcast_clear_transactions(&self) -> usize {
        self.broadcast(&Message::ClearTransactions).await
    }
}
