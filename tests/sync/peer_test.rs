// Peer Tests
// Tests for the live peer registry over loopback TCP

use chainmesh::ledger::{Blockchain, Ledger};
use chainmesh::sync::{Broadcaster, Message, PeerRegistry};
use chainmesh::transport::{Direction, TransportConfig};
use chainmesh::wallet::{MemPool, Transaction, Wallet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

struct Node {
    ledger: Arc<Blockchain>,
    pool: Arc<MemPool>,
    registry: PeerRegistry,
    address: SocketAddr,
}

async fn start_node(config: TransportConfig, seeds: &[String]) -> Node {
    let ledger = Arc::new(Blockchain::new());
    let pool = Arc::new(MemPool::new());
    let registry = PeerRegistry::new(ledger.clone(), pool.clone(), config);
    let address = registry
        .start("127.0.0.1:0".parse().unwrap(), seeds)
        .await
        .unwrap();
    Node {
        ledger,
        pool,
        registry,
        address,
    }
}

/// A raw socket speaking the line protocol, standing in for a remote node
struct RawPeer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl RawPeer {
    async fn connect(address: SocketAddr) -> Self {
        let (read, writer) = TcpStream::connect(address).await.unwrap().into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    /// Next frame, or None once the node closed the link
    async fn recv(&mut self) -> Option<Message> {
        let line = timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for a frame")
            .ok()??;
        Some(Message::decode(&line).unwrap().expect("known message type"))
    }

    async fn send_raw(&mut self, frame: &str) {
        self.send_bytes(frame.as_bytes()).await;
    }

    async fn send_bytes(&mut self, frame: &[u8]) {
        self.writer.write_all(frame).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }
}

async fn wait_for_peers(registry: &PeerRegistry, expected: usize) {
    for _ in 0..500 {
        if registry.peer_count().await == expected {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} peers, registry has {}",
        expected,
        registry.peer_count().await
    );
}

fn mine_locally(ledger: &Blockchain, blocks: usize) {
    let miner = Wallet::generate().public_key();
    for _ in 0..blocks {
        ledger
            .commit(vec![Transaction::reward(&miner, &Wallet::blockchain_wallet(), 50)])
            .unwrap();
    }
}

// ============================================================================
// JOINING
// ============================================================================

#[tokio::test]
async fn test_join_chain_is_first_frame() {
    let node = start_node(TransportConfig::default(), &[]).await;
    mine_locally(&node.ledger, 2);

    let mut peer = RawPeer::connect(node.address).await;

    assert_eq!(
        peer.recv().await,
        Some(Message::Chain {
            chain: node.ledger.units()
        })
    );
    wait_for_peers(&node.registry, 1).await;

    let peers = node.registry.peers().await;
    assert_eq!(peers[0].direction, Direction::Inbound);
    node.registry.shutdown().await;
}

#[tokio::test]
async fn test_outbound_connect_sends_join_chain_both_ways() {
    let a = start_node(TransportConfig::default(), &[]).await;
    let b = start_node(TransportConfig::default(), &[]).await;
    mine_locally(&a.ledger, 3);

    b.registry.connect(&a.address.to_string()).await.unwrap();
    wait_for_peers(&a.registry, 1).await;

    // A's join chain is longer, so B adopts it
    for _ in 0..500 {
        if b.ledger.height() == 4 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(b.ledger.units(), a.ledger.units());
    assert_eq!(b.registry.peers().await[0].direction, Direction::Outbound);

    a.registry.shutdown().await;
    b.registry.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_seed_does_not_block_others() {
    let reachable = start_node(TransportConfig::default(), &[]).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let seeds = vec![
        format!("ws://{}", dead),
        "not-an-address".to_string(),
        reachable.address.to_string(),
    ];
    let node = start_node(TransportConfig::default(), &seeds).await;

    wait_for_peers(&node.registry, 1).await;
    wait_for_peers(&reachable.registry, 1).await;

    node.registry.shutdown().await;
    reachable.registry.shutdown().await;
}

#[tokio::test]
async fn test_max_connections_rejects_extra_peer() {
    let node = start_node(TransportConfig::new().with_max_connections(1), &[]).await;

    let mut first = RawPeer::connect(node.address).await;
    assert!(matches!(first.recv().await, Some(Message::Chain { .. })));
    wait_for_peers(&node.registry, 1).await;

    let mut second = RawPeer::connect(node.address).await;
    assert_eq!(second.recv().await, None);
    assert_eq!(node.registry.peer_count().await, 1);

    node.registry.shutdown().await;
}

// ============================================================================
// BROADCAST
// ============================================================================

#[tokio::test]
async fn test_broadcast_reaches_every_peer() {
    let node = start_node(TransportConfig::default(), &[]).await;

    let mut peers = Vec::new();
    for _ in 0..3 {
        let mut peer = RawPeer::connect(node.address).await;
        peer.recv().await;
        peers.push(peer);
    }
    wait_for_peers(&node.registry, 3).await;

    assert_eq!(node.registry.broadcast_clear_transactions().await, 3);
    for peer in &mut peers {
        assert_eq!(peer.recv().await, Some(Message::ClearTransactions));
    }

    node.registry.shutdown().await;
}

#[tokio::test]
async fn test_broadcast_skips_closed_peer() {
    let node = start_node(TransportConfig::default(), &[]).await;

    let mut alive = Vec::new();
    for _ in 0..2 {
        let mut peer = RawPeer::connect(node.address).await;
        peer.recv().await;
        alive.push(peer);
    }
    let mut gone = RawPeer::connect(node.address).await;
    gone.recv().await;
    wait_for_peers(&node.registry, 3).await;

    drop(gone);
    wait_for_peers(&node.registry, 2).await;

    let sender = Wallet::generate();
    let tx = Transaction::new(&sender, Wallet::generate().public_key(), 5).unwrap();
    assert_eq!(node.registry.broadcast_transaction(&tx).await, 2);

    for peer in &mut alive {
        assert_eq!(
            peer.recv().await,
            Some(Message::Transaction {
                transaction: tx.clone()
            })
        );
    }

    node.registry.shutdown().await;
}

#[tokio::test]
async fn test_broadcast_chain_sends_current_chain() {
    let node = start_node(TransportConfig::default(), &[]).await;
    let mut peer = RawPeer::connect(node.address).await;
    peer.recv().await;
    wait_for_peers(&node.registry, 1).await;

    mine_locally(&node.ledger, 1);
    assert_eq!(node.registry.broadcast_chain().await, 1);

    match peer.recv().await {
        Some(Message::Chain { chain }) => assert_eq!(chain.len(), 2),
        other => panic!("expected chain, got {:?}", other),
    }

    node.registry.shutdown().await;
}

// ============================================================================
// INBOUND FRAMES AND EVICTION
// ============================================================================

#[tokio::test]
async fn test_unknown_and_garbage_frames_keep_connection() {
    let node = start_node(TransportConfig::default(), &[]).await;
    let mut peer = RawPeer::connect(node.address).await;
    peer.recv().await;
    wait_for_peers(&node.registry, 1).await;

    let tx = Transaction::new(&Wallet::generate(), Wallet::generate().public_key(), 7).unwrap();
    peer.send_raw(r#"{"type":"PING"}"#).await;
    peer.send_raw("this is not json").await;
    peer.send_raw(&Message::Transaction { transaction: tx.clone() }.encode().unwrap())
        .await;

    for _ in 0..500 {
        if !node.pool.is_empty() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(node.pool.get(tx.id()), Some(tx));
    assert_eq!(node.registry.peer_count().await, 1);

    let stats = node.registry.gossip_stats();
    assert_eq!(stats.unknown_ignored, 1);
    assert_eq!(stats.decode_failures, 1);
    assert_eq!(stats.transactions_stored, 1);

    node.registry.shutdown().await;
}

#[tokio::test]
async fn test_oversized_and_non_utf8_frames_keep_connection() {
    let node = start_node(TransportConfig::new().with_max_frame_bytes(2048), &[]).await;
    let mut peer = RawPeer::connect(node.address).await;
    peer.recv().await;
    wait_for_peers(&node.registry, 1).await;

    let tx = Transaction::new(&Wallet::generate(), Wallet::generate().public_key(), 9).unwrap();
    let frame = Message::Transaction { transaction: tx.clone() }.encode().unwrap();
    assert!(frame.len() < 2048);

    // a chain that no longer fits the frame limit
    let oversized = format!(r#"{{"type":"CHAIN","chain":["{}"]}}"#, "x".repeat(4096));
    peer.send_raw(&oversized).await;
    let mut mangled = frame.clone().into_bytes();
    mangled[10] = 0xFF;
    peer.send_bytes(&mangled).await;
    peer.send_raw(&frame).await;

    for _ in 0..500 {
        if !node.pool.is_empty() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(node.pool.transactions(), vec![tx]);
    assert_eq!(node.ledger.height(), 1);
    assert_eq!(node.registry.peer_count().await, 1);

    node.registry.shutdown().await;
}

#[tokio::test]
async fn test_evict_closes_link() {
    let node = start_node(TransportConfig::default(), &[]).await;
    let mut peer = RawPeer::connect(node.address).await;
    peer.recv().await;
    wait_for_peers(&node.registry, 1).await;

    let id = node.registry.peers().await[0].id;
    assert!(node.registry.evict(&id).await);
    assert!(!node.registry.has_peer(&id).await);
    assert!(!node.registry.evict(&id).await);

    assert_eq!(peer.recv().await, None);
    assert_eq!(node.registry.broadcast_clear_transactions().await, 0);

    node.registry.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_drops_everyone() {
    let node = start_node(TransportConfig::default(), &[]).await;
    let mut peer = RawPeer::connect(node.address).await;
    peer.recv().await;
    wait_for_peers(&node.registry, 1).await;

    node.registry.shutdown().await;

    assert_eq!(node.registry.peer_count().await, 0);
    assert_eq!(node.registry.local_address().await, None);
    assert_eq!(peer.recv().await, None);
}
