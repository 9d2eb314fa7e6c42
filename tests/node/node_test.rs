// Node Tests
// Tests for wiring a full node and for two nodes converging over TCP

use chainmesh::ledger::Ledger;
use chainmesh::node::{ConfigError, Node, NodeConfig, NodeError};
use chainmesh::transport::TransportConfig;
use chainmesh::wallet::{Wallet, WalletError, INITIAL_BALANCE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::sleep;

fn local_config() -> NodeConfig {
    NodeConfig::new().with_listen_address("127.0.0.1:0".parse().unwrap())
}

async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn wait_for_peers(node: &Node, expected: usize) {
    for _ in 0..500 {
        if node.registry().peer_count().await == expected {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("node never reached {} peers", expected);
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[test]
fn test_default_config() {
    let config = NodeConfig::default();

    assert_eq!(config.listen_address.port(), 5001);
    assert!(config.seed_peers.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_config_rejected() {
    let bad_seed = local_config().with_seed_peers(vec!["nowhere".to_string()]);
    assert!(matches!(
        Node::new(bad_seed),
        Err(NodeError::Config(ConfigError::InvalidSeed(_)))
    ));

    let bad_transport = local_config().with_transport(TransportConfig::new().with_max_connections(0));
    assert!(matches!(
        Node::new(bad_transport),
        Err(NodeError::Config(ConfigError::Transport(_)))
    ));
}

// ============================================================================
// SINGLE NODE
// ============================================================================

#[tokio::test]
async fn test_fresh_node_state() {
    let node = Node::new(local_config()).unwrap();
    let address = node.start().await.unwrap();

    assert_ne!(address.port(), 0);
    assert_eq!(node.registry().local_address().await, Some(address));
    assert_eq!(node.ledger().height(), 1);
    assert!(node.pool().is_empty());
    assert_eq!(node.wallet().balance(), INITIAL_BALANCE);

    node.shutdown().await;
}

#[tokio::test]
async fn test_start_on_taken_port_fails() {
    let first = Node::new(local_config()).unwrap();
    let address = first.start().await.unwrap();

    let second = Node::new(NodeConfig::new().with_listen_address(address)).unwrap();
    assert!(matches!(second.start().await, Err(NodeError::Transport(_))));

    first.shutdown().await;
}

#[tokio::test]
async fn test_submit_over_balance() {
    let node = Node::with_wallet(local_config(), Wallet::generate().with_balance(5)).unwrap();

    let result = node.submit_transaction(Wallet::generate().public_key(), 6).await;

    assert!(matches!(
        result,
        Err(NodeError::Wallet(WalletError::InsufficientBalance { .. }))
    ));
    assert!(node.pool().is_empty());
}

#[tokio::test]
async fn test_mine_without_peers() {
    let node = Node::new(local_config()).unwrap();

    let block = node.mine().await.unwrap();

    assert_eq!(node.ledger().height(), 2);
    assert_eq!(node.ledger().last_block(), block);
}

// ============================================================================
// TWO NODES
// ============================================================================

async fn pair() -> (Node, Node) {
    let a = Node::new(local_config()).unwrap();
    let a_addr: SocketAddr = a.start().await.unwrap();

    let b = Node::new(local_config().with_seed_peers(vec![format!("ws://{}", a_addr)])).unwrap();
    b.start().await.unwrap();

    wait_for_peers(&a, 1).await;
    wait_for_peers(&b, 1).await;
    (a, b)
}

#[tokio::test]
async fn test_transaction_reaches_peer_pool() {
    let (a, b) = pair().await;

    let (tx, peers) = a
        .submit_transaction(Wallet::generate().public_key(), 40)
        .await
        .unwrap();
    assert_eq!(peers, 1);

    assert!(eventually(|| b.pool().get(tx.id()).is_some()).await);
    assert_eq!(b.pool().get(tx.id()), Some(tx));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_mined_block_converges_and_clears_pools() {
    let (a, b) = pair().await;

    let (tx, _) = b
        .submit_transaction(Wallet::generate().public_key(), 15)
        .await
        .unwrap();
    assert!(eventually(|| a.pool().len() == 1).await);

    let block = a.mine().await.unwrap();
    assert_eq!(block.data()[0], tx);

    assert!(eventually(|| b.ledger().height() == 2).await);
    assert_eq!(b.ledger().units(), a.ledger().units());
    assert!(eventually(|| b.pool().is_empty()).await);
    assert!(a.pool().is_empty());

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_late_joiner_catches_up() {
    let a = Node::new(local_config()).unwrap();
    let a_addr = a.start().await.unwrap();
    for _ in 0..3 {
        a.mine().await.unwrap();
    }

    let b = Node::new(local_config().with_seed_peers(vec![a_addr.to_string()])).unwrap();
    b.start().await.unwrap();

    assert!(eventually(|| b.ledger().height() == 4).await);
    assert_eq!(b.ledger().units(), a.ledger().units());

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_peer_loss_is_tolerated() {
    let (a, b) = pair().await;

    b.shutdown().await;
    wait_for_peers(&a, 0).await;

    a.mine().await.unwrap();
    assert_eq!(a.ledger().height(), 2);

    a.shutdown().await;
}
