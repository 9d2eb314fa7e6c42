// Node module - WIRING
// Builds the ledger, pool, wallet, peer registry and miner for one process

mod config;

pub use config::{parse_seed_list, ConfigError, NodeConfig, DEFAULT_P2P_PORT};

use crate::ledger::{Block, Blockchain};
use crate::miner::{MineError, Miner, SystemReward};
use crate::sync::{Broadcaster, PeerRegistry};
use crate::transport::TransportError;
use crate::wallet::{MemPool, PublicKey, Transaction, Wallet, WalletError};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Mine(#[from] MineError),
}

/// One running participant in the network
pub struct Node {
    config: NodeConfig,
    ledger: Arc<Blockchain>,
    pool: Arc<MemPool>,
    registry: PeerRegistry,
    miner: Miner,
}

impl Node {
    /// Build a node with a freshly generated wallet
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        Self::with_wallet(config, Wallet::generate())
    }

    pub fn with_wallet(config: NodeConfig, wallet: Wallet) -> Result<Self, NodeError> {
        config.validate()?;

        let ledger = Arc::new(Blockchain::new());
        let pool = Arc::new(MemPool::new());
        let registry = PeerRegistry::new(ledger.clone(), pool.clone(), config.transport.clone());
        let miner = Miner::new(
            ledger.clone(),
            pool.clone(),
            Arc::new(registry.clone()),
            Arc::new(SystemReward::new()),
            wallet,
        );

        Ok(Self {
            config,
            ledger,
            pool,
            registry,
            miner,
        })
    }

    /// Start listening and dial the configured seeds
    pub async fn start(&self) -> Result<SocketAddr, NodeError> {
        let address = self
            .registry
            .start(self.config.listen_address, &self.config.seed_peers)
            .await?;
        info!(
            addr = %address,
            seeds = self.config.seed_peers.len(),
            wallet = %self.wallet().public_key(),
            "node started"
        );
        Ok(address)
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }

    /// Run one mining cycle
    pub async fn mine(&self) -> Result<Block, NodeError> {
        Ok(self.miner.mine().await?)
    }

    /// Pay `amount` from this node's wallet and gossip the transaction.
    ///
    /// Returns the stored transaction and the number of peers it was sent to.
    pub async fn submit_transaction(
        &self,
        recipient: PublicKey,
        amount: u64,
    ) -> Result<(Transaction, usize), NodeError> {
        let tx = self.wallet().create_transaction(recipient, amount, &self.pool)?;
        let peers = self.registry.broadcast_transaction(&tx).await;
        info!(tx = %tx.id(), amount, peers, "transaction submitted");
        Ok((tx, peers))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Blockchain> {
        &self.ledger
    }

    pub fn pool(&self) -> &Arc<MemPool> {
        &self.pool
    }

    pub fn wallet(&self) -> &Wallet {
        self.miner.wallet()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }
}
