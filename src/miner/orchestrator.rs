// Miner - one end-to-end mining cycle
//
// Order matters: the block is committed locally before anything is
// broadcast, and the pool is cleared only after the chain broadcast has
// been issued. A commit failure stops the cycle with no side effects.

use crate::ledger::{Block, Ledger, LedgerError};
use crate::miner::RewardIssuer;
use crate::sync::Broadcaster;
use crate::wallet::{TransactionPool, Wallet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MineError {
    #[error("Ledger rejected the block: {0}")]
    Commit(#[from] LedgerError),
}

pub struct Miner {
    ledger: Arc<dyn Ledger>,
    pool: Arc<dyn TransactionPool>,
    broadcaster: Arc<dyn Broadcaster>,
    rewards: Arc<dyn RewardIssuer>,
    wallet: Wallet,
    // one cycle at a time
    cycle: Mutex<()>,
}

impl Miner {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        pool: Arc<dyn TransactionPool>,
        broadcaster: Arc<dyn Broadcaster>,
        rewards: Arc<dyn RewardIssuer>,
        wallet: Wallet,
    ) -> Self {
        Self {
            ledger,
            pool,
            broadcaster,
            rewards,
            wallet,
            cycle: Mutex::new(()),
        }
    }

    /// Wallet credited by mining rewards
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Mine one block from the pending pool and propagate it
    pub async fn mine(&self) -> Result<Block, MineError> {
        let _cycle = self.cycle.lock().await;

        let mut transactions = self.pool.admissible();
        let pending = transactions.len();
        transactions.push(self.rewards.reward_transaction(&self.wallet.public_key()));

        let block = self.ledger.commit(transactions).map_err(|e| {
            warn!(error = %e, "mining aborted, block rejected");
            MineError::Commit(e)
        })?;

        let chain_peers = self.broadcaster.broadcast_chain().await;
        self.pool.clear();
        let clear_peers = self.broadcaster.broadcast_clear_transactions().await;

        info!(
            hash = %block.hash(),
            transactions = pending,
            chain_peers,
            clear_peers,
            "mined block"
        );
        Ok(block)
    }
}
