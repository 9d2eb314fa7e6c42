// Reward issuing - the transaction that pays a miner for a block

use crate::wallet::{PublicKey, Transaction, Wallet, MINING_REWARD};

/// Builds the reward transaction appended to every mined block
pub trait RewardIssuer: Send + Sync {
    fn reward_transaction(&self, miner: &PublicKey) -> Transaction;
}

/// Rewards signed by the shared blockchain wallet
#[derive(Clone, Debug)]
pub struct SystemReward {
    source: Wallet,
    amount: u64,
}

impl SystemReward {
    pub fn new() -> Self {
        Self {
            source: Wallet::blockchain_wallet(),
            amount: MINING_REWARD,
        }
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }

    /// Address every reward is paid from
    pub fn source(&self) -> PublicKey {
        self.source.public_key()
    }
}

impl Default for SystemReward {
    fn default() -> Self {
        Self::new()
    }
}

impl RewardIssuer for SystemReward {
    fn reward_transaction(&self, miner: &PublicKey) -> Transaction {
        Transaction::reward(miner, &self.source, self.amount)
    }
}
