// Blockchain - the local copy of the replicated ledger
//
// Conflict rule: a received chain replaces ours only when it is strictly
// longer and fully valid. Validation and the swap happen under one lock so
// concurrent replacements never interleave.

use crate::ledger::Block;
use crate::wallet::{Transaction, TransactionId};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Block has no transactions")]
    EmptyBlock,

    #[error("Transaction {0} failed verification")]
    InvalidTransaction(TransactionId),

    #[error("Chain is empty")]
    EmptyChain,

    #[error("Chain does not start with the genesis block")]
    BadGenesis,

    #[error("Block {index} does not link to its parent")]
    BrokenLink { index: usize },

    #[error("Block {index} has a wrong hash")]
    BadHash { index: usize },
}

/// Result of offering a candidate chain to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    /// Candidate adopted
    Replaced { length: usize },
    /// Candidate is not strictly longer than ours
    NotLonger { received: usize, local: usize },
    /// Candidate is longer but fails validation
    Invalid(LedgerError),
}

impl Replacement {
    pub fn is_replaced(&self) -> bool {
        matches!(self, Self::Replaced { .. })
    }
}

/// Ordered sequence of committed blocks, shared by the miner and peers
pub trait Ledger: Send + Sync {
    /// Snapshot of the full chain
    fn units(&self) -> Vec<Block>;

    /// Append a new block holding `transactions`
    fn commit(&self, transactions: Vec<Transaction>) -> Result<Block, LedgerError>;

    /// Adopt `candidate` if it is strictly longer and valid
    fn replace_if_better(&self, candidate: Vec<Block>) -> Replacement;

    fn height(&self) -> usize {
        self.units().len()
    }
}

/// In-memory chain starting at genesis
#[derive(Debug)]
pub struct Blockchain {
    chain: Mutex<Vec<Block>>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    pub fn new() -> Self {
        Self {
            chain: Mutex::new(vec![Block::genesis()]),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Block>> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn last_block(&self) -> Block {
        self.lock().last().cloned().unwrap_or_else(Block::genesis)
    }

    /// Check genesis, parent links and hashes of a whole chain
    pub fn validate_chain(blocks: &[Block]) -> Result<(), LedgerError> {
        let first = blocks.first().ok_or(LedgerError::EmptyChain)?;
        if !first.is_genesis() {
            return Err(LedgerError::BadGenesis);
        }

        for (index, pair) in blocks.windows(2).enumerate() {
            let (parent, block) = (&pair[0], &pair[1]);
            if block.last_hash() != parent.hash() {
                return Err(LedgerError::BrokenLink { index: index + 1 });
            }
            if !block.hash_matches() {
                return Err(LedgerError::BadHash { index: index + 1 });
            }
        }
        Ok(())
    }

    pub fn is_valid_chain(blocks: &[Block]) -> bool {
        Self::validate_chain(blocks).is_ok()
    }
}

impl Ledger for Blockchain {
    fn units(&self) -> Vec<Block> {
        self.lock().clone()
    }

    fn commit(&self, transactions: Vec<Transaction>) -> Result<Block, LedgerError> {
        if transactions.is_empty() {
            return Err(LedgerError::EmptyBlock);
        }
        if let Some(bad) = transactions.iter().find(|tx| !tx.verify_signature()) {
            return Err(LedgerError::InvalidTransaction(bad.id().clone()));
        }

        let mut chain = self.lock();
        let parent = chain.last().cloned().unwrap_or_else(Block::genesis);
        let block = Block::next(&parent, transactions);
        chain.push(block.clone());

        info!(height = chain.len(), hash = %block.hash(), "block committed");
        Ok(block)
    }

    fn replace_if_better(&self, candidate: Vec<Block>) -> Replacement {
        let mut chain = self.lock();

        if candidate.len() <= chain.len() {
            return Replacement::NotLonger {
                received: candidate.len(),
                local: chain.len(),
            };
        }
        if let Err(e) = Self::validate_chain(&candidate) {
            return Replacement::Invalid(e);
        }

        let length = candidate.len();
        *chain = candidate;
        info!(height = length, "replaced local chain with longer peer chain");
        Replacement::Replaced { length }
    }

    fn height(&self) -> usize {
        self.lock().len()
    }
}
