// Transaction Pool - pending transactions waiting for the next block

use crate::wallet::{PublicKey, Transaction, TransactionId};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Node-local store of pending transactions
///
/// Implementations serialize their own mutations; callers share one pool
/// between the peer dispatcher and the miner.
pub trait TransactionPool: Send + Sync {
    /// Transactions fit to go into the next block
    fn admissible(&self) -> Vec<Transaction>;

    /// Insert, or replace the transaction with the same id
    fn add_or_update(&self, tx: Transaction);

    /// Drop every pending transaction
    fn clear(&self);
}

/// In-memory pool keeping insertion order
#[derive(Debug, Default)]
pub struct MemPool {
    transactions: Mutex<Vec<Transaction>>,
}

impl MemPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Transaction>> {
        self.transactions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Every pending transaction, valid or not
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().clone()
    }

    pub fn get(&self, id: &TransactionId) -> Option<Transaction> {
        self.lock().iter().find(|t| t.id() == id).cloned()
    }

    /// Pending transaction signed by `address`, if any
    pub fn existing_by_sender(&self, address: &PublicKey) -> Option<Transaction> {
        self.lock()
            .iter()
            .find(|t| t.sender() == Some(address))
            .cloned()
    }
}

impl TransactionPool for MemPool {
    fn admissible(&self) -> Vec<Transaction> {
        self.lock()
            .iter()
            .filter(|tx| {
                if !tx.is_balanced() {
                    debug!(tx = %tx.id(), "dropping unbalanced transaction");
                    return false;
                }
                if !tx.verify_signature() {
                    debug!(tx = %tx.id(), "dropping transaction with bad signature");
                    return false;
                }
                true
            })
            .cloned()
            .collect()
    }

    fn add_or_update(&self, tx: Transaction) {
        let mut transactions = self.lock();
        match transactions.iter_mut().find(|t| t.id() == tx.id()) {
            Some(existing) => *existing = tx,
            None => transactions.push(tx),
        }
    }

    fn clear(&self) {
        self.lock().clear();
    }
}
