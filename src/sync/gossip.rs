// Gossip Handler - applies inbound peer messages to local state
//
// The handler validates nothing itself: chain validity belongs to the
// ledger and transaction admission to the pool. It only routes each
// decoded message to the right collaborator and keeps counters.

use crate::ledger::{Ledger, Replacement};
use crate::sync::protocol::{Message, ProtocolError};
use crate::wallet::TransactionPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// What an inbound message did to local state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Peer chain adopted
    ChainReplaced { length: usize },
    /// Peer chain was not better; local chain unchanged
    ChainKept,
    /// Transaction added to or updated in the pool
    TransactionStored,
    /// Pending pool emptied
    PoolCleared,
    /// Unknown message type, nothing done
    Ignored { tag: String },
}

/// Statistics about inbound message handling
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GossipStats {
    pub messages_processed: u64,
    pub chains_replaced: u64,
    pub chains_kept: u64,
    pub transactions_stored: u64,
    pub pool_clears: u64,
    pub unknown_ignored: u64,
    pub decode_failures: u64,
}

#[derive(Default)]
struct Counters {
    messages_processed: AtomicU64,
    chains_replaced: AtomicU64,
    chains_kept: AtomicU64,
    transactions_stored: AtomicU64,
    pool_clears: AtomicU64,
    unknown_ignored: AtomicU64,
    decode_failures: AtomicU64,
}

/// Routes inbound messages to the ledger and the transaction pool
pub struct GossipHandler {
    ledger: Arc<dyn Ledger>,
    pool: Arc<dyn TransactionPool>,
    counters: Counters,
}

impl GossipHandler {
    pub fn new(ledger: Arc<dyn Ledger>, pool: Arc<dyn TransactionPool>) -> Self {
        Self {
            ledger,
            pool,
            counters: Counters::default(),
        }
    }

    /// Decode one raw frame and apply it.
    ///
    /// A decode failure is returned to the caller (who logs and drops the
    /// frame); it never touches local state.
    pub fn handle_frame(&self, frame: &str) -> Result<Dispatch, ProtocolError> {
        match Message::decode(frame) {
            Ok(Some(message)) => Ok(self.dispatch(message)),
            Ok(None) => {
                let tag = Message::frame_tag(frame).unwrap_or_default();
                self.counters.messages_processed.fetch_add(1, Ordering::Relaxed);
                self.counters.unknown_ignored.fetch_add(1, Ordering::Relaxed);
                debug!(tag = %tag, "ignoring message with unknown type");
                Ok(Dispatch::Ignored { tag })
            }
            Err(e) => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Apply a decoded message
    pub fn dispatch(&self, message: Message) -> Dispatch {
        self.counters.messages_processed.fetch_add(1, Ordering::Relaxed);

        match message {
            Message::Chain { chain } => match self.ledger.replace_if_better(chain) {
                Replacement::Replaced { length } => {
                    self.counters.chains_replaced.fetch_add(1, Ordering::Relaxed);
                    Dispatch::ChainReplaced { length }
                }
                Replacement::NotLonger { received, local } => {
                    self.counters.chains_kept.fetch_add(1, Ordering::Relaxed);
                    debug!(received, local, "received chain is not longer");
                    Dispatch::ChainKept
                }
                Replacement::Invalid(e) => {
                    self.counters.chains_kept.fetch_add(1, Ordering::Relaxed);
                    info!(error = %e, "received invalid chain");
                    Dispatch::ChainKept
                }
            },

            Message::Transaction { transaction } => {
                debug!(tx = %transaction.id(), "storing peer transaction");
                self.pool.add_or_update(transaction);
                self.counters.transactions_stored.fetch_add(1, Ordering::Relaxed);
                Dispatch::TransactionStored
            }

            Message::ClearTransactions => {
                self.pool.clear();
                self.counters.pool_clears.fetch_add(1, Ordering::Relaxed);
                Dispatch::PoolCleared
            }
        }
    }

    /// Get statistics
    pub fn stats(&self) -> GossipStats {
        let c = &self.counters;
        GossipStats {
            messages_processed: c.messages_processed.load(Ordering::Relaxed),
            chains_replaced: c.chains_replaced.load(Ordering::Relaxed),
            chains_kept: c.chains_kept.load(Ordering::Relaxed),
            transactions_stored: c.transactions_stored.load(Ordering::Relaxed),
            pool_clears: c.pool_clears.load(Ordering::Relaxed),
            unknown_ignored: c.unknown_ignored.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
        }
    }
}
