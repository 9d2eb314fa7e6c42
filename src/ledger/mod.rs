// Ledger module - THE SHARED HISTORY
// Blocks, chain validation and the longest-valid-chain replacement rule

mod block;
mod chain;

pub use block::Block;
pub use chain::{Blockchain, Ledger, LedgerError, Replacement};
