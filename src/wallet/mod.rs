// Wallet module - WHO PAYS WHOM
// Keys, signed transactions and the pending transaction pool

mod account;
mod keypair;
mod pool;
mod transaction;

pub use account::{Wallet, WalletError, INITIAL_BALANCE};
pub use keypair::{Keypair, KeypairError, PublicKey, Signature};
pub use pool::{MemPool, TransactionPool};
pub use transaction::{Transaction, TransactionId, TxInput, TxOutput, MINING_REWARD};
