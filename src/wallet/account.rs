use crate::wallet::{Keypair, MemPool, PublicKey, Signature, Transaction, TransactionPool};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Balance every freshly generated wallet starts with
pub const INITIAL_BALANCE: u64 = 500;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Amount {requested} exceeds balance {available}")]
    InsufficientBalance { requested: u64, available: u64 },

    #[error("Wallet is not the sender of this transaction")]
    NotSender,
}

/// A keypair plus the balance it can spend
#[derive(Clone, Debug)]
pub struct Wallet {
    keypair: Keypair,
    balance: u64,
}

impl Wallet {
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::generate(),
            balance: INITIAL_BALANCE,
        }
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair,
            balance: INITIAL_BALANCE,
        }
    }

    pub fn with_balance(mut self, balance: u64) -> Self {
        self.balance = balance;
        self
    }

    /// The system wallet that signs mining rewards.
    ///
    /// Derived from a fixed seed so every node agrees on its address.
    pub fn blockchain_wallet() -> Self {
        let seed: [u8; 32] = Sha256::digest(b"chainmesh:blockchain-wallet").into();
        Self::from_keypair(Keypair::from_seed(&seed))
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn sign(&self, data: &[u8]) -> Signature {
        self.keypair.sign(data)
    }

    /// Pay `amount` to `recipient`, folding into our pending transaction if
    /// the pool already holds one, and store the result in the pool.
    pub fn create_transaction(
        &self,
        recipient: PublicKey,
        amount: u64,
        pool: &MemPool,
    ) -> Result<Transaction, WalletError> {
        if amount > self.balance {
            return Err(WalletError::InsufficientBalance {
                requested: amount,
                available: self.balance,
            });
        }

        let tx = match pool.existing_by_sender(&self.public_key()) {
            Some(mut pending) => {
                pending.update(self, recipient, amount)?;
                pending
            }
            None => Transaction::new(self, recipient, amount)?,
        };

        pool.add_or_update(tx.clone());
        Ok(tx)
    }
}
