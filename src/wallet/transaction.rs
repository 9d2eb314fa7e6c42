// Transactions - signed transfers between wallets
//
// A transaction spends the sender's whole balance into a set of outputs:
// one change output back to the sender and one output per recipient.
// The input carries the sender's signature over the outputs.

use crate::wallet::{PublicKey, Signature, Wallet, WalletError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Amount credited to a miner for each committed block
pub const MINING_REWARD: u64 = 50;

/// Unique identifier of a transaction, stable across updates
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn generate() -> Self {
        use rand::Rng;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value paid to one address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: u64,
    pub address: PublicKey,
}

/// Who pays, how much they held, and their signature over the outputs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Signing time (unix millis)
    pub timestamp: i64,
    pub amount: u64,
    pub address: PublicKey,
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    input: Option<TxInput>,
    outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Create a signed transfer of `amount` from `sender` to `recipient`
    pub fn new(sender: &Wallet, recipient: PublicKey, amount: u64) -> Result<Self, WalletError> {
        if amount > sender.balance() {
            return Err(WalletError::InsufficientBalance {
                requested: amount,
                available: sender.balance(),
            });
        }

        let outputs = vec![
            TxOutput {
                amount: sender.balance() - amount,
                address: sender.public_key(),
            },
            TxOutput {
                amount,
                address: recipient,
            },
        ];
        Ok(Self::signed(sender, sender.balance(), outputs))
    }

    /// Reward transaction crediting `miner`, signed by the system `source` wallet
    pub fn reward(miner: &PublicKey, source: &Wallet, amount: u64) -> Self {
        let outputs = vec![TxOutput {
            amount,
            address: *miner,
        }];
        Self::signed(source, amount, outputs)
    }

    fn signed(sender: &Wallet, input_amount: u64, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: TransactionId::generate(),
            input: None,
            outputs,
        };
        tx.sign(sender, input_amount);
        tx
    }

    fn sign(&mut self, sender: &Wallet, input_amount: u64) {
        self.input = Some(TxInput {
            timestamp: chrono::Utc::now().timestamp_millis(),
            amount: input_amount,
            address: sender.public_key(),
            signature: sender.sign(&Self::outputs_digest(&self.outputs)),
        });
    }

    /// Add another recipient, taking the amount out of the sender's change
    pub fn update(&mut self, sender: &Wallet, recipient: PublicKey, amount: u64) -> Result<(), WalletError> {
        let sender_key = sender.public_key();
        let change = self
            .outputs
            .iter_mut()
            .find(|o| o.address == sender_key)
            .ok_or(WalletError::NotSender)?;

        if amount > change.amount {
            return Err(WalletError::InsufficientBalance {
                requested: amount,
                available: change.amount,
            });
        }

        change.amount -= amount;
        self.outputs.push(TxOutput {
            amount,
            address: recipient,
        });

        let input_amount = self.input.as_ref().map(|i| i.amount).unwrap_or(sender.balance());
        self.sign(sender, input_amount);
        Ok(())
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn input(&self) -> Option<&TxInput> {
        self.input.as_ref()
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    /// Address of the signer, if signed
    pub fn sender(&self) -> Option<&PublicKey> {
        self.input.as_ref().map(|i| &i.address)
    }

    pub fn output_total(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }

    /// The input signature covers the current outputs
    pub fn verify_signature(&self) -> bool {
        match &self.input {
            Some(input) => input
                .address
                .verify(&Self::outputs_digest(&self.outputs), &input.signature),
            None => false,
        }
    }

    /// Outputs spend exactly what the input held
    pub fn is_balanced(&self) -> bool {
        self.input
            .as_ref()
            .map(|i| i.amount == self.output_total())
            .unwrap_or(false)
    }

    pub fn is_valid(&self) -> bool {
        self.is_balanced() && self.verify_signature()
    }

    fn outputs_digest(outputs: &[TxOutput]) -> Vec<u8> {
        let encoded = serde_json::to_vec(outputs).unwrap_or_default();
        Sha256::digest(&encoded).to_vec()
    }
}
