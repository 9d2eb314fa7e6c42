// Block - one committed batch of transactions

use crate::wallet::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const GENESIS_LAST_HASH: &str = "-----";
const GENESIS_HASH: &str = "f1r57-h45h";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Creation time (unix millis)
    timestamp: i64,
    last_hash: String,
    hash: String,
    data: Vec<Transaction>,
}

impl Block {
    /// The fixed first block shared by every node
    pub fn genesis() -> Self {
        Self {
            timestamp: 0,
            last_hash: GENESIS_LAST_HASH.to_string(),
            hash: GENESIS_HASH.to_string(),
            data: Vec::new(),
        }
    }

    /// Build the block that follows `last`
    pub fn next(last: &Block, data: Vec<Transaction>) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let hash = Self::compute_hash(timestamp, &last.hash, &data);

        Self {
            timestamp,
            last_hash: last.hash.clone(),
            hash,
            data,
        }
    }

    /// Hex SHA-256 over the timestamp, parent hash and JSON-encoded data
    pub fn compute_hash(timestamp: i64, last_hash: &str, data: &[Transaction]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(timestamp.to_le_bytes());
        hasher.update(last_hash.as_bytes());
        hasher.update(serde_json::to_vec(data).unwrap_or_default());
        hex::encode(hasher.finalize())
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn last_hash(&self) -> &str {
        &self.last_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn data(&self) -> &[Transaction] {
        &self.data
    }

    pub fn is_genesis(&self) -> bool {
        *self == Self::genesis()
    }

    /// Stored hash matches the block contents
    pub fn hash_matches(&self) -> bool {
        self.hash == Self::compute_hash(self.timestamp, &self.last_hash, &self.data)
    }
}
