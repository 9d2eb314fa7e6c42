// Protocol - Message types exchanged between nodes
//
// Every frame is one JSON object tagged by its "type" field:
// - CHAIN: the sender's full chain (sent on join and after mining)
// - TRANSACTION: one pending transaction to add or update
// - CLEAR_TRANSACTIONS: a block was mined, drop the pending pool
//
// Frames with an unknown tag decode to nothing and are ignored, so newer
// nodes can add message types without breaking older ones.

use crate::ledger::Block;
use crate::wallet::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Types of messages in the protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    Chain,
    Transaction,
    ClearTransactions,
}

impl MessageType {
    /// Wire tag for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Chain => "CHAIN",
            MessageType::Transaction => "TRANSACTION",
            MessageType::ClearTransactions => "CLEAR_TRANSACTIONS",
        }
    }

    /// Parse a wire tag; unknown tags give `None`
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CHAIN" => Some(MessageType::Chain),
            "TRANSACTION" => Some(MessageType::Transaction),
            "CLEAR_TRANSACTIONS" => Some(MessageType::ClearTransactions),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Frame has no string \"type\" field")]
    MissingType,

    #[error("Invalid {tag} payload: {reason}")]
    InvalidPayload { tag: MessageType, reason: String },

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),
}

/// Wrapper for all message types
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Chain { chain: Vec<Block> },
    Transaction { transaction: Transaction },
    ClearTransactions,
}

impl Message {
    /// Get the message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Chain { .. } => MessageType::Chain,
            Message::Transaction { .. } => MessageType::Transaction,
            Message::ClearTransactions => MessageType::ClearTransactions,
        }
    }

    /// Encode as a single-line JSON frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::EncodeFailed(e.to_string()))
    }

    /// Decode one frame.
    ///
    /// `Ok(None)` means the frame was well formed but carried a tag this
    /// node does not know.
    pub fn decode(frame: &str) -> Result<Option<Self>, ProtocolError> {
        let value: Value =
            serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let tag = match value.get("type") {
            Some(Value::String(tag)) => tag.as_str(),
            _ if !value.is_object() => {
                return Err(ProtocolError::Malformed("frame is not a JSON object".to_string()))
            }
            _ => return Err(ProtocolError::MissingType),
        };

        let Some(message_type) = MessageType::from_tag(tag) else {
            return Ok(None);
        };

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ProtocolError::InvalidPayload {
                tag: message_type,
                reason: e.to_string(),
            })
    }

    /// Peek at the tag of a frame without decoding the payload
    pub fn frame_tag(frame: &str) -> Option<String> {
        let value: Value = serde_json::from_str(frame).ok()?;
        value.get("type")?.as_str().map(str::to_string)
    }
}
