use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::crypto::{digest, GENESIS_PREVIOUS_HASH};

/// Content carried by a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Marker content of block 0
    Genesis,

    /// A single vote cast by a voter for a candidate
    Vote { voter_id: String, candidate: String },
}

impl Payload {
    /// Canonical JSON form used for hashing and for the public block shape
    pub fn canonical(&self) -> serde_json::Value {
        match self {
            Payload::Genesis => serde_json::json!({ "type": "genesis" }),
            Payload::Vote { voter_id, candidate } => serde_json::json!({
                "type": "vote",
                "voter_id": voter_id,
                "candidate": candidate,
            }),
        }
    }

    /// Returns the voter id and candidate if this is a vote
    pub fn as_vote(&self) -> Option<(&str, &str)> {
        match self {
            Payload::Vote { voter_id, candidate } => Some((voter_id, candidate)),
            Payload::Genesis => None,
        }
    }
}

/// Represents a block in the ledger
///
/// Every field except `hash` is covered by the digest, so a stored block
/// cannot be altered without invalidating its own hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Seconds since the Unix epoch, fixed before mining
    pub timestamp: i64,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Genesis marker or vote
    pub payload: Payload,

    /// Proof of work
    pub nonce: u64,

    /// Hash of this block, `None` until sealed
    pub hash: Option<String>,
}

impl Block {
    /// Creates a new unsealed block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `previous_hash` - The hash of the current tip
    /// * `payload` - The content of the block
    pub fn new(index: u64, previous_hash: String, payload: Payload) -> Self {
        Self::with_timestamp(index, Utc::now().timestamp(), previous_hash, payload)
    }

    /// Creates a new unsealed block with an explicit timestamp
    pub fn with_timestamp(index: u64, timestamp: i64, previous_hash: String, payload: Payload) -> Self {
        Block {
            index,
            timestamp,
            previous_hash,
            payload,
            nonce: 0,
            hash: None,
        }
    }

    /// Creates the unsealed genesis block
    ///
    /// Every field is fixed so that genesis construction is idempotent.
    pub fn genesis() -> Self {
        Self::with_timestamp(0, 0, GENESIS_PREVIOUS_HASH.to_string(), Payload::Genesis)
    }

    /// Calculates the hash of the block from its stored fields
    ///
    /// The stored `hash` is ignored.
    pub fn calculate_hash(&self) -> String {
        digest(
            self.index,
            self.timestamp,
            &self.previous_hash,
            &self.payload,
            self.nonce,
        )
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Returns the voter id if this block records a vote
    pub fn voter_id(&self) -> Option<&str> {
        self.payload.as_vote().map(|(voter_id, _)| voter_id)
    }
}
