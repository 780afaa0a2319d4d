use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::validator::ValidationFailure;
use crate::blockchain::{Block, Payload};

/// Public form of a block's payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BlockData {
    /// `genesis` or `vote`
    #[serde(rename = "type")]
    #[schema(example = "vote")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voter_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
}

/// Public form of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BlockView {
    pub index: u64,

    /// Seconds since the Unix epoch
    #[schema(example = 1700000000)]
    pub timestamp: i64,

    pub previous_hash: String,
    pub nonce: u64,
    pub hash: Option<String>,
    pub data: BlockData,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        let data = match &block.payload {
            Payload::Genesis => BlockData {
                kind: "genesis".to_string(),
                voter_id: None,
                candidate: None,
            },
            Payload::Vote { voter_id, candidate } => BlockData {
                kind: "vote".to_string(),
                voter_id: Some(voter_id.clone()),
                candidate: Some(candidate.clone()),
            },
        };

        BlockView {
            index: block.index,
            timestamp: block.timestamp,
            previous_hash: block.previous_hash.clone(),
            nonce: block.nonce,
            hash: block.hash.clone(),
            data,
        }
    }
}

/// A validation failure as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FailureView {
    pub at_index: u64,
    pub message: String,
}

impl From<&ValidationFailure> for FailureView {
    fn from(failure: &ValidationFailure) -> Self {
        FailureView {
            at_index: failure.at_index,
            message: failure.to_string(),
        }
    }
}
