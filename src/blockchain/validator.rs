use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::block::{Block, Payload};
use super::crypto::{meets_difficulty, GENESIS_PREVIOUS_HASH};

/// Kind of inconsistency found in a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Block 0 is not a genesis block with the sentinel previous hash
    GenesisShape,

    /// A genesis payload appears after block 0
    MisplacedGenesis,

    /// Stored index does not match the block's position
    IndexOutOfSequence { expected: u64 },

    /// Stored hash is missing or differs from the recomputed one
    HashMismatch,

    /// `previous_hash` differs from the recomputed hash of the predecessor
    BrokenLink,

    /// Recomputed hash does not meet the difficulty
    InsufficientWork,

    /// The voter already has a vote recorded earlier in the chain
    DuplicateVoter { voter_id: String, first_index: u64 },
}

/// A structural or cryptographic inconsistency at a specific block
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("Validation failure at block {at_index}: {violation:?}")]
pub struct ValidationFailure {
    pub at_index: u64,
    pub violation: Violation,
}

/// Diagnostic counters collected during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChainStats {
    pub total_blocks: usize,
    pub total_votes: usize,
    pub difficulty: u8,
    pub latest_hash: Option<String>,
}

/// Result of a full chain scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub failures: Vec<ValidationFailure>,
    pub stats: ChainStats,
}

impl ValidationReport {
    pub fn first_failure(&self) -> Option<&ValidationFailure> {
        self.failures.first()
    }
}

/// Full chain integrity scan
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    difficulty: u8,
}

impl Validator {
    pub fn new(difficulty: u8) -> Self {
        Validator { difficulty }
    }

    /// Validates a sequence of blocks starting at genesis
    ///
    /// Every block's hash is recomputed from its fields. The scan never stops
    /// early; all failures are collected in index order.
    pub fn validate(&self, blocks: &[Block]) -> ValidationReport {
        let mut failures = Vec::new();
        let mut voters: HashMap<&str, u64> = HashMap::new();
        let mut total_votes = 0;
        let mut previous_recomputed: Option<String> = None;

        for (position, block) in blocks.iter().enumerate() {
            let position = position as u64;
            let mut fail = |violation| {
                failures.push(ValidationFailure {
                    at_index: position,
                    violation,
                })
            };

            if block.index != position {
                fail(Violation::IndexOutOfSequence { expected: position });
            }

            let recomputed = block.calculate_hash();

            if block.hash() != Some(recomputed.as_str()) {
                fail(Violation::HashMismatch);
            }

            if !meets_difficulty(&recomputed, self.difficulty) {
                fail(Violation::InsufficientWork);
            }

            match &previous_recomputed {
                None => {
                    if block.payload != Payload::Genesis || block.previous_hash != GENESIS_PREVIOUS_HASH {
                        fail(Violation::GenesisShape);
                    }
                }
                Some(previous) => {
                    if block.previous_hash != *previous {
                        fail(Violation::BrokenLink);
                    }
                    if block.payload == Payload::Genesis {
                        fail(Violation::MisplacedGenesis);
                    }
                }
            }

            if let Some((voter_id, _)) = block.payload.as_vote() {
                total_votes += 1;

                if let Some(&first_index) = voters.get(voter_id) {
                    fail(Violation::DuplicateVoter {
                        voter_id: voter_id.to_string(),
                        first_index,
                    });
                } else {
                    voters.insert(voter_id, position);
                }
            }

            previous_recomputed = Some(recomputed);
        }

        ValidationReport {
            valid: failures.is_empty() && !blocks.is_empty(),
            failures,
            stats: ChainStats {
                total_blocks: blocks.len(),
                total_votes,
                difficulty: self.difficulty,
                latest_hash: blocks.last().and_then(|b| b.hash.clone()),
            },
        }
    }
}
