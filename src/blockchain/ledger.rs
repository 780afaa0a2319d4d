use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::block::{Block, Payload};
use super::chain::{ChainError, ChainSnapshot, ChainStore};
use super::miner::{CancelFlag, Miner, MiningError};
use super::validator::{ChainStats, ValidationFailure, ValidationReport, Validator};
use crate::registry::{CandidateRegistry, VoterRegistry};

/// Errors that can occur while admitting a vote
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Voter not found: {0}")]
    VoterNotFound(String),

    #[error("Candidate not found: {0}")]
    CandidateNotFound(String),

    #[error("Voter {voter_id} has already voted in block {block_index}")]
    DuplicateVote { voter_id: String, block_index: u64 },

    #[error("Chain failed validation at block {at_index}, admissions are halted")]
    ChainCorrupted { at_index: u64 },

    #[error("Mining aborted: {0}")]
    MiningAborted(#[from] MiningError),

    #[error("Chain error: {0}")]
    ChainError(#[from] ChainError),
}

/// Confirmation of an appended vote block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Receipt {
    pub block_hash: String,
    pub block_index: u64,
    pub voter_id: String,
    pub candidate: String,
    pub timestamp: i64,
}

impl Receipt {
    /// Projects a sealed vote block, `None` for anything else
    pub fn from_block(block: &Block) -> Option<Self> {
        let (voter_id, candidate) = block.payload.as_vote()?;

        Some(Receipt {
            block_hash: block.hash.clone()?,
            block_index: block.index,
            voter_id: voter_id.to_string(),
            candidate: candidate.to_string(),
            timestamp: block.timestamp,
        })
    }
}

/// A recorded vote together with the trust that can be placed in it
#[derive(Debug, Clone)]
pub struct VoteVerification {
    pub block: Block,

    /// Whether genesis up to and including the vote block validates
    pub chain_valid_up_to_block: bool,

    /// Whether the whole chain validates
    pub chain_valid: bool,
}

/// Per-candidate line of the results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CandidateResult {
    pub name: String,
    pub party: String,
    pub vote_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TurnoutStats {
    pub total_voters: usize,
    pub voted: usize,
    pub turnout: f64,
    pub total_votes: usize,
}

/// Election results counted from the chain
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Tally {
    pub results: Vec<CandidateResult>,
    pub stats: TurnoutStats,
}

#[cfg(test)]
impl Tally {
    /// Votes counted for `candidate`, 0 if it has none
    pub fn count_for(&self, candidate: &str) -> usize {
        self.results
            .iter()
            .find(|r| r.name == candidate)
            .map(|r| r.vote_count)
            .unwrap_or(0)
    }
}

/// Validation result over a snapshot, for the chain explorer
#[derive(Debug, Clone)]
pub struct ChainStatus {
    pub valid: bool,
    pub chain: ChainSnapshot,
    pub stats: ChainStats,
    pub failures: Vec<ValidationFailure>,
}

/// Rounds to one decimal place
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round1(part as f64 / whole as f64 * 100.0)
    }
}

/// Admits votes onto the chain and answers queries over it
pub struct VoteLedger {
    chain: ChainStore,
    candidates: Arc<dyn CandidateRegistry>,
    voters: Arc<dyn VoterRegistry>,
    miner: Miner,
    validator: Validator,

    /// Serializes build, mine and append
    admission: Mutex<()>,

    /// Once tripped, every in-progress and future mining attempt aborts
    cancel: CancelFlag,

    /// Index of the first failure once the chain has been seen invalid
    halted_at: Mutex<Option<u64>>,
}

impl std::fmt::Debug for VoteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteLedger")
            .field("chain", &self.chain)
            .field("miner", &self.miner)
            .field("halted_at", &*self.halted_at.lock())
            .finish()
    }
}

impl VoteLedger {
    /// Creates a ledger over an existing chain
    ///
    /// The whole chain is validated first. An invalid chain is kept untouched
    /// and the ledger starts with admissions halted. The voter registry's
    /// "has voted" cache is brought in line with the chain.
    pub fn new(
        chain: ChainStore,
        candidates: Arc<dyn CandidateRegistry>,
        voters: Arc<dyn VoterRegistry>,
    ) -> Self {
        let difficulty = chain.difficulty();

        let ledger = VoteLedger {
            chain,
            candidates,
            voters,
            miner: Miner::new(difficulty),
            validator: Validator::new(difficulty),
            admission: Mutex::new(()),
            cancel: CancelFlag::new(),
            halted_at: Mutex::new(None),
        };

        let snapshot = ledger.chain.snapshot();
        let report = ledger.check(&snapshot);
        if report.valid {
            info!(
                "Chain of {} blocks ({} votes) validated at difficulty {}",
                report.stats.total_blocks, report.stats.total_votes, difficulty
            );
        }

        let mut reconciled = 0;
        for voter_id in snapshot.iter().filter_map(|block| block.voter_id()) {
            if ledger.voters.is_registered(voter_id) && !ledger.voters.has_voted(voter_id) {
                ledger.voters.mark_voted(voter_id);
                reconciled += 1;
            }
        }
        if reconciled > 0 {
            info!("Marked {} registered voters as voted from the chain", reconciled);
        }

        ledger
    }

    /// Caps the number of nonces tried per vote
    pub fn with_max_mining_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.miner = self.miner.with_max_attempts(max_attempts);
        self
    }

    /// Shares a cancel flag with the code that opened the chain
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Records a vote as a new sealed block
    ///
    /// Either the block is mined and appended and a receipt returned, or the
    /// chain is left exactly as it was.
    pub fn cast_vote(&self, voter_id: &str, candidate: &str) -> Result<Receipt, VoteError> {
        if let Some(at_index) = *self.halted_at.lock() {
            return Err(VoteError::ChainCorrupted { at_index });
        }

        if !self.voters.is_registered(voter_id) {
            return Err(VoteError::VoterNotFound(voter_id.to_string()));
        }

        if !self.candidates.exists(candidate) {
            return Err(VoteError::CandidateNotFound(candidate.to_string()));
        }

        let _admission = self.admission.lock();
        let snapshot = self.chain.snapshot();

        if let Some(existing) = snapshot.find_vote(voter_id) {
            warn!("Rejected duplicate vote from {}", voter_id);
            self.voters.mark_voted(voter_id);
            return Err(VoteError::DuplicateVote {
                voter_id: voter_id.to_string(),
                block_index: existing.index,
            });
        }

        let report = self.check(&snapshot);
        if let Some(failure) = report.first_failure() {
            return Err(VoteError::ChainCorrupted {
                at_index: failure.at_index,
            });
        }

        let tip = self.chain.tip();
        let previous_hash = match tip.hash {
            Some(hash) => hash,
            None => return Err(VoteError::ChainCorrupted { at_index: tip.index }),
        };

        let block = Block::new(
            tip.index + 1,
            previous_hash,
            Payload::Vote {
                voter_id: voter_id.to_string(),
                candidate: candidate.to_string(),
            },
        );

        let sealed = self.miner.seal(block, &self.cancel)?;
        self.chain.append(sealed.clone())?;
        self.voters.mark_voted(voter_id);

        info!("Recorded vote of {} in block {}", voter_id, sealed.index);

        Receipt::from_block(&sealed).ok_or(VoteError::ChainCorrupted {
            at_index: sealed.index,
        })
    }

    /// Looks up the vote recorded for a voter
    pub fn verify_vote(&self, voter_id: &str) -> Option<VoteVerification> {
        let snapshot = self.chain.snapshot();
        let position = snapshot
            .iter()
            .position(|block| block.voter_id() == Some(voter_id))?;

        let chain_valid_up_to_block = self.check(snapshot.prefix(position as u64)).valid;
        let chain_valid = self.check(&snapshot).valid;

        Some(VoteVerification {
            block: snapshot[position].clone(),
            chain_valid_up_to_block,
            chain_valid,
        })
    }

    /// Whether the chain records a vote for `voter_id`
    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.chain.snapshot().find_vote(voter_id).is_some()
    }

    /// Counts votes per candidate
    ///
    /// Every registered candidate gets a row, as does any name found on the
    /// chain that is no longer registered. Rows are ordered by vote count,
    /// ties keep registration order.
    pub fn tally(&self) -> Tally {
        let snapshot = self.chain.snapshot();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut voters: HashSet<&str> = HashSet::new();
        let mut total_votes = 0;

        for (voter_id, candidate) in snapshot.iter().filter_map(|b| b.payload.as_vote()) {
            *counts.entry(candidate).or_insert(0) += 1;
            voters.insert(voter_id);
            total_votes += 1;
        }

        let mut results: Vec<CandidateResult> = self
            .candidates
            .list()
            .into_iter()
            .map(|candidate| {
                let vote_count = counts.remove(candidate.name.as_str()).unwrap_or(0);
                CandidateResult {
                    name: candidate.name,
                    party: candidate.party,
                    vote_count,
                    percentage: percent(vote_count, total_votes),
                }
            })
            .collect();

        let mut unregistered: Vec<(&str, usize)> = counts.into_iter().collect();
        unregistered.sort();
        for (name, vote_count) in unregistered {
            results.push(CandidateResult {
                name: name.to_string(),
                party: String::new(),
                vote_count,
                percentage: percent(vote_count, total_votes),
            });
        }

        results.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));

        // Turnout only counts voters the registry still knows about
        let total_voters = self.voters.count();
        let voted = voters
            .into_iter()
            .filter(|voter_id| self.voters.is_registered(voter_id))
            .count();

        Tally {
            results,
            stats: TurnoutStats {
                total_voters,
                voted,
                turnout: percent(voted, total_voters),
                total_votes,
            },
        }
    }

    /// Validates the current chain for external reporting
    pub fn status(&self) -> ChainStatus {
        let snapshot = self.chain.snapshot();
        let report = self.check(&snapshot);

        ChainStatus {
            valid: report.valid,
            chain: snapshot,
            stats: report.stats,
            failures: report.failures,
        }
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        self.chain.snapshot()
    }

    pub fn halted_at(&self) -> Option<u64> {
        *self.halted_at.lock()
    }

    /// Validates blocks and halts admissions if they are invalid
    fn check(&self, blocks: &[Block]) -> ValidationReport {
        let report = self.validator.validate(blocks);

        if let Some(failure) = report.first_failure() {
            let mut halted_at = self.halted_at.lock();
            if halted_at.is_none() {
                error!("Chain validation failed, halting admissions: {}", failure);
                *halted_at = Some(failure.at_index);
            }
        }

        report
    }
}
