// Candidate and voter registries
//
// The ledger only needs to ask these whether a candidate or voter exists and
// how many voters are registered. The in-memory implementations below back
// the HTTP service; any other store can be plugged in through the traits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors that can occur during registry operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// An election candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Candidate {
    pub name: String,
    pub party: String,
    #[serde(default)]
    pub description: String,
}

/// A registered voter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Voter {
    pub voter_id: String,
    pub name: String,
    pub email: String,

    /// Cached flag, the ledger's own scan is authoritative
    #[serde(default)]
    pub has_voted: bool,
}

/// Source of truth for which candidates can receive votes
pub trait CandidateRegistry: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    /// All candidates in registration order
    fn list(&self) -> Vec<Candidate>;

    fn add(&self, candidate: Candidate) -> Result<(), RegistryError>;
}

/// Source of truth for who may vote
pub trait VoterRegistry: Send + Sync {
    /// Number of registered voters
    fn count(&self) -> usize;

    fn is_registered(&self, voter_id: &str) -> bool;

    /// Cached "has voted" flag
    fn has_voted(&self, voter_id: &str) -> bool;

    /// Sets the cached "has voted" flag, ignored for unknown voters
    fn mark_voted(&self, voter_id: &str);

    /// All voters in registration order
    fn list(&self) -> Vec<Voter>;

    fn add(&self, voter: Voter) -> Result<(), RegistryError>;
}

/// Candidate registry held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCandidates {
    candidates: Arc<DashMap<String, (u64, Candidate)>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `candidates`, skipping duplicates
    pub fn with_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let registry = Self::new();
        for candidate in candidates {
            if let Err(err) = registry.add(candidate) {
                log::warn!("Skipping seed candidate: {}", err);
            }
        }
        registry
    }
}

impl CandidateRegistry for InMemoryCandidates {
    fn exists(&self, name: &str) -> bool {
        self.candidates.contains_key(name)
    }

    fn list(&self) -> Vec<Candidate> {
        let mut entries: Vec<(u64, Candidate)> = self
            .candidates
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, candidate)| candidate).collect()
    }

    fn add(&self, candidate: Candidate) -> Result<(), RegistryError> {
        if candidate.name.trim().is_empty() || candidate.party.trim().is_empty() {
            return Err(RegistryError::InvalidRecord(
                "name and party are required".to_string(),
            ));
        }

        match self.candidates.entry(candidate.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RegistryError::AlreadyExists(candidate.name))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                slot.insert((seq, candidate));
                Ok(())
            }
        }
    }
}

/// Voter registry held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryVoters {
    voters: Arc<DashMap<String, (u64, Voter)>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryVoters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `voters`, skipping duplicates
    pub fn with_voters(voters: impl IntoIterator<Item = Voter>) -> Self {
        let registry = Self::new();
        for voter in voters {
            if let Err(err) = registry.add(voter) {
                log::warn!("Skipping seed voter: {}", err);
            }
        }
        registry
    }
}

impl VoterRegistry for InMemoryVoters {
    fn count(&self) -> usize {
        self.voters.len()
    }

    fn is_registered(&self, voter_id: &str) -> bool {
        self.voters.contains_key(voter_id)
    }

    fn has_voted(&self, voter_id: &str) -> bool {
        self.voters
            .get(voter_id)
            .map(|entry| entry.value().1.has_voted)
            .unwrap_or(false)
    }

    fn mark_voted(&self, voter_id: &str) {
        if let Some(mut entry) = self.voters.get_mut(voter_id) {
            entry.value_mut().1.has_voted = true;
        }
    }

    fn list(&self) -> Vec<Voter> {
        let mut entries: Vec<(u64, Voter)> = self
            .voters
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, voter)| voter).collect()
    }

    fn add(&self, voter: Voter) -> Result<(), RegistryError> {
        if voter.voter_id.trim().is_empty() || voter.name.trim().is_empty() {
            return Err(RegistryError::InvalidRecord(
                "voter_id and name are required".to_string(),
            ));
        }

        match self.voters.entry(voter.voter_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RegistryError::AlreadyExists(voter.voter_id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                slot.insert((seq, voter));
                Ok(())
            }
        }
    }
}
