// Blockchain module
//
// This module contains the vote ledger implementation including:
// - Block structure
// - Hashing and difficulty
// - Proof of work search
// - Append-only chain store and its persistence
// - Chain validation
// - Vote admission, verification and tallying

pub mod block;
pub mod chain;
pub mod crypto;
pub mod ledger;
pub mod miner;
pub mod storage;
pub mod validator;

// Re-export main components for easier access
pub use block::{Block, Payload};
pub use chain::ChainStore;
pub use ledger::{Receipt, VoteError, VoteLedger};
pub use miner::{CancelFlag, Miner};
pub use storage::BlockchainStorage;
