use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

use super::block::Block;
use super::crypto::meets_difficulty;

/// Number of nonces tried between checks of the cancel flag
const CANCEL_CHECK_INTERVAL: u64 = 256;

/// Errors that can occur while searching for a proof of work
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("Mining gave up after {attempts} attempts")]
    Exhausted { attempts: u64 },
}

/// Shared signal used to abort an in-progress proof of work search
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests every search observing this flag to stop
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Proof of work search over a block's nonce
#[derive(Debug, Clone, Copy)]
pub struct Miner {
    /// Number of leading zero hex characters required in the hash
    difficulty: u8,

    /// Upper bound on the number of nonces tried, unbounded if `None`
    max_attempts: Option<u64>,
}

impl Miner {
    pub fn new(difficulty: u8) -> Self {
        Miner {
            difficulty,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// Seals a block by searching for a nonce whose hash meets the difficulty
    ///
    /// The search starts from nonce 0. The input block is consumed; on error
    /// nothing is returned, so a partially mined block never escapes.
    ///
    /// # Arguments
    ///
    /// * `block` - The unsealed block
    /// * `cancel` - Flag polled during the search
    ///
    /// # Returns
    ///
    /// The block with `nonce` and `hash` set
    pub fn seal(&self, mut block: Block, cancel: &CancelFlag) -> Result<Block, MiningError> {
        let mut attempts: u64 = 0;
        block.nonce = 0;

        debug!(
            "Mining block {} at difficulty {}",
            block.index, self.difficulty
        );

        loop {
            if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                warn!("Mining of block {} cancelled after {} attempts", block.index, attempts);
                return Err(MiningError::Cancelled { attempts });
            }

            if let Some(max) = self.max_attempts {
                if attempts >= max {
                    warn!("Mining of block {} exhausted {} attempts", block.index, attempts);
                    return Err(MiningError::Exhausted { attempts });
                }
            }

            let hash = block.calculate_hash();
            attempts += 1;

            if meets_difficulty(&hash, self.difficulty) {
                info!(
                    "Mined block {} with nonce {} after {} attempts",
                    block.index, block.nonce, attempts
                );
                block.hash = Some(hash);
                return Ok(block);
            }

            block.nonce = match block.nonce.checked_add(1) {
                Some(nonce) => nonce,
                None => return Err(MiningError::Exhausted { attempts }),
            };
        }
    }
}
