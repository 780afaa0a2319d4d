use std::ops::Deref;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;
use thiserror::Error;

use super::block::Block;
use super::crypto::meets_difficulty;
use super::miner::{CancelFlag, Miner, MiningError};
use super::storage::{BlockchainStorage, StorageError};

/// Errors that can occur during chain operations
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Linkage mismatch at block {index}: {reason}")]
    LinkageMismatch { index: u64, reason: String },

    #[error("Block {index} is not sealed to difficulty {difficulty}")]
    UnsealedBlock { index: u64, difficulty: u8 },

    #[error("Failed to mine genesis block: {0}")]
    GenesisMining(#[from] MiningError),
}

/// Immutable point-in-time view of the chain
///
/// Cloning is cheap; the block sequence is shared.
#[derive(Debug, Clone)]
pub struct ChainSnapshot {
    blocks: Arc<Vec<Block>>,
}

impl ChainSnapshot {
    /// Blocks from genesis up to and including `index`
    pub fn prefix(&self, index: u64) -> &[Block] {
        let end = (index as usize).saturating_add(1).min(self.blocks.len());
        &self.blocks[..end]
    }

    /// Finds the vote block recorded for a voter
    pub fn find_vote(&self, voter_id: &str) -> Option<&Block> {
        self.blocks
            .iter()
            .find(|block| block.voter_id() == Some(voter_id))
    }
}

impl Deref for ChainSnapshot {
    type Target = [Block];

    fn deref(&self) -> &[Block] {
        &self.blocks
    }
}

/// Ordered, append-only sequence of sealed blocks
#[derive(Debug)]
pub struct ChainStore {
    /// The chain of blocks, replaced copy-on-write so snapshots stay valid
    chain: RwLock<Arc<Vec<Block>>>,

    /// Number of leading zero hex characters required in each hash
    difficulty: u8,

    /// Storage for ledger data
    storage: Option<BlockchainStorage>,
}

impl ChainStore {
    /// Builds the genesis block sealed by `miner`
    ///
    /// Genesis content is fixed, so repeated calls with the same difficulty
    /// return identical blocks.
    pub fn genesis(miner: &Miner, cancel: &CancelFlag) -> Result<Block, ChainError> {
        Ok(miner.seal(Block::genesis(), cancel)?)
    }

    /// Creates an in-memory chain holding only genesis
    pub fn new(miner: &Miner, cancel: &CancelFlag) -> Result<Self, ChainError> {
        let genesis = Self::genesis(miner, cancel)?;

        Ok(ChainStore {
            chain: RwLock::new(Arc::new(vec![genesis])),
            difficulty: miner.difficulty(),
            storage: None,
        })
    }

    /// Creates a chain backed by persistent storage
    ///
    /// Stored blocks are loaded as they are, without any repair; the caller is
    /// expected to validate them before admitting new blocks. An empty store
    /// is initialised with genesis mined by `miner`.
    pub fn with_storage(
        storage: BlockchainStorage,
        miner: &Miner,
        cancel: &CancelFlag,
    ) -> Result<Self, ChainError> {
        let difficulty = miner.difficulty();
        let mut blocks = storage.get_all_blocks()?;

        if blocks.is_empty() {
            info!("No existing chain found in storage, creating genesis block");
            let genesis = Self::genesis(miner, cancel)?;
            storage.save_block(&genesis)?;
            storage.save_difficulty(difficulty)?;
            blocks.push(genesis);
        } else {
            info!("Loaded {} blocks from storage", blocks.len());

            match storage.get_difficulty()? {
                Some(stored) if stored != difficulty => warn!(
                    "Stored chain was mined at difficulty {} but {} is configured",
                    stored, difficulty
                ),
                Some(_) => {}
                None => storage.save_difficulty(difficulty)?,
            }

            let tip_hash = blocks.last().and_then(|block| block.hash.clone());
            let recorded = storage.get_latest_block_hash()?;
            if recorded != tip_hash {
                warn!(
                    "Recorded tip hash {:?} does not match the last stored block {:?}",
                    recorded, tip_hash
                );
            }
        }

        Ok(ChainStore {
            chain: RwLock::new(Arc::new(blocks)),
            difficulty,
            storage: Some(storage),
        })
    }

    /// Creates an in-memory chain from existing blocks without checking them
    #[cfg(test)]
    pub fn from_blocks(blocks: Vec<Block>, difficulty: u8) -> Self {
        ChainStore {
            chain: RwLock::new(Arc::new(blocks)),
            difficulty,
            storage: None,
        }
    }

    /// Appends a sealed block on top of the current tip
    ///
    /// The block must extend the tip by one index, reference the tip's hash
    /// and carry a correct hash that meets the difficulty. With storage
    /// configured the block is persisted before it becomes visible.
    pub fn append(&self, block: Block) -> Result<(), ChainError> {
        let mut chain = self.chain.write();

        // A chain always holds at least genesis
        let tip = match chain.last() {
            Some(tip) => tip,
            None => {
                return Err(ChainError::LinkageMismatch {
                    index: block.index,
                    reason: "chain has no tip".to_string(),
                })
            }
        };

        if block.index != tip.index + 1 {
            return Err(ChainError::LinkageMismatch {
                index: block.index,
                reason: format!("expected index {}", tip.index + 1),
            });
        }

        if tip.hash() != Some(block.previous_hash.as_str()) {
            return Err(ChainError::LinkageMismatch {
                index: block.index,
                reason: format!(
                    "previous hash {} does not match tip hash {}",
                    block.previous_hash,
                    tip.hash().unwrap_or("<unsealed>")
                ),
            });
        }

        let sealed = match block.hash() {
            Some(hash) => hash == block.calculate_hash() && meets_difficulty(hash, self.difficulty),
            None => false,
        };
        if !sealed {
            return Err(ChainError::UnsealedBlock {
                index: block.index,
                difficulty: self.difficulty,
            });
        }

        if let Some(storage) = &self.storage {
            storage.save_block(&block)?;
            info!("Saved block {} to storage", block.index);
        }

        Arc::make_mut(&mut chain).push(block);

        Ok(())
    }

    /// Gets the last block in the chain
    pub fn tip(&self) -> Block {
        let chain = self.chain.read();
        match chain.last() {
            Some(block) => block.clone(),
            None => Block::genesis(),
        }
    }

    /// Gets a shared view of the entire chain
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            blocks: Arc::clone(&self.chain.read()),
        }
    }

    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::Payload;
    use crate::blockchain::validator::Validator;

    const DIFFICULTY: u8 = 1;

    fn vote_on(tip: &Block, voter_id: &str) -> Block {
        Block::new(
            tip.index + 1,
            tip.hash.clone().unwrap(),
            Payload::Vote {
                voter_id: voter_id.to_string(),
                candidate: "Alice".to_string(),
            },
        )
    }

    fn store() -> ChainStore {
        ChainStore::new(&Miner::new(DIFFICULTY), &CancelFlag::new()).unwrap()
    }

    fn open(path: &std::path::Path) -> Result<ChainStore, ChainError> {
        let storage = BlockchainStorage::new(path)?;
        ChainStore::with_storage(storage, &Miner::new(DIFFICULTY), &CancelFlag::new())
    }

    fn mined_vote_on(tip: &Block, voter_id: &str) -> Block {
        Miner::new(DIFFICULTY)
            .seal(vote_on(tip, voter_id), &CancelFlag::new())
            .unwrap()
    }

    #[test]
    fn test_new_chain_holds_genesis() {
        let store = store();

        assert_eq!(store.len(), 1);
        assert_eq!(store.tip().index, 0);
        assert_eq!(store.tip().payload, Payload::Genesis);
        assert!(store.tip().hash.unwrap().starts_with('0'));
    }

    #[test]
    fn test_genesis_is_idempotent() {
        let miner = Miner::new(2);

        assert_eq!(
            ChainStore::genesis(&miner, &CancelFlag::new()).unwrap(),
            ChainStore::genesis(&miner, &CancelFlag::new()).unwrap()
        );
    }

    #[test]
    fn test_genesis_respects_miner_limits() {
        let bounded = Miner::new(DIFFICULTY).with_max_attempts(Some(0));
        assert!(matches!(
            ChainStore::new(&bounded, &CancelFlag::new()),
            Err(ChainError::GenesisMining(MiningError::Exhausted { attempts: 0 }))
        ));

        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(
            ChainStore::new(&Miner::new(DIFFICULTY), &cancel),
            Err(ChainError::GenesisMining(MiningError::Cancelled { .. }))
        ));

        let dir = tempfile::tempdir().unwrap();
        let storage = BlockchainStorage::new(dir.path()).unwrap();
        assert!(ChainStore::with_storage(storage, &bounded, &CancelFlag::new()).is_err());
        let storage = BlockchainStorage::new(dir.path()).unwrap();
        assert!(storage.get_all_blocks().unwrap().is_empty());
    }

    #[test]
    fn test_append_extends_tip() {
        let store = store();
        let block = mined_vote_on(&store.tip(), "V1");

        store.append(block.clone()).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.tip(), block);
        assert!(Validator::new(DIFFICULTY).validate(&store.snapshot()).valid);
    }

    #[test]
    fn test_append_rejects_wrong_index() {
        let store = store();
        let mut block = vote_on(&store.tip(), "V1");
        block.index = 5;
        let block = Miner::new(DIFFICULTY).seal(block, &CancelFlag::new()).unwrap();

        let result = store.append(block);

        assert!(matches!(result, Err(ChainError::LinkageMismatch { index: 5, .. })));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_rejects_wrong_previous_hash() {
        let store = store();
        let mut block = vote_on(&store.tip(), "V1");
        block.previous_hash = "ab".repeat(32);
        let block = Miner::new(DIFFICULTY).seal(block, &CancelFlag::new()).unwrap();

        assert!(matches!(
            store.append(block),
            Err(ChainError::LinkageMismatch { .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_rejects_unsealed_block() {
        let store = store();
        let unsealed = vote_on(&store.tip(), "V1");

        assert!(matches!(
            store.append(unsealed),
            Err(ChainError::UnsealedBlock { index: 1, .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_rejects_forged_hash() {
        let store = store();
        let mut block = vote_on(&store.tip(), "V1");
        block.hash = Some("0".repeat(64));

        assert!(matches!(
            store.append(block),
            Err(ChainError::UnsealedBlock { .. })
        ));
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let store = store();
        let before = store.snapshot();

        store.append(mined_vote_on(&store.tip(), "V1")).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
        assert_eq!(store.snapshot().prefix(0), &before[..]);
    }

    #[test]
    fn test_find_vote_in_snapshot() {
        let store = store();
        store.append(mined_vote_on(&store.tip(), "V1")).unwrap();
        store.append(mined_vote_on(&store.tip(), "V2")).unwrap();

        let snapshot = store.snapshot();

        assert_eq!(snapshot.find_vote("V2").unwrap().index, 2);
        assert!(snapshot.find_vote("V9").is_none());
        assert_eq!(snapshot.prefix(1).len(), 2);
        assert_eq!(snapshot.prefix(99).len(), 3);
    }

    #[test]
    fn test_chain_reloads_from_storage() {
        let dir = tempfile::tempdir().unwrap();

        let appended = {
            let store = open(dir.path()).unwrap();
            let block = mined_vote_on(&store.tip(), "V1");
            store.append(block.clone()).unwrap();
            block
        };

        let store = open(dir.path()).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.tip(), appended);
        assert!(Validator::new(DIFFICULTY).validate(&store.snapshot()).valid);
    }

    #[test]
    fn test_undecodable_stored_block_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(dir.path()).unwrap();
            store.append(mined_vote_on(&store.tip(), "V1")).unwrap();
        }
        {
            let db = sled::open(dir.path()).unwrap();
            let blocks = db.open_tree("blocks").unwrap();
            blocks.insert(1u64.to_be_bytes(), vec![0xde, 0xad]).unwrap();
            db.flush().unwrap();
        }

        assert!(matches!(
            open(dir.path()),
            Err(ChainError::StorageError(StorageError::DeserializationError(_)))
        ));
    }

    #[test]
    fn test_tampered_stored_block_is_loaded_as_is() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(dir.path()).unwrap();
            store.append(mined_vote_on(&store.tip(), "V1")).unwrap();
            store.append(mined_vote_on(&store.tip(), "V2")).unwrap();
        }
        {
            let storage = BlockchainStorage::new(dir.path()).unwrap();
            let mut blocks = storage.get_all_blocks().unwrap();
            blocks[1].timestamp += 60;
            storage.save_block(&blocks[1]).unwrap();
        }

        let store = open(dir.path()).unwrap();
        let report = Validator::new(DIFFICULTY).validate(&store.snapshot());

        assert_eq!(store.len(), 3);
        assert!(!report.valid);
        assert_eq!(report.first_failure().unwrap().at_index, 1);
    }
}
