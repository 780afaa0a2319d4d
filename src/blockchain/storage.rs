use std::path::Path;

use sled::transaction::{TransactionError, TransactionResult};
use sled::{Db, Transactional, Tree};
use thiserror::Error;

use super::block::Block;

/// Metadata key holding the hash of the last stored block
const LATEST_HASH_KEY: &[u8] = b"latest_block_hash";

/// Metadata key holding the difficulty the chain was mined at
const DIFFICULTY_KEY: &[u8] = b"difficulty";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Transaction aborted while saving block {0}")]
    TransactionAborted(u64),
}

/// Durable storage for ledger blocks
pub struct BlockchainStorage {
    /// The database instance
    db: Db,

    /// Tree for blocks, keyed by big-endian index
    blocks: Tree,

    /// Tree for metadata
    metadata: Tree,
}

impl std::fmt::Debug for BlockchainStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainStorage")
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

impl BlockchainStorage {
    /// Opens (or creates) the storage at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;

        let blocks = db.open_tree("blocks")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            blocks,
            metadata,
        })
    }

    /// Saves a block and records it as the tip
    ///
    /// The block and the tip hash are written in one transaction, so either
    /// both land or neither does. The write is flushed before returning.
    pub fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        let value = bincode::serialize(block)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let key = block.index.to_be_bytes();
        let hash = block.hash().unwrap_or_default();

        let result: TransactionResult<(), ()> =
            (&self.blocks, &self.metadata).transaction(|(blocks, metadata)| {
                blocks.insert(&key[..], value.as_slice())?;
                metadata.insert(LATEST_HASH_KEY, hash.as_bytes())?;
                Ok(())
            });

        result.map_err(|e| match e {
            TransactionError::Abort(()) => StorageError::TransactionAborted(block.index),
            TransactionError::Storage(e) => StorageError::DatabaseError(e),
        })?;

        self.flush()
    }

    /// Gets all blocks in index order
    ///
    /// A record that cannot be decoded is an error; it is never skipped.
    pub fn get_all_blocks(&self) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::with_capacity(self.blocks.len());

        for result in self.blocks.iter() {
            let (key, value) = result?;

            let block = bincode::deserialize::<Block>(&value).map_err(|e| {
                StorageError::DeserializationError(format!(
                    "Failed to deserialize block {}: {}",
                    hex::encode(key.as_ref()),
                    e
                ))
            })?;

            blocks.push(block);
        }

        Ok(blocks)
    }

    /// Gets the hash recorded for the last saved block
    pub fn get_latest_block_hash(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .metadata
            .get(LATEST_HASH_KEY)?
            .map(|value| String::from_utf8_lossy(&value).to_string()))
    }

    /// Records the difficulty the stored chain was mined at
    pub fn save_difficulty(&self, difficulty: u8) -> Result<(), StorageError> {
        self.metadata.insert(DIFFICULTY_KEY, vec![difficulty])?;
        self.flush()
    }

    pub fn get_difficulty(&self) -> Result<Option<u8>, StorageError> {
        Ok(self
            .metadata
            .get(DIFFICULTY_KEY)?
            .and_then(|value| value.first().copied()))
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
