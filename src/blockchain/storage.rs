use std::path::Path;

use serde::{Deserialize, Serialize};
use sled::{Batch, Db, Tree};
use thiserror::Error;

use super::block::Block;
use super::transaction::Transaction;
use crate::network::PeerRegistry;

pub(crate) const CHAIN_KEY: &str = "chain";
const PENDING_KEY: &str = "pending";
const PEERS_KEY: &str = "peers";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Everything a node needs to resume: chain, pending pool and peers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
    pub peers: PeerRegistry,
}

/// sled-backed snapshot store. Each snapshot part is a JSON document.
pub struct SnapshotStore {
    db: Db,
    snapshot: Tree,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore").finish()
    }
}

impl SnapshotStore {
    /// Opens (or creates) the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let snapshot = db.open_tree("snapshot")?;

        Ok(Self { db, snapshot })
    }

    /// Writes chain, pending pool and peers in one atomic batch, then flushes
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let mut batch = Batch::default();
        batch.insert(CHAIN_KEY, encode(&snapshot.chain)?);
        batch.insert(PENDING_KEY, encode(&snapshot.pending_transactions)?);
        batch.insert(PEERS_KEY, encode(&snapshot.peers)?);

        self.snapshot.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    /// Reads the stored snapshot. `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        let chain = match self.snapshot.get(CHAIN_KEY)? {
            Some(bytes) => decode::<Vec<Block>>(&bytes)?,
            None => return Ok(None),
        };

        let pending_transactions = match self.snapshot.get(PENDING_KEY)? {
            Some(bytes) => decode(&bytes)?,
            None => Vec::new(),
        };

        let peers = match self.snapshot.get(PEERS_KEY)? {
            Some(bytes) => decode(&bytes)?,
            None => PeerRegistry::default(),
        };

        Ok(Some(Snapshot {
            chain,
            pending_transactions,
            peers,
        }))
    }

    /// Writes bytes under `key` as-is, bypassing encoding
    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.snapshot.insert(key, value)?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::DeserializationError(e.to_string()))
}
