use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Proof value carried by the genesis block
pub const GENESIS_PROOF: u64 = 100;

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Hash of the previous block (empty for genesis)
    pub previous_hash: String,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Transactions included in this block, reward last
    pub transactions: Vec<Transaction>,

    /// Proof of work (nonce)
    pub proof: u64,
}

impl Block {
    /// Creates a new block stamped with the current time
    pub fn new(index: u64, previous_hash: String, transactions: Vec<Transaction>, proof: u64) -> Self {
        Block {
            index,
            previous_hash,
            timestamp: Utc::now(),
            transactions,
            proof,
        }
    }

    /// The genesis block. Its timestamp is pinned to the Unix epoch so every
    /// node derives the same genesis hash.
    pub fn genesis() -> Self {
        Block {
            index: 0,
            previous_hash: String::new(),
            timestamp: DateTime::<Utc>::default(),
            transactions: Vec::new(),
            proof: GENESIS_PROOF,
        }
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block's JSON form as a hexadecimal string
    pub fn calculate_hash(&self) -> String {
        let block_bytes =
            serde_json::to_vec(self).expect("block fields always serialize to JSON");

        let mut hasher = Sha256::new();
        hasher.update(&block_bytes);
        hex::encode(hasher.finalize())
    }
}

/// Hashes a block for chaining and as the proof-of-work input
pub fn hash_block(block: &Block) -> String {
    block.calculate_hash()
}
