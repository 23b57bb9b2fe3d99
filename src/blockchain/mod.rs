// Blockchain module
//
// This module contains the ledger engine including:
// - Block and transaction structures
// - Signatures and wallets
// - Proof of work and chain validation
// - The ledger (chain, pending pool, peers)
// - Snapshot storage

pub mod block;
pub mod chain;
pub mod crypto;
pub mod storage;
pub mod transaction;
pub mod verification;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Ledger, Origin, Rejected};
pub use crypto::{Address, Ed25519Verifier, Wallet};
pub use storage::SnapshotStore;
pub use transaction::Transaction;
