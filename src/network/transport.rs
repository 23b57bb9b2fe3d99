use thiserror::Error;

use crate::blockchain::{Block, Transaction};

/// Errors raised while talking to a peer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("Peer {peer} answered with status {status}")]
    UnexpectedStatus { peer: String, status: u16 },

    #[error("Malformed payload from {peer}: {reason}")]
    Decode { peer: String, reason: String },
}

/// How a peer answered a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastStatus {
    Accepted,
    /// The peer refused the payload as invalid
    Declined,
    /// The peer's chain disagrees with ours and needs resolving
    Conflict,
}

impl BroadcastStatus {
    /// Maps an HTTP status code onto a broadcast outcome
    pub fn from_http(status: u16) -> Self {
        match status {
            409 => BroadcastStatus::Conflict,
            400..=599 => BroadcastStatus::Declined,
            _ => BroadcastStatus::Accepted,
        }
    }
}

/// Network capability the ledger uses to reach its peers.
///
/// Implementations must decode peer chains into typed blocks; malformed data
/// is reported as [`TransportError::Decode`] and never reaches the ledger.
pub trait Transport: Send + Sync {
    fn broadcast_transaction(
        &self,
        peer: &str,
        transaction: &Transaction,
    ) -> Result<BroadcastStatus, TransportError>;

    fn broadcast_block(&self, peer: &str, block: &Block) -> Result<BroadcastStatus, TransportError>;

    fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, TransportError>;
}
