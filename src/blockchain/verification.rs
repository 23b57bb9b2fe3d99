//! Proof-of-work search and block/chain validation.

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::block::{hash_block, Block};
use super::crypto::SignatureVerifier;
use super::transaction::{Transaction, MINING_REWARD};

/// Hex prefix a proof hash must start with
pub const DIFFICULTY_PREFIX: &str = "00";

/// Reasons a block fails validation against its predecessor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidBlock {
    #[error("index {found} does not follow tail index {expected}")]
    WrongIndex { expected: u64, found: u64 },

    #[error("previous hash {declared} does not match tail hash {expected}")]
    BrokenLink { declared: String, expected: String },

    #[error("proof {0} does not satisfy the difficulty")]
    InvalidProof(u64),

    #[error("transaction {0} carries an invalid signature")]
    InvalidSignature(usize),

    #[error("block does not end with a reward transaction")]
    MissingReward,
}

/// Checks whether `proof` solves the puzzle for `transactions` on top of `last_hash`
pub fn valid_proof(transactions: &[Transaction], last_hash: &str, proof: u64) -> bool {
    let serialized = match serde_json::to_string(transactions) {
        Ok(serialized) => serialized,
        Err(_) => return false,
    };
    let guess = format!("{}{}{}", serialized, last_hash, proof);

    let mut hasher = Sha256::new();
    hasher.update(guess.as_bytes());
    hex::encode(hasher.finalize()).starts_with(DIFFICULTY_PREFIX)
}

/// Searches proofs upward from zero until one is valid
pub fn proof_of_work(transactions: &[Transaction], last_hash: &str) -> u64 {
    let mut proof = 0;
    while !valid_proof(transactions, last_hash, proof) {
        proof += 1;
    }
    proof
}

/// Like [`proof_of_work`] but gives up after `max_iterations` candidates
pub fn proof_of_work_bounded(
    transactions: &[Transaction],
    last_hash: &str,
    max_iterations: u64,
) -> Option<u64> {
    (0..max_iterations).find(|&proof| valid_proof(transactions, last_hash, proof))
}

/// Validates `block` as the successor of `previous`.
///
/// Every transaction but the last must be signed by its sender; the last must
/// be the miner's reward, which is left out of the proof.
pub fn validate_block(
    block: &Block,
    previous: &Block,
    verifier: &dyn SignatureVerifier,
) -> Result<(), InvalidBlock> {
    let (reward, body) = block
        .transactions
        .split_last()
        .ok_or(InvalidBlock::MissingReward)?;

    if !valid_proof(body, &block.previous_hash, block.proof) {
        return Err(InvalidBlock::InvalidProof(block.proof));
    }

    if block.index != previous.index + 1 {
        return Err(InvalidBlock::WrongIndex {
            expected: previous.index + 1,
            found: block.index,
        });
    }

    let expected_previous_hash = hash_block(previous);
    if block.previous_hash != expected_previous_hash {
        return Err(InvalidBlock::BrokenLink {
            declared: block.previous_hash.clone(),
            expected: expected_previous_hash,
        });
    }

    if let Some(position) = body.iter().position(|tx| !verifier.verify(tx)) {
        return Err(InvalidBlock::InvalidSignature(position));
    }

    if !reward.is_reward() || reward.amount != MINING_REWARD {
        return Err(InvalidBlock::MissingReward);
    }

    Ok(())
}

/// Validates a whole chain. Any failure anywhere rejects the chain.
///
/// The first block must be this network's genesis block exactly.
pub fn is_chain_valid(chain: &[Block], verifier: &dyn SignatureVerifier) -> bool {
    match chain.first() {
        Some(first) if *first == Block::genesis() => {}
        Some(_) => {
            log::debug!("Chain rejected: first block is not the genesis block");
            return false;
        }
        None => return false,
    }

    chain.windows(2).all(|pair| {
        let (previous, current) = (&pair[0], &pair[1]);
        match validate_block(current, previous, verifier) {
            Ok(()) => true,
            Err(reason) => {
                log::debug!("Block {} rejected: {}", current.index, reason);
                false
            }
        }
    })
}
