use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::crypto::{Address, DigitalSignature};

/// Sender identity used for the miner's reward transaction
pub const REWARD_SENDER: &str = "MINING";

/// Flat amount credited to the miner of each block
pub const MINING_REWARD: f64 = 10.0;

/// Represents a value transfer in the blockchain
///
/// Field order is part of the canonical form: blocks and proofs hash the
/// serialized transaction, so reordering fields changes every hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address, or `MINING` for a reward
    #[schema(value_type = String)]
    pub sender: Address,

    /// Recipient's address
    #[schema(value_type = String)]
    pub recipient: Address,

    /// Signature over sender, recipient and amount
    #[schema(value_type = String)]
    pub signature: DigitalSignature,

    /// Amount being transferred
    pub amount: f64,
}

impl Transaction {
    /// Creates a new signed transaction
    pub fn new(
        sender: Address,
        recipient: Address,
        signature: DigitalSignature,
        amount: f64,
    ) -> Self {
        Transaction {
            sender,
            recipient,
            signature,
            amount,
        }
    }

    /// Creates a reward transaction crediting `recipient`
    pub fn new_reward(recipient: Address, amount: f64) -> Self {
        Transaction {
            sender: Address(REWARD_SENDER.to_string()),
            recipient,
            signature: DigitalSignature::default(),
            amount,
        }
    }

    /// Checks if the transaction is a mining reward
    pub fn is_reward(&self) -> bool {
        self.sender.0 == REWARD_SENDER
    }

    /// The bytes a sender signs for this transfer
    pub fn signing_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        Self::payload_for(&self.sender, &self.recipient, self.amount)
    }

    pub(crate) fn payload_for(
        sender: &Address,
        recipient: &Address,
        amount: f64,
    ) -> Result<Vec<u8>, serde_json::Error> {
        let data = serde_json::json!({
            "sender": sender.0,
            "recipient": recipient.0,
            "amount": amount,
        });

        serde_json::to_vec(&data)
    }
}
