use ed25519_dalek::{Signature, SigningKey, Signer, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

use super::transaction::Transaction;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Represents a participant identity (public key in base58 format)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let bytes = public_key.as_bytes();
        let encoded = bs58::encode(bytes).into_string();
        Address(encoded)
    }

    /// Converts the address to a public key
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        VerifyingKey::from_bytes(&bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key bytes".to_string())
        })?)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a digital signature (base58 encoded, empty for reward transactions)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a new digital signature from a signature
    pub fn from_signature(signature: &Signature) -> Self {
        let bytes = signature.to_bytes();
        let encoded = bs58::encode(bytes).into_string();
        DigitalSignature(encoded)
    }

    /// Converts the digital signature to a signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature("Invalid signature length".to_string())
        })?;

        Ok(Signature::from_bytes(&signature_bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Capability to check a transaction's signature against its declared sender.
///
/// The ledger consumes this through a trait object so nodes and tests can
/// swap the scheme without touching consensus code.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, transaction: &Transaction) -> bool;
}

/// ed25519 verifier: the sender address is the bs58 public key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, transaction: &Transaction) -> bool {
        if transaction.is_reward() || transaction.signature.is_empty() {
            return false;
        }

        let public_key = match transaction.sender.to_public_key() {
            Ok(key) => key,
            Err(_) => return false,
        };

        let message = match transaction.signing_payload() {
            Ok(message) => message,
            Err(_) => return false,
        };

        verify_signature(&message, &transaction.signature, &public_key).unwrap_or(false)
    }
}

/// Represents a wallet with a keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self::from_signing_key(signing_key)
    }

    /// Creates a wallet from an existing secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_array: [u8; 32] = secret_key_bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes_array)))
    }

    /// Creates a wallet from a hex encoded secret key
    pub fn from_secret_hex(secret_key_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(secret_key_hex.trim())
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;
        Self::from_secret_key(&bytes)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_public_key(&signing_key.verifying_key());
        Wallet { signing_key, address }
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Signs a message with the wallet's private key
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        let signature = self.signing_key.sign(message);
        DigitalSignature::from_signature(&signature)
    }

    /// Signs a transfer from this wallet to `recipient`
    pub fn sign_transaction(
        &self,
        recipient: &Address,
        amount: f64,
    ) -> Result<DigitalSignature, CryptoError> {
        let message = Transaction::payload_for(&self.address, recipient, amount)
            .map_err(|e| CryptoError::EncodingError(e.to_string()))?;
        Ok(self.sign(&message))
    }

    /// Exports the wallet's secret key as bytes
    pub fn export_secret_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifies a signature against a message and public key
pub fn verify_signature(
    message: &[u8],
    signature: &DigitalSignature,
    public_key: &VerifyingKey,
) -> Result<bool, CryptoError> {
    let signature = signature.to_signature()?;

    match public_key.verify(message, &signature) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_and_verification() {
        let wallet = Wallet::new();
        let message = b"Hello, world!";

        let signature = wallet.sign(message);
        let public_key = wallet.address().to_public_key().unwrap();

        let result = verify_signature(message, &signature, &public_key).unwrap();
        assert!(result);

        let wrong_message = b"Wrong message";
        let result = verify_signature(wrong_message, &signature, &public_key).unwrap();
        assert!(!result);
    }

    #[test]
    fn test_address_conversion() {
        let wallet = Wallet::new();
        let public_key = wallet.address().to_public_key().unwrap();

        assert_eq!(Address::from_public_key(&public_key), *wallet.address());
        assert!(Address("not-base58-0OIl".to_string()).to_public_key().is_err());
    }

    #[test]
    fn test_secret_hex_round_trip() {
        let wallet = Wallet::new();
        let restored = Wallet::from_secret_hex(&hex::encode(wallet.export_secret_key())).unwrap();

        assert_eq!(restored.address(), wallet.address());
        assert!(Wallet::from_secret_hex("abcd").is_err());
    }

    #[test]
    fn test_verifier_accepts_signed_transfer() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let signature = sender.sign_transaction(recipient.address(), 2.5).unwrap();
        let tx = Transaction::new(sender.address().clone(), recipient.address().clone(), signature, 2.5);

        assert!(Ed25519Verifier.verify(&tx));
    }

    #[test]
    fn test_verifier_rejects_forgeries() {
        let sender = Wallet::new();
        let thief = Wallet::new();
        let recipient = Wallet::new();

        // Signed by someone other than the declared sender
        let signature = thief.sign_transaction(recipient.address(), 2.5).unwrap();
        let forged = Transaction::new(sender.address().clone(), recipient.address().clone(), signature, 2.5);
        assert!(!Ed25519Verifier.verify(&forged));

        // Amount altered after signing
        let signature = sender.sign_transaction(recipient.address(), 2.5).unwrap();
        let altered = Transaction::new(sender.address().clone(), recipient.address().clone(), signature, 25.0);
        assert!(!Ed25519Verifier.verify(&altered));

        let reward = Transaction::new_reward(recipient.address().clone(), 10.0);
        assert!(!Ed25519Verifier.verify(&reward));

        let garbage = Transaction::new(
            Address("not-a-key".to_string()),
            recipient.address().clone(),
            DigitalSignature("also-not-a-signature".to_string()),
            1.0,
        );
        assert!(!Ed25519Verifier.verify(&garbage));
    }
}
