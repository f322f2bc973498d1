//! Error types for secret encryption

use thiserror::Error;

/// Secret codec errors
#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Random generation failed")]
    RandomGenerationFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Malformed ciphertext: {0}")]
    Malformed(String),

    #[error("Decryption failed: wrong key or tampered ciphertext")]
    DecryptionFailed,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
