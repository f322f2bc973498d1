//! Secret codec for upstream credentials
//!
//! This crate encrypts access tokens and other small secrets before
//! they are handed to persistence, and decrypts them on the way back.
//! Decryption never fails loudly unless the caller asks for the error.

pub mod codec;
pub mod errors;

// Re-export centralized config
pub use config::SecretConfig;

pub use codec::{PBKDF2_ROUNDS, SALT_LEN, SecretCodec};
pub use errors::SecretError;
