//! Symmetric encryption for credentials at rest
//!
//! Ciphertexts are URL-safe base64 over `version || nonce || sealed`,
//! where `sealed` is the AES-256-GCM output with its tag. Everything
//! needed to decrypt besides the key travels inside the string.

use crate::errors::SecretError;
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use config::SecretConfig;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::{Map, Value};
use std::num::NonZeroU32;
use zeroize::Zeroize;

const FORMAT_VERSION: u8 = 1;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

/// PBKDF2-HMAC-SHA256 rounds for password-derived keys
pub const PBKDF2_ROUNDS: u32 = 480_000;

/// Length of a generated salt
pub const SALT_LEN: usize = 16;

/// Encrypts and decrypts small secrets with one fixed key
pub struct SecretCodec {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCodec")
            .field("algorithm", &"AES-256-GCM")
            .finish_non_exhaustive()
    }
}

impl SecretCodec {
    /// Build a codec from a URL-safe base64 key (padded or not)
    pub fn from_key(encoded: &str) -> Result<Self, SecretError> {
        let mut bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim().trim_end_matches('='))
            .map_err(|e| SecretError::InvalidKey(format!("not url-safe base64: {}", e)))?;
        let codec = Self::from_key_bytes(&bytes);
        bytes.zeroize();
        codec
    }

    /// Build a codec from raw key bytes
    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self, SecretError> {
        if bytes.len() != KEY_LEN {
            return Err(SecretError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }

        let unbound = UnboundKey::new(&AES_256_GCM, bytes)
            .map_err(|_| SecretError::InvalidKey("rejected by cipher".to_string()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Generate a fresh random key, URL-safe base64 encoded
    pub fn generate_key() -> Result<String, SecretError> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| SecretError::RandomGenerationFailed)?;
        let encoded = URL_SAFE.encode(bytes);
        bytes.zeroize();
        Ok(encoded)
    }

    /// Build a codec from configuration, generating a throwaway key if none is set
    pub fn from_config(config: &SecretConfig) -> Result<Self, SecretError> {
        match config.encryption_key.as_deref() {
            Some(key) => Self::from_key(key),
            None => {
                tracing::warn!(
                    "ENCRYPTION_KEY not set, using a generated key; secrets will not survive a restart"
                );
                Self::from_key(&Self::generate_key()?)
            }
        }
    }

    /// Derive a codec from a password with PBKDF2.
    ///
    /// A random salt is generated when `salt` is `None`. The salt used is
    /// returned so the same codec can be derived again later.
    pub fn derive_key_from_password(
        password: &str,
        salt: Option<&[u8]>,
    ) -> Result<(Self, Vec<u8>), SecretError> {
        Self::derive_with_rounds(password, salt, PBKDF2_ROUNDS)
    }

    pub(crate) fn derive_with_rounds(
        password: &str,
        salt: Option<&[u8]>,
        rounds: u32,
    ) -> Result<(Self, Vec<u8>), SecretError> {
        let rounds = NonZeroU32::new(rounds)
            .ok_or_else(|| SecretError::InvalidKey("zero PBKDF2 rounds".to_string()))?;

        let salt = match salt {
            Some(salt) => salt.to_vec(),
            None => {
                let mut salt = vec![0u8; SALT_LEN];
                SystemRandom::new()
                    .fill(&mut salt)
                    .map_err(|_| SecretError::RandomGenerationFailed)?;
                salt
            }
        };

        let mut key = [0u8; KEY_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            rounds,
            &salt,
            password.as_bytes(),
            &mut key,
        );
        let codec = Self::from_key_bytes(&key);
        key.zeroize();

        Ok((codec?, salt))
    }

    /// Encrypt a string; the empty string stays empty
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| SecretError::RandomGenerationFailed)?;

        let mut sealed = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut sealed)
            .map_err(|_| SecretError::EncryptionFailed)?;

        let mut framed = Vec::with_capacity(1 + NONCE_LEN + sealed.len());
        framed.push(FORMAT_VERSION);
        framed.extend_from_slice(&nonce);
        framed.extend_from_slice(&sealed);
        Ok(URL_SAFE.encode(framed))
    }

    /// Decrypt a string; anything that does not decrypt cleanly yields `""`
    pub fn decrypt(&self, ciphertext: &str) -> String {
        self.try_decrypt(ciphertext).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discarding undecryptable secret");
            String::new()
        })
    }

    /// Decrypt a string, reporting why it failed
    pub fn try_decrypt(&self, ciphertext: &str) -> Result<String, SecretError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }

        let mut framed = URL_SAFE_NO_PAD
            .decode(ciphertext.trim().trim_end_matches('='))
            .map_err(|e| SecretError::Malformed(format!("not url-safe base64: {}", e)))?;

        if framed.len() < 1 + NONCE_LEN + TAG_LEN {
            return Err(SecretError::Malformed(format!("too short: {} bytes", framed.len())));
        }
        if framed[0] != FORMAT_VERSION {
            return Err(SecretError::Malformed(format!("unknown version {}", framed[0])));
        }

        let nonce = Nonce::try_assume_unique_for_key(&framed[1..1 + NONCE_LEN])
            .map_err(|_| SecretError::Malformed("bad nonce".to_string()))?;
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut framed[1 + NONCE_LEN..])
            .map_err(|_| SecretError::DecryptionFailed)?;

        let result = String::from_utf8(plaintext.to_vec())
            .map_err(|_| SecretError::Malformed("plaintext is not UTF-8".to_string()));
        framed.zeroize();
        result
    }

    /// Encrypt a JSON object
    pub fn encrypt_structured(&self, data: &Map<String, Value>) -> Result<String, SecretError> {
        self.encrypt(&serde_json::to_string(data)?)
    }

    /// Decrypt a JSON object; anything unusable yields an empty map
    pub fn decrypt_structured(&self, ciphertext: &str) -> Map<String, Value> {
        let plaintext = self.decrypt(ciphertext);
        if plaintext.is_empty() {
            return Map::new();
        }

        match serde_json::from_str::<Value>(&plaintext) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                tracing::warn!("decrypted secret is not a JSON object");
                Map::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "decrypted secret is not valid JSON");
                Map::new()
            }
        }
    }
}
