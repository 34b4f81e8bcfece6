// Copyright 2025 Assistance Micro Design
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Encryption-at-rest for sensitive credential store fields.
//!
//! Adapted from the desktop build's OS-keychain-backed key store: the
//! same AES-256-GCM construction, but keyed off a single server-wide
//! master key (see [`crate::config::CryptoConfig`]) instead of a
//! per-secret OS keychain entry, since this runtime has no desktop
//! session to anchor a keychain to.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// Errors raised while encrypting or decrypting credential store values.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The master key is not 32 bytes once decoded.
    #[error("master key must decode to exactly 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    /// The master key is not valid base64.
    #[error("master key is not valid base64: {0}")]
    InvalidKeyEncoding(String),
    /// The ciphertext is shorter than one nonce, so it cannot be ours.
    #[error("ciphertext too short to contain a nonce")]
    Truncated,
    /// The ciphertext failed authentication (wrong key, tampered data).
    #[error("decryption failed: ciphertext authentication failed")]
    DecryptionFailed,
    /// Underlying AEAD encryption failure (key setup, RNG exhaustion).
    #[error("encryption failed")]
    EncryptionFailed,
}

/// A server-wide AES-256-GCM cipher used to seal sensitive fields
/// (access tokens, refresh tokens, client secrets) before they reach the
/// credential store, and open them again on read.
#[derive(Clone)]
pub struct MasterCipher {
    cipher: Aes256Gcm,
}

impl MasterCipher {
    /// Builds a cipher from a base64-encoded 32-byte master key, e.g. the
    /// value of `CONNECTOR_MASTER_KEY`.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        Self::from_raw_key(&raw)
    }

    /// Builds a cipher from raw key bytes (must be exactly 32 bytes).
    pub fn from_raw_key(raw: &[u8]) -> Result<Self, CryptoError> {
        if raw.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(raw.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(raw);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Generates a fresh random 32-byte master key, base64-encoded. Used
    /// for the local-development generate-on-first-run fallback; never
    /// called in a path that expects durability across restarts.
    pub fn generate_base64_key() -> String {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        BASE64.encode(raw)
    }

    /// Encrypts `plaintext`, returning a base64 string of `nonce ||
    /// ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Decrypts a value produced by [`MasterCipher::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        if raw.len() < NONCE_LEN {
            return Err(CryptoError::Truncated);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> MasterCipher {
        MasterCipher::from_base64_key(&MasterCipher::generate_base64_key()).unwrap()
    }

    #[test]
    fn round_trips_plaintext() {
        let cipher = test_cipher();
        let ciphertext = cipher.encrypt("super-secret-access-token").unwrap();
        assert_ne!(ciphertext, "super-secret-access-token");
        let plaintext = cipher.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, "super-secret-access-token");
    }

    #[test]
    fn rejects_wrong_key_length() {
        let err = MasterCipher::from_raw_key(&[0u8; 16]).unwrap_err();
        matches!(err, CryptoError::InvalidKeyLength(16));
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = test_cipher();
        let mut ciphertext = cipher.encrypt("value").unwrap();
        ciphertext.push('A');
        assert!(cipher.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn different_keys_cannot_decrypt_each_other() {
        let cipher_a = test_cipher();
        let cipher_b = test_cipher();
        let ciphertext = cipher_a.encrypt("value").unwrap();
        assert!(cipher_b.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same input").unwrap();
        let b = cipher.encrypt("same input").unwrap();
        assert_ne!(a, b);
    }
}
