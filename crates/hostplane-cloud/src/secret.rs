//! Encryption of stored database passwords
//!
//! AES-256-GCM with a random 96-bit nonce per message. Stored form is
//! `base64(nonce || ciphertext)`.

use crate::error::{CloudError, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretCipher(****)")
    }
}

impl SecretCipher {
    /// Cipher from a base64-encoded 32-byte key
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CloudError::Secret(format!("encryption key is not valid base64: {}", e)))?;
        if key.len() != KEY_LEN {
            return Err(CloudError::Secret(format!(
                "encryption key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CloudError::Secret(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Fresh random key, base64-encoded
    pub fn generate_key() -> String {
        STANDARD.encode(Aes256Gcm::generate_key(OsRng))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CloudError::Secret("encryption failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CloudError::Secret(format!("ciphertext is not valid base64: {}", e)))?;
        if data.len() <= NONCE_LEN {
            return Err(CloudError::Secret("ciphertext is too short".into()));
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CloudError::Secret("decryption failed: wrong key or tampered data".into()))?;

        String::from_utf8(plaintext).map_err(|e| CloudError::Secret(e.to_string()))
    }
}
