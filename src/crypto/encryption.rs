//! AES-256-GCM encryption/decryption.
//!
//! AES-GCM is an AEAD cipher: it provides both confidentiality and integrity.
//! - Nonce 96-bit (12 bytes), MUST be unique per message under the same key
//! - Tag 128-bit (16 bytes) for authentication

use super::key_derivation::KEY_LEN;
use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};

/// Nonce length (bytes) - 96 bits
pub const NONCE_LEN: usize = 12;

/// Authentication tag length (bytes) - 128 bits
pub const TAG_LEN: usize = 16;

/// Encrypts/decrypts with an already derived key
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Encrypt with a random nonce.
    /// Returns: nonce (12 bytes) || ciphertext (plaintext + 16 bytes tag)
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| Error::Encryption(format!("Encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt `nonce || ciphertext`
    pub fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>> {
        if encrypted.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::Encryption("Encrypted data too short".to_string()));
        }

        let nonce = Nonce::from_slice(&encrypted[..NONCE_LEN]);
        self.cipher
            .decrypt(nonce, &encrypted[NONCE_LEN..])
            .map_err(|_| {
                Error::Encryption("Decryption failed (wrong passphrase or corrupted data)".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        for (i, b) in key.iter_mut().enumerate() {
            *b = i as u8;
        }
        key
    }

    #[test]
    fn test_encrypted_size() -> Result<()> {
        let encryptor = Encryptor::new(&test_key());
        let encrypted = encryptor.encrypt(b"test")?;
        assert_eq!(encrypted.len(), NONCE_LEN + 4 + TAG_LEN);
        assert_eq!(encryptor.decrypt(&encrypted)?, b"test");
        Ok(())
    }

    #[test]
    fn test_different_nonce_each_time() -> Result<()> {
        let encryptor = Encryptor::new(&test_key());
        assert_ne!(
            encryptor.encrypt(b"same message")?,
            encryptor.encrypt(b"same message")?
        );
        Ok(())
    }

    #[test]
    fn test_wrong_key_fails() -> Result<()> {
        let encrypted = Encryptor::new(&test_key()).encrypt(b"secret message")?;
        let result = Encryptor::new(&[1u8; KEY_LEN]).decrypt(&encrypted);
        assert!(matches!(result, Err(Error::Encryption(_))));
        Ok(())
    }

    #[test]
    fn test_tampered_data_fails() -> Result<()> {
        let encryptor = Encryptor::new(&test_key());
        let mut encrypted = encryptor.encrypt(b"secret message")?;
        if let Some(byte) = encrypted.last_mut() {
            *byte ^= 0xFF;
        }
        assert!(encryptor.decrypt(&encrypted).is_err());
        Ok(())
    }
}
