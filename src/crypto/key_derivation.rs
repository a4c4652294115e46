//! Key derivation with Argon2id.
//!
//! Argon2id combines Argon2i (side-channel resistance) and Argon2d (GPU
//! cracking resistance) and is the recommended choice for passphrases.

use crate::error::{Error, Result};
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, Params,
};
use rand::{rngs::OsRng, RngCore};

/// Salt length (bytes)
pub const SALT_LEN: usize = 16;

/// Key length (bytes) - 256 bits for AES-256
pub const KEY_LEN: usize = 32;

/// Argon2id parameters
/// - Memory: 64 MiB
/// - Iterations: 3
/// - Parallelism: 4
const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

fn crypto_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Encryption(format!("{}: {}", context, e))
}

/// Derive a 32-byte key from `passphrase` and a 16-byte salt.
pub fn derive_key(passphrase: &str, salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN]> {
    if passphrase.is_empty() {
        return Err(Error::Encryption("Passphrase must not be empty".to_string()));
    }

    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(KEY_LEN),
    )
    .map_err(|e| crypto_err("Invalid Argon2 parameters", e))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let salt_string =
        SaltString::encode_b64(salt).map_err(|e| crypto_err("Cannot encode salt for Argon2", e))?;

    let password_hash = argon2
        .hash_password(passphrase.as_bytes(), &salt_string)
        .map_err(|e| crypto_err("Cannot derive key from passphrase", e))?;

    let hash_output = password_hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output from Argon2".to_string()))?;

    let hash_bytes = hash_output.as_bytes();
    if hash_bytes.len() < KEY_LEN {
        return Err(Error::Encryption("Argon2 hash output too short".to_string()));
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&hash_bytes[..KEY_LEN]);

    Ok(key)
}

/// Random salt for a new bundle
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}
