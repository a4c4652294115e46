//! Crypto module - encrypted bundles of the mirror.
//!
//! This module contains:
//! - AES-256-GCM encryption/decryption
//! - Argon2id key derivation from a passphrase
//! - The bundle format (tar.gz of the mirror, sealed with the above)

pub mod bundle;
pub mod encryption;
pub mod key_derivation;

pub use bundle::{decrypt_bundle, encrypt_mirror, BUNDLE_FILE_NAME};
pub use encryption::Encryptor;
