//! Encrypted bundle of the mirror working tree.
//!
//! File format:
//! ```text
//! AUTOSTASH_V1 (12 bytes) | salt (16) | nonce (12) | ciphertext + tag
//! ```
//! The plaintext is a gzip-compressed tar of the mirror without `.git`.

use super::encryption::Encryptor;
use super::key_derivation::{derive_key, generate_salt, SALT_LEN};
use crate::error::{Error, IoResultExt, Result};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Magic header identifying the bundle format
pub const MAGIC_HEADER: &[u8; 12] = b"AUTOSTASH_V1";

/// File name of the bundle inside the bundle directory
pub const BUNDLE_FILE_NAME: &str = "autostash-bundle.tar.gz.enc";

/// Archive `mirror` (minus `.git`), encrypt it with `passphrase` and write
/// it to `bundle_dir`. Returns the bundle path.
pub fn encrypt_mirror(mirror: &Path, bundle_dir: &Path, passphrase: &str) -> Result<PathBuf> {
    let archive = archive_tree(mirror)?;
    debug!("Archived {} into {} bytes", mirror.display(), archive.len());

    let salt = generate_salt();
    let key = derive_key(passphrase, &salt)?;
    let sealed = Encryptor::new(&key).encrypt(&archive)?;

    let mut output = Vec::with_capacity(MAGIC_HEADER.len() + SALT_LEN + sealed.len());
    output.extend_from_slice(MAGIC_HEADER);
    output.extend_from_slice(&salt);
    output.extend_from_slice(&sealed);

    fs::create_dir_all(bundle_dir).at_path(bundle_dir)?;
    let bundle = bundle_dir.join(BUNDLE_FILE_NAME);
    let tmp = bundle_dir.join(format!("{}.tmp", BUNDLE_FILE_NAME));
    fs::write(&tmp, &output).at_path(&tmp)?;
    fs::rename(&tmp, &bundle).at_path(&bundle)?;

    info!("Encrypted bundle written to {}", bundle.display());
    Ok(bundle)
}

/// Decrypt `bundle` with `passphrase` and unpack the tree into `out_dir`.
pub fn decrypt_bundle(bundle: &Path, passphrase: &str, out_dir: &Path) -> Result<()> {
    let data = fs::read(bundle).at_path(bundle)?;

    let header_len = MAGIC_HEADER.len() + SALT_LEN;
    if data.len() < header_len || &data[..MAGIC_HEADER.len()] != MAGIC_HEADER {
        return Err(Error::Encryption(format!(
            "{} is not an AutoStash bundle",
            bundle.display()
        )));
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&data[MAGIC_HEADER.len()..header_len]);
    let key = derive_key(passphrase, &salt)?;
    let archive = Encryptor::new(&key).decrypt(&data[header_len..])?;

    fs::create_dir_all(out_dir).at_path(out_dir)?;
    tar::Archive::new(GzDecoder::new(archive.as_slice()))
        .unpack(out_dir)
        .at_path(out_dir)?;

    info!("Bundle unpacked into {}", out_dir.display());
    Ok(())
}

/// tar.gz of `root` in memory, `.git` excluded, symlinks skipped
fn archive_tree(root: &Path) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == ".git"));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io(path, e.into())
        })?;
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder.append_dir(rel, path).at_path(path)?;
        } else if file_type.is_file() {
            builder.append_path_with_name(path, rel).at_path(path)?;
        }
    }

    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .at_path(root)
}
