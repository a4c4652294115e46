//! Directory fingerprint - SHA-256 over a directory tree's file contents.
//!
//! Used only to decide whether a mirror copy must be replaced. It is an
//! efficiency heuristic, not a guarantee against deliberately crafted
//! collisions.
//!
//! The walk is sorted by file name at every level, so the digest does not
//! depend on the order the filesystem returns entries in. Per file the hasher
//! sees: relative path (with `/` separators), a NUL byte, the file length and
//! then the bytes, streamed in chunks. Symlinks, empty directories,
//! metadata (permissions, mtimes) and nested `.git` entries are ignored.

use crate::error::{Error, IoResultExt, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

const READ_CHUNK: usize = 64 * 1024;

/// Digest summarizing a directory's recursive contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectoryFingerprint([u8; 32]);

impl DirectoryFingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for DirectoryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Compute the fingerprint of `path`.
///
/// Fails with [`Error::Io`] if the directory or any file below it cannot be
/// read.
pub fn fingerprint(path: &Path) -> Result<DirectoryFingerprint> {
    let meta = std::fs::metadata(path).at_path(path)?;
    if !meta.is_dir() {
        return Err(Error::InvalidSource {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];

    let walker = WalkDir::new(path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_nested_git(e));

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(path, e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(path)
            .unwrap_or_else(|_| entry.path());
        let rel_name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let mut file = File::open(entry.path()).at_path(entry.path())?;
        let len = file.metadata().at_path(entry.path())?.len();

        hasher.update(rel_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(len.to_le_bytes());

        loop {
            let n = file.read(&mut buf).at_path(entry.path())?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }

    Ok(DirectoryFingerprint(hasher.finalize().into()))
}

/// A `.git` directory or gitfile below the walk root. The mirror is itself a
/// repository, so a source's own repository metadata is never carried over.
pub(crate) fn is_nested_git(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name() == ".git"
}

pub(crate) fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
    Error::io(path, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::write(root.join("nested/b.txt"), "world").unwrap();
        fs::write(root.join("nested/deeper/c.bin"), [0u8, 1, 2, 3]).unwrap();
    }

    #[test]
    fn test_deterministic() -> Result<()> {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());

        let first = fingerprint(temp.path())?;
        let second = fingerprint(temp.path())?;
        assert_eq!(first, second);
        assert_eq!(first.to_string().len(), 64);
        Ok(())
    }

    #[test]
    fn test_same_content_in_different_roots_matches() -> Result<()> {
        let left = TempDir::new().unwrap();
        let right = TempDir::new().unwrap();
        sample_tree(left.path());
        sample_tree(right.path());

        assert_eq!(fingerprint(left.path())?, fingerprint(right.path())?);
        Ok(())
    }

    #[test]
    fn test_single_byte_change_detected() -> Result<()> {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());
        let before = fingerprint(temp.path())?;

        fs::write(temp.path().join("nested/deeper/c.bin"), [0u8, 1, 2, 4]).unwrap();
        assert_ne!(before, fingerprint(temp.path())?);
        Ok(())
    }

    #[test]
    fn test_rename_detected() -> Result<()> {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());
        let before = fingerprint(temp.path())?;

        fs::rename(temp.path().join("a.txt"), temp.path().join("z.txt")).unwrap();
        assert_ne!(before, fingerprint(temp.path())?);
        Ok(())
    }

    #[test]
    fn test_empty_dirs_and_metadata_ignored() -> Result<()> {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());
        let before = fingerprint(temp.path())?;

        fs::create_dir_all(temp.path().join("empty/also_empty")).unwrap();
        let file = fs::File::options()
            .append(true)
            .open(temp.path().join("a.txt"))
            .unwrap();
        file.set_modified(std::time::SystemTime::UNIX_EPOCH).unwrap();

        assert_eq!(before, fingerprint(temp.path())?);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_ignored() -> Result<()> {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());
        let before = fingerprint(temp.path())?;

        std::os::unix::fs::symlink(temp.path().join("a.txt"), temp.path().join("link.txt"))
            .unwrap();
        assert_eq!(before, fingerprint(temp.path())?);
        Ok(())
    }

    #[test]
    fn test_nested_repository_metadata_ignored() -> Result<()> {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());
        let before = fingerprint(temp.path())?;

        fs::create_dir_all(temp.path().join(".git/objects")).unwrap();
        fs::write(temp.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        // Submodule checkouts carry a gitfile instead
        fs::write(temp.path().join("nested/.git"), "gitdir: ../.git/modules/x\n").unwrap();
        assert_eq!(before, fingerprint(temp.path())?);

        // Only the exact name is skipped
        fs::write(temp.path().join("nested/x.git"), "data").unwrap();
        assert_ne!(before, fingerprint(temp.path())?);
        Ok(())
    }

    #[test]
    fn test_missing_path_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = fingerprint(&temp.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
