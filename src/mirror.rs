//! Mirror syncer - keeps `mirror_root/<basename>` identical to a source folder.
//!
//! Strategy is full replace: when the fingerprints differ the stale copy is
//! dropped and the whole source tree is copied in again. The new copy is
//! built in `<mirror_root>.staging/`, a sibling of the mirror outside its
//! working tree, and renamed into place. The mirror never holds a
//! half-copied folder, and a leftover from a crash can never be committed.
//!
//! Nested `.git` entries in a source are neither copied nor fingerprinted.

use crate::error::{Error, IoResultExt, Result};
use crate::fingerprint::{fingerprint, is_nested_git, walk_error};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const STAGING_SUFFIX: &str = "staging";

/// Top-level names a source folder may not take over in the mirror.
const RESERVED_NAMES: &[&str] = &[".git", crate::system_files::SYSTEM_CONFIG_DIR];

/// Result of syncing one folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Mirror copy was missing or stale and has been replaced
    Changed,
    /// Fingerprints matched, nothing was written
    Unchanged,
}

/// Where the mirror copy of `source` lives.
pub fn mirror_target(source: &Path, mirror_root: &Path) -> Result<PathBuf> {
    let name = source.file_name().ok_or_else(|| Error::InvalidSource {
        path: source.to_path_buf(),
        reason: "path has no final component".to_string(),
    })?;

    let name_str = name.to_string_lossy();
    if RESERVED_NAMES.contains(&name_str.as_ref()) {
        return Err(Error::InvalidSource {
            path: source.to_path_buf(),
            reason: format!("'{}' is reserved inside the mirror", name_str),
        });
    }

    Ok(mirror_root.join(name))
}

/// `<mirror_root>.staging`, next to the lock file
pub fn staging_root(mirror_root: &Path) -> PathBuf {
    let mut name = mirror_root.as_os_str().to_os_string();
    name.push(".");
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

/// Sync one source folder into the mirror.
pub fn sync(source: &Path, mirror_root: &Path) -> Result<SyncOutcome> {
    let target = mirror_target(source, mirror_root)?;
    check_disjoint(source, mirror_root)?;

    let source_print = fingerprint(source)?;
    if target.is_dir() {
        let mirror_print = fingerprint(&target)?;
        if mirror_print == source_print {
            debug!("{} unchanged ({})", source.display(), source_print);
            return Ok(SyncOutcome::Unchanged);
        }
    }

    info!("{} changed, replacing mirror copy", source.display());
    replace(source, &target, &staging_root(mirror_root))?;
    Ok(SyncOutcome::Changed)
}

/// A source that contains the mirror would be copied into itself; one inside
/// the mirror would be synced onto its own tree.
fn check_disjoint(source: &Path, mirror_root: &Path) -> Result<()> {
    let source_real = source.canonicalize().at_path(source)?;
    let mirror_real = resolve(mirror_root)?;

    let reason = if mirror_real.starts_with(&source_real) {
        "contains the mirror repository"
    } else if source_real.starts_with(&mirror_real) {
        "is inside the mirror repository"
    } else {
        return Ok(());
    };
    Err(Error::InvalidSource {
        path: source.to_path_buf(),
        reason: reason.to_string(),
    })
}

/// Canonical form of a path that may not exist yet: the nearest existing
/// ancestor is canonicalized and the missing components appended.
fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).at_path(path)?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(real) => return Ok(missing.iter().rev().fold(real, |acc, part| acc.join(part))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name);
                        existing = parent;
                    }
                    _ => return Ok(absolute.clone()),
                }
            }
            Err(e) => return Err(Error::io(existing, e)),
        }
    }
}

fn replace(source: &Path, target: &Path, staging_root: &Path) -> Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).at_path(parent)?;
    fs::create_dir_all(staging_root).at_path(staging_root)?;

    let name = target.file_name().unwrap_or_default();
    let staging = staging_root.join(name);

    // Leftover from an interrupted run
    remove_path(&staging)?;

    if let Err(e) = copy_tree(source, &staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    remove_path(target)?;
    fs::rename(&staging, target).at_path(target)?;

    // Only succeeds once empty
    let _ = fs::remove_dir(staging_root);
    Ok(())
}

/// Copy regular files and directories. Symlinks are skipped, matching what
/// the fingerprint looks at, so a synced copy always fingerprints equal.
fn copy_tree(source: &Path, dest: &Path) -> Result<u64> {
    let mut copied = 0;

    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_nested_git(e));

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(source, e))?;

        let rel = entry
            .path()
            .strip_prefix(source)
            .unwrap_or_else(|_| entry.path());
        let out = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&out).at_path(&out)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &out).at_path(entry.path())?;
            copied += 1;
        } else {
            debug!("Skipping non-regular file {}", entry.path().display());
        }
    }

    Ok(copied)
}

fn remove_path(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).at_path(path),
        Ok(_) => fs::remove_file(path).at_path(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("docs");
        let mirror = temp.path().join("mirror");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("a.txt"), "hello").unwrap();
        fs::write(source.join("sub/b.txt"), "nested").unwrap();
        (temp, source, mirror)
    }

    fn mtime(path: &Path) -> SystemTime {
        fs::metadata(path).unwrap().modified().unwrap()
    }

    #[test]
    fn test_first_sync_copies_and_converges() -> Result<()> {
        let (_temp, source, mirror) = setup();

        assert_eq!(sync(&source, &mirror)?, SyncOutcome::Changed);
        assert_eq!(fs::read_to_string(mirror.join("docs/a.txt")).unwrap(), "hello");
        assert_eq!(fs::read_to_string(mirror.join("docs/sub/b.txt")).unwrap(), "nested");
        assert_eq!(fingerprint(&source)?, fingerprint(&mirror.join("docs"))?);
        Ok(())
    }

    #[test]
    fn test_second_sync_is_noop() -> Result<()> {
        let (_temp, source, mirror) = setup();
        sync(&source, &mirror)?;

        let copy = mirror.join("docs");
        let dir_before = mtime(&copy);
        let file_before = mtime(&copy.join("a.txt"));

        assert_eq!(sync(&source, &mirror)?, SyncOutcome::Unchanged);
        assert_eq!(mtime(&copy), dir_before);
        assert_eq!(mtime(&copy.join("a.txt")), file_before);
        Ok(())
    }

    #[test]
    fn test_stale_copy_fully_replaced() -> Result<()> {
        let (_temp, source, mirror) = setup();
        sync(&source, &mirror)?;

        fs::remove_file(source.join("sub/b.txt")).unwrap();
        fs::write(source.join("a.txt"), "hello again").unwrap();

        assert_eq!(sync(&source, &mirror)?, SyncOutcome::Changed);
        assert!(!mirror.join("docs/sub/b.txt").exists());
        assert_eq!(
            fs::read_to_string(mirror.join("docs/a.txt")).unwrap(),
            "hello again"
        );
        assert_eq!(fingerprint(&source)?, fingerprint(&mirror.join("docs"))?);

        // Staging never touches the mirror tree and is cleaned up
        let mut entries: Vec<_> = fs::read_dir(&mirror)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["docs".to_string()]);
        assert!(!staging_root(&mirror).exists());
        Ok(())
    }

    #[test]
    fn test_other_mirror_entries_untouched() -> Result<()> {
        let (_temp, source, mirror) = setup();
        fs::create_dir_all(mirror.join("other")).unwrap();
        fs::write(mirror.join("other/keep.txt"), "keep").unwrap();

        sync(&source, &mirror)?;
        assert!(mirror.join("other/keep.txt").exists());
        Ok(())
    }

    #[test]
    fn test_missing_source_fails() {
        let (temp, _source, mirror) = setup();
        let err = sync(&temp.path().join("nope"), &mirror).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(!mirror.join("nope").exists());
    }

    #[test]
    fn test_interrupted_staging_is_discarded() -> Result<()> {
        let (_temp, source, mirror) = setup();
        let leftover = staging_root(&mirror).join("docs");
        fs::create_dir_all(&leftover).unwrap();
        fs::write(leftover.join("half.txt"), "partial").unwrap();

        sync(&source, &mirror)?;
        assert!(!mirror.join("docs/half.txt").exists());
        assert!(!staging_root(&mirror).exists());
        Ok(())
    }

    #[test]
    fn test_nested_git_not_copied() -> Result<()> {
        let (_temp, source, mirror) = setup();
        fs::create_dir_all(source.join(".git/refs")).unwrap();
        fs::write(source.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(source.join("sub/.git"), "gitdir: ../.git/modules/sub\n").unwrap();

        assert_eq!(sync(&source, &mirror)?, SyncOutcome::Changed);
        assert!(mirror.join("docs/a.txt").exists());
        assert!(!mirror.join("docs/.git").exists());
        assert!(!mirror.join("docs/sub/.git").exists());

        // Repository activity alone does not count as a change
        fs::write(source.join(".git/HEAD"), "ref: refs/heads/other\n").unwrap();
        assert_eq!(sync(&source, &mirror)?, SyncOutcome::Unchanged);
        Ok(())
    }

    #[test]
    fn test_source_containing_mirror_rejected() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        fs::create_dir_all(&home).unwrap();
        fs::write(home.join("notes.txt"), "notes").unwrap();
        let mirror = home.join(".autostash/mirror");

        let err = sync(&home, &mirror).unwrap_err();
        match err {
            Error::InvalidSource { reason, .. } => assert!(reason.contains("contains the mirror")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!mirror.exists());
        assert!(!staging_root(&mirror).exists());

        // Same answer once the mirror exists, reached through another spelling
        fs::create_dir_all(&mirror).unwrap();
        let dotted = home.join(".autostash/../.autostash/mirror");
        assert!(matches!(sync(&home, &dotted), Err(Error::InvalidSource { .. })));
    }

    #[test]
    fn test_source_inside_mirror_rejected() {
        let temp = TempDir::new().unwrap();
        let mirror = temp.path().join("mirror");
        let inner = mirror.join("old/docs");
        fs::create_dir_all(&inner).unwrap();
        fs::write(inner.join("a.txt"), "hello").unwrap();

        let err = sync(&inner, &mirror).unwrap_err();
        assert!(matches!(err, Error::InvalidSource { .. }));
        assert!(!mirror.join("docs").exists());
    }

    #[test]
    fn test_reserved_name_rejected() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join(".git");
        fs::create_dir_all(&source).unwrap();

        let err = sync(&source, &temp.path().join("mirror")).unwrap_err();
        assert!(matches!(err, Error::InvalidSource { .. }));
    }
}
