//! Exclusive lock around a backup run.
//!
//! The mirror working tree has a single writer. A run holds `<mirror>.lock`
//! (a sibling of the mirror, never inside the working tree) from start to
//! finish. The file is created with `create_new`, so two processes cannot both
//! win, and removed on drop, so every exit path releases it. A stale lock is
//! renamed aside before it is replaced, which keeps takeover single-winner.

use crate::error::{Error, IoResultExt, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// A lock older than this belongs to a crashed run and may be taken over.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

/// Unique owner ID: hostname + pid
fn owner_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}:{}", hostname, std::process::id())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn lock_path_for(mirror: &Path) -> PathBuf {
    let mut name = mirror
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "mirror".into());
    name.push(".lock");
    mirror.with_file_name(name)
}

/// Held lock; released when dropped.
///
/// Staleness is measured from the last [`refresh`](MirrorLock::refresh), so a
/// long run that refreshes between steps keeps its lock.
#[derive(Debug)]
pub struct MirrorLock {
    path: PathBuf,
    owner: String,
}

impl MirrorLock {
    pub fn acquire(mirror: &Path) -> Result<Self> {
        Self::acquire_with(mirror, DEFAULT_STALE_AFTER)
    }

    pub fn acquire_with(mirror: &Path, stale_after: Duration) -> Result<Self> {
        let path = lock_path_for(mirror);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).at_path(parent)?;
        }

        // Second attempt only after removing a stale lock
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let owner = owner_id();
                    writeln!(file, "{}:{}", unix_now(), owner).at_path(&path)?;
                    debug!("Lock acquired by {} ({})", owner, path.display());
                    return Ok(Self { path, owner });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let content = fs::read_to_string(&path).unwrap_or_default();
                    let (locked_at, owner) = parse_lock(&content);
                    let age = unix_now().saturating_sub(locked_at);

                    if age < stale_after.as_secs() {
                        return Err(Error::Locked {
                            owner,
                            path: path.clone(),
                        });
                    }

                    warn!(
                        "Taking over stale lock held by {} ({}s old)",
                        owner, age
                    );
                    take_over(&path, &content)?;
                }
                Err(e) => return Err(Error::io(&path, e)),
            }
        }

        Err(Error::Locked {
            owner: "another process".to_string(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the timestamp. Fails with [`Error::Locked`] if another process
    /// has taken the lock over in the meantime.
    pub fn refresh(&self) -> Result<()> {
        let current = fs::read_to_string(&self.path).at_path(&self.path)?;
        let (_, owner) = parse_lock(&current);
        if owner != self.owner {
            return Err(Error::Locked {
                owner,
                path: self.path.clone(),
            });
        }

        // Replace atomically so readers never see an empty file
        let tmp = sibling(&self.path, &format!("{}.tmp", std::process::id()));
        fs::write(&tmp, format!("{}:{}\n", unix_now(), self.owner)).at_path(&tmp)?;
        fs::rename(&tmp, &self.path).at_path(&self.path)
    }
}

impl Drop for MirrorLock {
    fn drop(&mut self) {
        let content = fs::read_to_string(&self.path).unwrap_or_default();
        let (_, owner) = parse_lock(&content);
        if owner != self.owner {
            warn!(
                "Lock {} now belongs to {}, leaving it",
                self.path.display(),
                owner
            );
            return;
        }

        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Cannot release lock {}: {}", self.path.display(), e);
            }
        } else {
            debug!("Lock released ({})", self.path.display());
        }
    }
}

/// `<lock>` -> `<lock>.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Move a stale lock out of the way.
///
/// The rename is atomic, so of several processes that judged the same lock
/// stale only one moves it. If what got moved is no longer the stale content
/// (someone else won and wrote a fresh lock), it is linked back and the
/// caller's next `create_new` reports it as held.
fn take_over(path: &Path, stale_content: &str) -> Result<()> {
    let tombstone = sibling(path, &format!("stale-{}", std::process::id()));
    match fs::rename(path, &tombstone) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(path, e)),
    }

    let moved = fs::read_to_string(&tombstone).unwrap_or_default();
    if moved != stale_content {
        // hard_link never overwrites a lock created since
        if let Err(e) = fs::hard_link(&tombstone, path) {
            warn!("Cannot restore lock {}: {}", path.display(), e);
        }
    }
    let _ = fs::remove_file(&tombstone);
    Ok(())
}

/// `<ts>:<host>:<pid>` -> (ts, "host:pid"). Garbage parses as timestamp 0 (stale).
fn parse_lock(content: &str) -> (u64, String) {
    let content = content.trim();
    match content.split_once(':') {
        Some((ts, owner)) => (ts.parse().unwrap_or(0), owner.to_string()),
        None => (0, "unknown".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_is_sibling() {
        assert_eq!(
            lock_path_for(Path::new("/home/user/.autostash_repo")),
            PathBuf::from("/home/user/.autostash_repo.lock")
        );
    }

    #[test]
    fn test_second_acquire_fails_until_released() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let mirror = temp.path().join("repo");

        let lock = MirrorLock::acquire(&mirror)?;
        assert!(lock.path().exists());
        assert!(!mirror.exists());

        let err = MirrorLock::acquire(&mirror).unwrap_err();
        assert!(matches!(err, Error::Locked { .. }));

        drop(lock);
        assert!(!lock_path_for(&mirror).exists());
        let _again = MirrorLock::acquire(&mirror)?;
        Ok(())
    }

    #[test]
    fn test_stale_lock_taken_over() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let mirror = temp.path().join("repo");
        fs::write(lock_path_for(&mirror), "1000:oldhost:42\n").unwrap();

        let lock = MirrorLock::acquire(&mirror)?;
        let content = fs::read_to_string(lock.path()).unwrap();
        assert!(!content.contains("oldhost"));
        Ok(())
    }

    #[test]
    fn test_fresh_lock_is_not_taken_over() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let mirror = temp.path().join("repo");
        let lock_path = lock_path_for(&mirror);
        let fresh = format!("{}:otherhost:7\n", unix_now());
        fs::write(&lock_path, &fresh).unwrap();

        // Two stale verdicts racing: the loser must put the fresh lock back
        take_over(&lock_path, "1000:oldhost:42\n")?;
        assert_eq!(fs::read_to_string(&lock_path).unwrap(), fresh);

        let err = MirrorLock::acquire(&mirror).unwrap_err();
        assert!(matches!(err, Error::Locked { owner, .. } if owner == "otherhost:7"));
        Ok(())
    }

    #[test]
    fn test_refresh_keeps_long_run_fresh() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let mirror = temp.path().join("repo");
        let lock = MirrorLock::acquire(&mirror)?;

        // Pretend the run started long ago
        fs::write(lock.path(), format!("1000:{}\n", owner_id())).unwrap();
        lock.refresh()?;

        let (locked_at, _) = parse_lock(&fs::read_to_string(lock.path()).unwrap());
        assert!(unix_now() - locked_at < 60);
        assert!(matches!(
            MirrorLock::acquire(&mirror),
            Err(Error::Locked { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_lost_lock_is_reported_and_left_alone() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let mirror = temp.path().join("repo");
        let lock = MirrorLock::acquire(&mirror)?;
        let lock_path = lock.path().to_path_buf();

        let theirs = format!("{}:otherhost:7\n", unix_now());
        fs::write(&lock_path, &theirs).unwrap();

        assert!(matches!(lock.refresh(), Err(Error::Locked { .. })));
        drop(lock);
        assert_eq!(fs::read_to_string(&lock_path).unwrap(), theirs);
        Ok(())
    }

    #[test]
    fn test_parse_lock() {
        assert_eq!(
            parse_lock("1700000000:box:123\n"),
            (1700000000, "box:123".to_string())
        );
        assert_eq!(parse_lock("garbage").0, 0);
    }
}
