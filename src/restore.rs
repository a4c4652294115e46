//! Restore - full fresh clone of the backup remote into the restore directory.
//!
//! Restore is a destructive overwrite: whatever a previous restore left in the
//! directory is removed first, nothing is merged.

use crate::error::{Error, Result};
use crate::sync::{RemoteId, RepositoryGateway};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct RestoreOrchestrator<G: RepositoryGateway> {
    gateway: G,
    restore_dir: PathBuf,
}

impl<G: RepositoryGateway> RestoreOrchestrator<G> {
    pub fn new(gateway: G, restore_dir: impl Into<PathBuf>) -> Self {
        Self {
            gateway,
            restore_dir: restore_dir.into(),
        }
    }

    pub fn restore_dir(&self) -> &Path {
        &self.restore_dir
    }

    /// Clone `remote` into the restore directory and return its path.
    pub fn restore(&self, remote: &RemoteId) -> Result<PathBuf> {
        if self.restore_dir == self.gateway.mirror_path() {
            return Err(Error::Config(format!(
                "Restore directory {} is the mirror repository",
                self.restore_dir.display()
            )));
        }

        info!("Restoring {} into {}", remote, self.restore_dir.display());
        self.gateway.clone_fresh(remote, &self.restore_dir)?;
        info!("Restore complete");
        Ok(self.restore_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{CommitOutcome, RemoteStatus};
    use std::fs;
    use tempfile::TempDir;

    /// "Clones" by writing a single marker file into a wiped destination.
    struct CopyGateway {
        mirror: PathBuf,
    }

    impl RepositoryGateway for CopyGateway {
        fn mirror_path(&self) -> &Path {
            &self.mirror
        }

        fn probe_remote(&self, _remote: &RemoteId) -> RemoteStatus {
            RemoteStatus::Present
        }

        fn prepare_mirror(&mut self, _remote: &RemoteId) -> Result<()> {
            Ok(())
        }

        fn commit_and_push(&mut self, _message: &str) -> Result<CommitOutcome> {
            Ok(CommitOutcome::default())
        }

        fn clone_fresh(&self, remote: &RemoteId, destination: &Path) -> Result<()> {
            if destination.exists() {
                fs::remove_dir_all(destination).unwrap();
            }
            fs::create_dir_all(destination).unwrap();
            fs::write(destination.join("REMOTE"), remote.to_string()).unwrap();
            Ok(())
        }
    }

    #[test]
    fn test_restore_returns_restore_dir() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let restore_dir = temp.path().join("restore");
        fs::create_dir_all(&restore_dir).unwrap();
        fs::write(restore_dir.join("stale.txt"), "old").unwrap();

        let restorer = RestoreOrchestrator::new(
            CopyGateway {
                mirror: temp.path().join("repo"),
            },
            &restore_dir,
        );
        let path = restorer.restore(&RemoteId::parse("owner/repo")?)?;

        assert_eq!(path, restore_dir);
        assert!(!path.join("stale.txt").exists());
        assert_eq!(fs::read_to_string(path.join("REMOTE")).unwrap(), "owner/repo");
        Ok(())
    }

    #[test]
    fn test_refuses_to_restore_over_mirror() {
        let temp = TempDir::new().unwrap();
        let mirror = temp.path().join("repo");
        let restorer = RestoreOrchestrator::new(
            CopyGateway {
                mirror: mirror.clone(),
            },
            &mirror,
        );

        let err = restorer
            .restore(&RemoteId::parse("owner/repo").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
