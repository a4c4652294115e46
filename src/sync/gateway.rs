//! RepositoryGateway - lifecycle of the mirror repository against one remote.
//!
//! The trait is the seam between the orchestrators and git, so the backup
//! state machine can be exercised without a network.

use super::git::GitMirror;
use super::remote::{Endpoint, RemoteId, RemoteStatus};
use crate::error::{Error, IoResultExt, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What `commit_and_push` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Id of the new commit, if the tree had changes
    pub commit: Option<String>,
    /// Whether a push was performed
    pub pushed: bool,
}

pub trait RepositoryGateway {
    /// Fixed local path of the mirror working copy
    fn mirror_path(&self) -> &Path;

    /// Existence probe that keeps "absent" and "unreachable" apart
    fn probe_remote(&self, remote: &RemoteId) -> RemoteStatus;

    /// `true` only if the remote is known to exist ("unreachable or absent" is `false`)
    fn ensure_remote_exists(&self, remote: &RemoteId) -> bool {
        self.probe_remote(remote) == RemoteStatus::Present
    }

    /// Clone the remote into the mirror path if missing, otherwise pull it
    fn prepare_mirror(&mut self, remote: &RemoteId) -> Result<()>;

    /// Stage everything, commit if anything differs, then always push
    fn commit_and_push(&mut self, message: &str) -> Result<CommitOutcome>;

    /// Wipe `destination` and clone the remote into it
    fn clone_fresh(&self, remote: &RemoteId, destination: &Path) -> Result<()>;
}

/// Gateway backed by git
pub struct GitGateway {
    mirror_path: PathBuf,
    endpoint: Endpoint,
    mirror: Option<GitMirror>,
}

impl GitGateway {
    pub fn new(mirror_path: impl Into<PathBuf>, endpoint: Endpoint) -> Self {
        Self {
            mirror_path: mirror_path.into(),
            endpoint,
            mirror: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn mirror(&self) -> Result<&GitMirror> {
        self.mirror
            .as_ref()
            .ok_or_else(|| Error::Repo("Mirror repository has not been prepared".to_string()))
    }
}

impl RepositoryGateway for GitGateway {
    fn mirror_path(&self) -> &Path {
        &self.mirror_path
    }

    fn probe_remote(&self, remote: &RemoteId) -> RemoteStatus {
        self.endpoint.probe(remote)
    }

    fn prepare_mirror(&mut self, remote: &RemoteId) -> Result<()> {
        let url = self.endpoint.repo_url(remote);
        let timeout = self.endpoint.timeout();

        let mirror = if self.mirror_path.exists() {
            let mirror = GitMirror::open(&self.mirror_path, timeout)?;
            mirror.set_origin(&url)?;
            if mirror.pull()? {
                info!("Pulled remote changes into {}", self.mirror_path.display());
            } else {
                debug!("Mirror already up to date");
            }
            mirror
        } else {
            info!("Cloning {} into {}", remote, self.mirror_path.display());
            GitMirror::clone(&url, &self.mirror_path, timeout)?
        };

        self.mirror = Some(mirror);
        Ok(())
    }

    fn commit_and_push(&mut self, message: &str) -> Result<CommitOutcome> {
        let mirror = self.mirror()?;
        let mut outcome = CommitOutcome::default();

        mirror.stage_all()?;
        if mirror.has_changes()? {
            let oid = mirror.commit(message)?;
            info!("Created commit {}", oid);
            outcome.commit = Some(oid.to_string());
        } else {
            info!("No changes to commit");
        }

        // Push even without a new commit so earlier unpushed commits go out.
        // An empty repository has nothing to push.
        if mirror.has_head_commit() {
            mirror.push()?;
            outcome.pushed = true;
        } else {
            debug!("Mirror has no commits yet, skipping push");
        }

        Ok(outcome)
    }

    fn clone_fresh(&self, remote: &RemoteId, destination: &Path) -> Result<()> {
        if destination.exists() {
            info!("Removing previous restore at {}", destination.display());
            std::fs::remove_dir_all(destination).at_path(destination)?;
        }
        GitMirror::clone(
            &self.endpoint.repo_url(remote),
            destination,
            self.endpoint.timeout(),
        )?;
        Ok(())
    }
}
