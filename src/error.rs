//! Error types for AutoStash.
//!
//! One enum covers every failure the backup engine can report. Orchestrator
//! failures are wrapped in [`Error::Step`] so the message names the state that
//! failed; [`Error::root`] peels the wrappers off again.

use crate::backup::BackupStage;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Repository {0} doesn't exist or you don't have access")]
    RemoteNotFound(String),

    #[error("Repository {remote} is unreachable: {reason}")]
    RemoteUnreachable { remote: String, reason: String },

    #[error("Invalid remote identifier '{0}': expected owner/name")]
    InvalidRemote(String),

    #[error("Git error: {0}")]
    Repo(String),

    #[error("Failed to sync {}: {source}", folder.display())]
    Sync {
        folder: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid source folder {}: {reason}", path.display())]
    InvalidSource { path: PathBuf, reason: String },

    #[error("Permission denied reading {}: {source}", path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Mirror is locked by {owner} ({})", path.display())]
    Locked { owner: String, path: PathBuf },

    #[error("Backup cancelled before {stage}")]
    Cancelled { stage: BackupStage },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{stage} failed: {source}")]
    Step {
        stage: BackupStage,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn at(self, stage: BackupStage) -> Self {
        match self {
            // Already tagged with the state that produced it
            Error::Step { .. } | Error::Cancelled { .. } => self,
            other => Error::Step {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error kind, without `Step` / `Sync` wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } | Error::Sync { source, .. } => source.root(),
            other => other,
        }
    }

    /// The state-machine stage that failed, if this error came out of a run.
    pub fn stage(&self) -> Option<BackupStage> {
        match self {
            Error::Step { stage, .. } | Error::Cancelled { stage } => Some(*stage),
            _ => None,
        }
    }
}

/// Helper to attach a path to `std::io::Result`.
pub(crate) trait IoResultExt<T> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
