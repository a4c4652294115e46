//! AutoStash - smart folder backups to a Git remote.
//!
//! A backup run detects which source folders changed (content fingerprint),
//! replaces their copies in a local mirror repository, commits and pushes the
//! mirror, then records the run in a status ledger. Restore is a fresh clone
//! of the remote.

pub mod backup;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod lock;
pub mod mirror;
pub mod restore;
pub mod scheduler;
pub mod sync;
pub mod system_files;

pub use backup::{
    BackupOrchestrator, BackupReport, BackupStage, CancelToken, EncryptionOutcome, FolderSync,
    Progress,
};
pub use config::{BackupOptions, Config};
pub use error::{Error, Result};
pub use fingerprint::{fingerprint, DirectoryFingerprint};
pub use ledger::StatusLedger;
pub use lock::MirrorLock;
pub use mirror::SyncOutcome;
pub use restore::RestoreOrchestrator;
pub use sync::{GitGateway, RemoteId, RemoteStatus, RepositoryGateway};
pub use system_files::SystemFiles;
