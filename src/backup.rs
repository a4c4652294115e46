//! Backup orchestrator - one sequential run from remote check to status record.
//!
//! States, in order:
//! `ValidatingRemote -> PreparingMirror -> SyncingFolders ->
//! BackingUpSystemFiles (optional) -> Committing -> RecordingStatus ->
//! Encrypting (optional) -> Done`
//!
//! Any error before `RecordingStatus` aborts the run and is returned as
//! [`Error::Step`] naming the state. Nothing is rolled back: the next run's
//! fingerprint comparison re-converges a half-synced mirror.

use crate::config::BackupOptions;
use crate::crypto;
use crate::error::{Error, Result};
use crate::ledger::{self, StatusLedger};
use crate::lock::MirrorLock;
use crate::mirror::{self, SyncOutcome};
use crate::sync::{CommitOutcome, RemoteId, RemoteStatus, RepositoryGateway};
use crate::system_files::{SystemCapture, SystemFiles};
use chrono::NaiveDateTime;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_COMMIT_MESSAGE: &str = "AutoStash Backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupStage {
    ValidatingRemote,
    PreparingMirror,
    SyncingFolders,
    BackingUpSystemFiles,
    Committing,
    RecordingStatus,
    Encrypting,
    Done,
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Progress event passed to the observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub stage: BackupStage,
    /// Completed units of work / total units, in `0.0..=1.0`
    pub fraction: f64,
}

/// Cooperative cancellation, checked between steps only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSync {
    pub folder: PathBuf,
    pub outcome: SyncOutcome,
}

/// Result of the optional encryption step. Failure here is soft: the
/// pushed commit stays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionOutcome {
    Skipped,
    Written(PathBuf),
    Failed(String),
}

/// Summary of a successful run.
#[derive(Debug)]
pub struct BackupReport {
    pub folders: Vec<FolderSync>,
    pub system_files: Option<SystemCapture>,
    pub commit: CommitOutcome,
    pub encryption: EncryptionOutcome,
    pub finished_at: NaiveDateTime,
}

impl BackupReport {
    pub fn changed_folders(&self) -> usize {
        self.folders
            .iter()
            .filter(|f| f.outcome == SyncOutcome::Changed)
            .count()
    }
}

type ProgressFn = Box<dyn FnMut(Progress)>;

pub struct BackupOrchestrator<G: RepositoryGateway> {
    gateway: G,
    ledger: StatusLedger,
    system_files: SystemFiles,
    bundle_dir: PathBuf,
    passphrase: Option<String>,
    commit_message: String,
    progress: Option<ProgressFn>,
    cancel: CancelToken,
}

impl<G: RepositoryGateway> BackupOrchestrator<G> {
    pub fn new(gateway: G, ledger: StatusLedger) -> Self {
        let bundle_dir = ledger.dir().join("bundles");
        Self {
            gateway,
            ledger,
            system_files: SystemFiles::default(),
            bundle_dir,
            passphrase: None,
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            progress: None,
            cancel: CancelToken::default(),
        }
    }

    pub fn with_system_files(mut self, system_files: SystemFiles) -> Self {
        self.system_files = system_files;
        self
    }

    pub fn with_bundle_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundle_dir = dir.into();
        self
    }

    pub fn with_passphrase(mut self, passphrase: Option<String>) -> Self {
        self.passphrase = passphrase;
        self
    }

    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = message.into();
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Observer called synchronously after each unit of work. It runs on the
    /// backup thread and must return promptly.
    pub fn on_progress(mut self, observer: impl FnMut(Progress) + 'static) -> Self {
        self.progress = Some(Box::new(observer));
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn into_gateway(self) -> G {
        self.gateway
    }

    /// Run one backup of `folders` (in order) to `remote`.
    pub fn run(
        &mut self,
        folders: &[PathBuf],
        remote: &RemoteId,
        options: BackupOptions,
    ) -> Result<BackupReport> {
        let lock = MirrorLock::acquire(self.gateway.mirror_path())?;

        let total_units = folders.len() + usize::from(options.include_system_files);
        let mut completed = 0usize;
        let fraction = |done: usize| {
            if total_units == 0 {
                0.0
            } else {
                done as f64 / total_units as f64
            }
        };

        // ValidatingRemote
        self.enter(&lock, BackupStage::ValidatingRemote)?;
        match self.gateway.probe_remote(remote) {
            RemoteStatus::Present => {}
            RemoteStatus::Absent => {
                return Err(
                    Error::RemoteNotFound(remote.to_string()).at(BackupStage::ValidatingRemote)
                )
            }
            RemoteStatus::Unreachable(reason) => {
                return Err(Error::RemoteUnreachable {
                    remote: remote.to_string(),
                    reason,
                }
                .at(BackupStage::ValidatingRemote))
            }
        }

        // PreparingMirror
        self.enter(&lock, BackupStage::PreparingMirror)?;
        self.gateway
            .prepare_mirror(remote)
            .map_err(|e| e.at(BackupStage::PreparingMirror))?;
        let mirror_root = self.gateway.mirror_path().to_path_buf();

        // SyncingFolders
        self.enter(&lock, BackupStage::SyncingFolders)?;
        let mut synced = Vec::with_capacity(folders.len());
        for folder in folders {
            self.checkpoint(BackupStage::SyncingFolders)?;
            let outcome = mirror::sync(folder, &mirror_root).map_err(|e| {
                Error::Sync {
                    folder: folder.clone(),
                    source: Box::new(e),
                }
                .at(BackupStage::SyncingFolders)
            })?;
            info!("{}: {:?}", folder.display(), outcome);
            synced.push(FolderSync {
                folder: folder.clone(),
                outcome,
            });
            completed += 1;
            self.emit(BackupStage::SyncingFolders, fraction(completed));
        }

        // BackingUpSystemFiles
        let system_files = if options.include_system_files {
            self.enter(&lock, BackupStage::BackingUpSystemFiles)?;
            let capture = self.system_files.capture(&mirror_root);
            completed += 1;
            self.emit(BackupStage::BackingUpSystemFiles, fraction(completed));
            Some(capture)
        } else {
            None
        };

        // Committing
        self.enter(&lock, BackupStage::Committing)?;
        let commit = self
            .gateway
            .commit_and_push(&self.commit_message)
            .map_err(|e| e.at(BackupStage::Committing))?;

        // RecordingStatus: the run has succeeded from here on
        info!("Entering {}", BackupStage::RecordingStatus);
        let finished_at = ledger::now();
        self.record_status(&finished_at);

        // Encrypting
        let encryption = if options.encrypt {
            info!("Entering {}", BackupStage::Encrypting);
            self.encrypt(&mirror_root)
        } else {
            EncryptionOutcome::Skipped
        };

        info!("Backup finished at {}", ledger::format_timestamp(&finished_at));
        self.emit(BackupStage::Done, 1.0);

        Ok(BackupReport {
            folders: synced,
            system_files,
            commit,
            encryption,
            finished_at,
        })
    }

    /// Cancellation check, then keep the lock fresh for the next stage.
    fn enter(&mut self, lock: &MirrorLock, stage: BackupStage) -> Result<()> {
        self.checkpoint(stage)?;
        lock.refresh().map_err(|e| e.at(stage))?;
        info!("Entering {}", stage);
        Ok(())
    }

    fn checkpoint(&self, stage: BackupStage) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!("Backup cancelled before {}", stage);
            return Err(Error::Cancelled { stage });
        }
        Ok(())
    }

    fn emit(&mut self, stage: BackupStage, fraction: f64) {
        if let Some(observer) = self.progress.as_mut() {
            observer(Progress { stage, fraction });
        }
    }

    fn record_status(&self, ts: &NaiveDateTime) {
        log_and_continue("record last backup", self.ledger.record_success(ts));
        log_and_continue("append backup history", self.ledger.append_history(ts));
    }

    fn encrypt(&self, mirror_root: &Path) -> EncryptionOutcome {
        let Some(passphrase) = self.passphrase.as_deref() else {
            warn!("Encryption requested but no passphrase was supplied");
            return EncryptionOutcome::Failed("no passphrase supplied".to_string());
        };

        match crypto::encrypt_mirror(mirror_root, &self.bundle_dir, passphrase) {
            Ok(path) => EncryptionOutcome::Written(path),
            Err(e) => {
                warn!("Encryption failed, pushed backup is kept: {}", e);
                EncryptionOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Status bookkeeping never fails a run.
fn log_and_continue(what: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("Could not {}: {}", what, e);
    }
}
