//! Entry points driven by configuration.
//!
//! [`run_now`] is the single no-argument trigger an OS scheduler (cron,
//! systemd timer, Task Scheduler) invokes. Registering it is left to the
//! installer.

use crate::backup::{BackupOrchestrator, BackupReport};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::{self, StatusLedger};
use crate::restore::RestoreOrchestrator;
use crate::sync::{Endpoint, GitGateway, RemoteId};
use tracing::{error, warn};

/// Environment variable holding the bundle passphrase for unattended runs
pub const PASSPHRASE_ENV: &str = "AUTOSTASH_PASSPHRASE";

/// Git-backed gateway for the configured mirror and endpoint
pub fn gateway_for(config: &Config) -> GitGateway {
    GitGateway::new(
        &config.paths.mirror_dir,
        Endpoint::from_config(&config.endpoint),
    )
}

/// Backup orchestrator wired to the configured paths and commit message
pub fn orchestrator_for(config: &Config) -> BackupOrchestrator<GitGateway> {
    BackupOrchestrator::new(
        gateway_for(config),
        StatusLedger::new(&config.paths.state_dir),
    )
    .with_bundle_dir(config.paths.bundle_dir())
    .with_commit_message(&config.commit_message)
}

pub fn restorer_for(config: &Config) -> RestoreOrchestrator<GitGateway> {
    RestoreOrchestrator::new(gateway_for(config), &config.paths.restore_dir)
}

/// The configured remote, parsed
pub fn configured_remote(config: &Config) -> Result<RemoteId> {
    let remote = config
        .remote
        .as_deref()
        .ok_or_else(|| Error::Config("No remote repository configured".to_string()))?;
    RemoteId::parse(remote)
}

/// Run a backup exactly as configured. Failures are appended to the error log
/// before being returned.
pub fn run_configured(config: &Config, passphrase: Option<String>) -> Result<BackupReport> {
    let ledger = StatusLedger::new(&config.paths.state_dir);

    let result = configured_remote(config).and_then(|remote| {
        orchestrator_for(config)
            .with_passphrase(passphrase)
            .run(&config.folders, &remote, config.options)
    });

    if let Err(e) = &result {
        record_failure(&ledger, e);
    }
    result
}

/// Scheduled trigger: load the default config and back up.
pub fn run_now() -> Result<BackupReport> {
    let config = match Config::load_default() {
        Ok(config) => config,
        Err(e) => {
            let fallback = Config::default();
            record_failure(&StatusLedger::new(&fallback.paths.state_dir), &e);
            return Err(e);
        }
    };
    let passphrase = std::env::var(PASSPHRASE_ENV).ok().filter(|p| !p.is_empty());
    run_configured(&config, passphrase)
}

fn record_failure(ledger: &StatusLedger, e: &Error) {
    error!("Backup failed: {}", e);
    if let Err(log_err) = ledger.append_error(&ledger::now(), &e.to_string()) {
        warn!("Could not write error log: {}", log_err);
    }
}
