//! Command implementations for the AutoStash CLI.
//!
//! Main commands:
//! - run: scheduled trigger, backs up exactly as configured
//! - backup: interactive backup with a progress bar
//! - restore / status / folders / remote / decrypt

use anyhow::{bail, Context, Result};
use autostash::backup::{BackupReport, EncryptionOutcome};
use autostash::config::{default_config_path, Config};
use autostash::ledger::{self, StatusLedger};
use autostash::scheduler::{self, PASSPHRASE_ENV};
use autostash::{crypto, RemoteId, SyncOutcome};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;

/// A backup older than this is reported as overdue
const OVERDUE_AFTER_HOURS: i64 = 24;

fn resolve_config_path(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(default_config_path)
}

fn load_config(path: &std::path::Path) -> Result<Config> {
    Config::load_or_default(path).with_context(|| format!("Cannot load {}", path.display()))
}

/// Prompt for a passphrase (input hidden)
fn prompt_passphrase(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let passphrase = rpassword::read_password().context("Cannot read passphrase")?;
    if passphrase.is_empty() {
        bail!("Passphrase cannot be empty");
    }
    Ok(passphrase)
}

/// Passphrase from the environment, else asked interactively
fn read_passphrase(prompt: &str) -> Result<String> {
    match std::env::var(PASSPHRASE_ENV) {
        Ok(p) if !p.is_empty() => Ok(p),
        _ => prompt_passphrase(prompt),
    }
}

fn print_report(report: &BackupReport) {
    for folder in &report.folders {
        let marker = match folder.outcome {
            SyncOutcome::Changed => "changed".yellow(),
            SyncOutcome::Unchanged => "unchanged".dimmed(),
        };
        println!("  {} {} [{}]", "✓".green(), folder.folder.display(), marker);
    }

    if let Some(capture) = &report.system_files {
        println!(
            "  {} System files: {} copied, {} skipped",
            "✓".green(),
            capture.copied.len(),
            capture.skipped.len()
        );
        for skipped in &capture.skipped {
            println!("    {} {}", "skipped".yellow(), skipped.path.display());
        }
    }

    match &report.commit.commit {
        Some(id) => println!("  {} Committed {}", "✓".green(), id.cyan()),
        None => println!("  {}", "No changes to commit".dimmed()),
    }
    if report.commit.pushed {
        println!("  {} Pushed to remote", "✓".green());
    }

    match &report.encryption {
        EncryptionOutcome::Skipped => {}
        EncryptionOutcome::Written(path) => {
            println!("  {} Encrypted bundle: {}", "✓".green(), path.display())
        }
        EncryptionOutcome::Failed(reason) => println!(
            "  {} Encryption failed (backup was still pushed): {}",
            "!".yellow(),
            reason
        ),
    }
}

/// Scheduled trigger
pub fn run(config_path: Option<PathBuf>) -> Result<()> {
    let report = match config_path {
        Some(path) => {
            let config = load_config(&path)?;
            let passphrase = std::env::var(PASSPHRASE_ENV).ok().filter(|p| !p.is_empty());
            scheduler::run_configured(&config, passphrase)?
        }
        None => scheduler::run_now()?,
    };

    println!(
        "Backup completed at {}",
        ledger::format_timestamp(&report.finished_at)
    );
    Ok(())
}

/// Back up now, flags override the config for this run
pub fn backup(
    config_path: Option<PathBuf>,
    folders: Vec<PathBuf>,
    remote: Option<String>,
    system_files: bool,
    encrypt: bool,
) -> Result<()> {
    println!("{}", "AutoStash Backup".bold().cyan());
    println!();

    let mut config = load_config(&resolve_config_path(config_path))?;
    if !folders.is_empty() {
        config.folders = folders;
    }
    if let Some(remote) = remote {
        config.set_remote(remote);
    }
    config.options.include_system_files |= system_files;
    config.options.encrypt |= encrypt;

    let remote = scheduler::configured_remote(&config)
        .context("Set a remote with `autostash remote set owner/name` or --remote")?;

    let passphrase = if config.options.encrypt {
        Some(read_passphrase("Bundle passphrase: ")?)
    } else {
        None
    };

    println!("Remote:  {}", remote.to_string().cyan());
    println!("Mirror:  {}", config.paths.mirror_dir.display().to_string().dimmed());
    println!("Folders: {}", config.folders.len());
    println!();

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("  [{bar:40.cyan/blue}] {percent}% {msg}")?
            .progress_chars("█▓░"),
    );
    let bar = pb.clone();

    let result = scheduler::orchestrator_for(&config)
        .with_passphrase(passphrase)
        .on_progress(move |p| {
            bar.set_position((p.fraction * 100.0).round() as u64);
            bar.set_message(p.stage.to_string());
        })
        .run(&config.folders, &remote, config.options);
    pb.finish_and_clear();

    let report = result.context("Backup failed")?;
    print_report(&report);
    println!();
    println!(
        "{} at {}",
        "Backup completed".green().bold(),
        ledger::format_timestamp(&report.finished_at)
    );
    Ok(())
}

pub fn restore(config_path: Option<PathBuf>, remote: Option<String>) -> Result<()> {
    let config = load_config(&resolve_config_path(config_path))?;
    let remote = match remote {
        Some(r) => RemoteId::parse(&r)?,
        None => scheduler::configured_remote(&config)?,
    };

    println!(
        "Restoring {} into {}",
        remote.to_string().cyan(),
        config.paths.restore_dir.display()
    );
    println!(
        "{}",
        "Any previous restore in that directory will be replaced.".yellow()
    );

    let path = scheduler::restorer_for(&config)
        .restore(&remote)
        .context("Restore failed")?;

    println!("{} {}", "✓ Restored to".green(), path.display());
    Ok(())
}

pub fn status(config_path: Option<PathBuf>, limit: usize, json: bool) -> Result<()> {
    let config = load_config(&resolve_config_path(config_path))?;
    let status_ledger = StatusLedger::new(&config.paths.state_dir);

    let last = status_ledger.last_success()?;
    let overdue = status_ledger.is_overdue(
        &ledger::now(),
        chrono::Duration::hours(OVERDUE_AFTER_HOURS),
    )?;
    let history = status_ledger.recent_history(limit)?;

    if json {
        let value = serde_json::json!({
            "remote": config.remote,
            "folders": config.folders,
            "last_backup": last.as_ref().map(ledger::format_timestamp),
            "overdue": overdue,
            "history": history.iter().map(ledger::format_timestamp).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", "AutoStash Status".bold().cyan());
    println!();
    println!(
        "Remote:      {}",
        config.remote.as_deref().unwrap_or("(not set)")
    );
    println!("Folders:     {}", config.folders.len());

    match last {
        Some(ts) => {
            let stamp = ledger::format_timestamp(&ts);
            if overdue {
                println!("Last backup: {} {}", stamp.yellow(), "(overdue)".yellow());
            } else {
                println!("Last backup: {}", stamp.green());
            }
        }
        None => println!("Last backup: {}", "never".red()),
    }

    if !history.is_empty() {
        println!();
        println!("{}", "History (newest first):".bold());
        for ts in &history {
            println!("  {}", ledger::format_timestamp(ts));
        }
    }
    Ok(())
}

pub fn folders_list(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(&resolve_config_path(config_path))?;
    if config.folders.is_empty() {
        println!("{}", "No folders configured.".yellow());
        return Ok(());
    }
    for (idx, folder) in config.folders.iter().enumerate() {
        let marker = if folder.is_dir() {
            String::new()
        } else {
            " (missing)".red().to_string()
        };
        println!("  {}. {}{}", (idx + 1).to_string().cyan(), folder.display(), marker);
    }
    Ok(())
}

pub fn folders_add(config_path: Option<PathBuf>, path: PathBuf) -> Result<()> {
    let config_path = resolve_config_path(config_path);
    let mut config = load_config(&config_path)?;

    let folder = path
        .canonicalize()
        .with_context(|| format!("Cannot resolve {}", path.display()))?;
    if !folder.is_dir() {
        bail!("{} is not a directory", folder.display());
    }

    if config.add_folder(folder.clone()) {
        config.save(&config_path)?;
        println!("{} Added {}", "✓".green(), folder.display());
    } else {
        println!("{} is already in the list", folder.display());
    }
    Ok(())
}

pub fn folders_remove(config_path: Option<PathBuf>, path: PathBuf) -> Result<()> {
    let config_path = resolve_config_path(config_path);
    let mut config = load_config(&config_path)?;

    // Folders may have been deleted since they were added
    let folder = path.canonicalize().unwrap_or(path);
    if config.remove_folder(&folder) {
        config.save(&config_path)?;
        println!("{} Removed {}", "✓".green(), folder.display());
    } else {
        println!("{} is not in the list", folder.display());
    }
    Ok(())
}

pub fn remote_set(config_path: Option<PathBuf>, remote: String) -> Result<()> {
    let config_path = resolve_config_path(config_path);
    let mut config = load_config(&config_path)?;

    let id = RemoteId::parse(&remote)?;
    config.set_remote(id.to_string());
    config.save(&config_path)?;
    println!("{} Remote set to {}", "✓".green(), id.to_string().cyan());
    Ok(())
}

pub fn decrypt(bundle: PathBuf, output: PathBuf) -> Result<()> {
    let passphrase = read_passphrase("Bundle passphrase: ")?;
    crypto::decrypt_bundle(&bundle, &passphrase, &output)
        .with_context(|| format!("Cannot decrypt {}", bundle.display()))?;
    println!("{} Unpacked into {}", "✓".green(), output.display());
    Ok(())
}
