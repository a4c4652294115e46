//! CLI definitions and command implementations for AutoStash.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AutoStash - Smart folder backups to a Git remote
#[derive(Parser)]
#[command(name = "autostash")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/autostash/autostash.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up exactly as configured (entry point for cron / systemd timers)
    Run,

    /// Back up now; flags override the config for this run only
    Backup {
        /// Folder to back up (repeatable; replaces the configured list)
        #[arg(short, long = "folder")]
        folders: Vec<PathBuf>,

        /// Remote repository as owner/name
        #[arg(short, long)]
        remote: Option<String>,

        /// Also capture the allow-listed system configuration files
        #[arg(long)]
        system_files: bool,

        /// Write an encrypted bundle of the mirror after pushing
        #[arg(long)]
        encrypt: bool,
    },

    /// Replace the restore directory with a fresh clone of the remote
    Restore {
        /// Remote repository as owner/name (default: configured remote)
        #[arg(short, long)]
        remote: Option<String>,
    },

    /// Show last backup, overdue flag and recent history
    Status {
        /// Number of history entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the folders to back up
    Folders {
        #[command(subcommand)]
        command: FolderCommands,
    },

    /// Manage the backup remote
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },

    /// Decrypt an encrypted bundle into a directory
    Decrypt {
        /// Bundle file (autostash-bundle.tar.gz.enc)
        bundle: PathBuf,

        /// Output directory
        output: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum FolderCommands {
    /// List configured folders
    List,
    /// Add a folder
    Add { path: PathBuf },
    /// Remove a folder
    Remove { path: PathBuf },
}

#[derive(Subcommand)]
pub enum RemoteCommands {
    /// Set the remote repository (owner/name)
    Set { remote: String },
}
