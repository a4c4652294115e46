//! AutoStash CLI - smart folder backups to a Git remote
//!
//! Usage:
//!   autostash run      - Scheduled trigger (backup exactly as configured)
//!   autostash backup   - Back up now, with optional overrides
//!   autostash restore  - Fresh clone of the remote into the restore dir
//!   autostash status   - Last backup and history

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, FolderCommands, RemoteCommands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("autostash={}", log_level).parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone();

    match cli.command {
        Commands::Run => cli::commands::run(config_path),
        Commands::Backup {
            folders,
            remote,
            system_files,
            encrypt,
        } => cli::commands::backup(config_path, folders, remote, system_files, encrypt),
        Commands::Restore { remote } => cli::commands::restore(config_path, remote),
        Commands::Status { limit, json } => cli::commands::status(config_path, limit, json),
        Commands::Folders { command } => match command {
            FolderCommands::List => cli::commands::folders_list(config_path),
            FolderCommands::Add { path } => cli::commands::folders_add(config_path, path),
            FolderCommands::Remove { path } => cli::commands::folders_remove(config_path, path),
        },
        Commands::Remote { command } => match command {
            RemoteCommands::Set { remote } => cli::commands::remote_set(config_path, remote),
        },
        Commands::Decrypt { bundle, output } => cli::commands::decrypt(bundle, output),
    }
}
