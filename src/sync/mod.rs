//! Sync module - keeps the mirror repository in step with the remote.
//!
//! This module contains:
//! - RepositoryGateway trait and its git implementation
//! - Git operations on the mirror (clone, pull, commit, push)
//! - Remote identifiers and the existence probe
//! - A deadline-bounded runner for the git CLI

pub mod command;
pub mod gateway;
pub mod git;
pub mod remote;

pub use gateway::{CommitOutcome, GitGateway, RepositoryGateway};
pub use git::GitMirror;
pub use remote::{Endpoint, RemoteId, RemoteStatus};
