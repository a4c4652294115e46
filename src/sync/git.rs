//! Git operations on the mirror repository.
//!
//! Uses libgit2 (via the git2 crate) for local inspection and commits, and the
//! git CLI for everything that talks to the remote (clone, pull, push) so the
//! ambient credential helper is used.

use super::command::{run_git, run_git_checked};
use crate::error::{Error, IoResultExt, Result};
use git2::{Commit, Repository, Signature};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const ORIGIN: &str = "origin";
const DEFAULT_BRANCH: &str = "main";
const FALLBACK_NAME: &str = "AutoStash";
const FALLBACK_EMAIL: &str = "autostash@local";

fn repo_err(context: &str, e: git2::Error) -> Error {
    Error::Repo(format!("{}: {}", context, e.message()))
}

/// Local working copy of the backup remote
pub struct GitMirror {
    repo: Repository,
    timeout: Duration,
}

impl GitMirror {
    /// Open an existing repository
    pub fn open(path: &Path, timeout: Duration) -> Result<Self> {
        let repo = Repository::open(path).map_err(|e| {
            repo_err(
                &format!("Cannot open git repository {}", path.display()),
                e,
            )
        })?;
        Ok(Self { repo, timeout })
    }

    /// Clone `url` into `path`. A partial checkout is removed on failure.
    pub fn clone(url: &str, path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).at_path(parent)?;
        }

        let target = path.to_string_lossy();
        let result = run_git_checked(None, &["clone", "--quiet", url, &target], timeout);
        if let Err(e) = result {
            if path.exists() {
                let _ = std::fs::remove_dir_all(path);
            }
            return Err(e);
        }

        info!("Cloned {} into {}", super::command::redact_url(url), path.display());
        Self::open(path, timeout)
    }

    pub fn workdir(&self) -> Result<PathBuf> {
        self.repo
            .workdir()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| Error::Repo("Repository has no workdir".to_string()))
    }

    /// Branch HEAD points to, even before the first commit
    pub fn current_branch(&self) -> String {
        self.repo
            .find_reference("HEAD")
            .ok()
            .and_then(|head| head.symbolic_target().map(|t| t.to_string()))
            .and_then(|target| target.strip_prefix("refs/heads/").map(|b| b.to_string()))
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string())
    }

    /// Point `origin` at `url`, adding it if missing
    pub fn set_origin(&self, url: &str) -> Result<()> {
        let current = self
            .repo
            .find_remote(ORIGIN)
            .ok()
            .and_then(|r| r.url().map(|u| u.to_string()));

        match current {
            Some(existing) if existing == url => Ok(()),
            Some(_) => self
                .repo
                .remote_set_url(ORIGIN, url)
                .map_err(|e| repo_err("Cannot update origin URL", e)),
            None => self
                .repo
                .remote(ORIGIN, url)
                .map(|_| ())
                .map_err(|e| repo_err("Cannot add origin", e)),
        }
    }

    /// Pull the remote branch (merge, no rebase).
    /// Returns Ok(false) if already up to date or the remote branch does not exist yet.
    pub fn pull(&self) -> Result<bool> {
        let workdir = self.workdir()?;
        let branch = self.current_branch();

        let mut args: Vec<String> = Vec::new();
        if self.repo.signature().is_err() {
            // Merge commits need an identity
            args.extend([
                "-c".to_string(),
                format!("user.name={}", FALLBACK_NAME),
                "-c".to_string(),
                format!("user.email={}", FALLBACK_EMAIL),
            ]);
        }
        args.extend(
            ["pull", "--no-rebase", "--no-edit", ORIGIN, branch.as_str()].map(String::from),
        );
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = run_git(Some(&workdir), &args, self.timeout)?;
        if output.success() {
            let up_to_date = output.stdout.contains("Already up to date")
                || output.stdout.contains("Already up-to-date");
            return Ok(!up_to_date);
        }

        let stderr = output.stderr.trim();

        // Empty remote: nothing to pull yet
        if stderr.contains("couldn't find remote ref") || stderr.contains("Couldn't find remote ref")
        {
            debug!("Remote has no branch {} yet", branch);
            return Ok(false);
        }

        if stderr.contains("CONFLICT") || output.stdout.contains("CONFLICT") {
            return Err(Error::Repo(format!(
                "Merge conflict while pulling into {}. Resolve it manually \
                 (git status, fix files, git commit) and run the backup again",
                workdir.display()
            )));
        }

        Err(Error::Repo(format!("Failed to sync with remote repository: {}", stderr)))
    }

    /// Stage everything in the working tree, untracked files included
    pub fn stage_all(&self) -> Result<()> {
        let workdir = self.workdir()?;
        run_git_checked(Some(&workdir), &["add", "-A"], self.timeout)?;
        Ok(())
    }

    /// Whether the working tree or index differs from HEAD (untracked files count)
    pub fn has_changes(&self) -> Result<bool> {
        let workdir = self.workdir()?;
        let output = run_git_checked(
            Some(&workdir),
            &["status", "--porcelain", "--untracked-files=all"],
            self.timeout,
        )?;
        Ok(!output.stdout.trim().is_empty())
    }

    /// Commit the current index
    pub fn commit(&self, message: &str) -> Result<git2::Oid> {
        let sig = self
            .repo
            .signature()
            .or_else(|_| Signature::now(FALLBACK_NAME, FALLBACK_EMAIL))
            .map_err(|e| repo_err("Cannot create git signature", e))?;

        // `git add` ran out of process; reload the index from disk
        let mut index = self.repo.index().map_err(|e| repo_err("Cannot read index", e))?;
        index
            .read(true)
            .map_err(|e| repo_err("Cannot reload index", e))?;
        let tree_id = index
            .write_tree()
            .map_err(|e| repo_err("Cannot write tree", e))?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| repo_err("Cannot find tree", e))?;

        let parents: Vec<Commit<'_>> = self.head_commit().into_iter().collect();
        let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .map_err(|e| repo_err("Cannot create commit", e))
    }

    fn head_commit(&self) -> Option<Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }

    pub fn has_head_commit(&self) -> bool {
        self.head_commit().is_some()
    }

    /// Push the current branch to origin. Errors always propagate.
    pub fn push(&self) -> Result<()> {
        let workdir = self.workdir()?;
        let branch = self.current_branch();
        run_git_checked(
            Some(&workdir),
            &["push", "--quiet", "-u", ORIGIN, &branch],
            self.timeout,
        )?;
        info!("Pushed {} to {}", branch, ORIGIN);
        Ok(())
    }

    pub fn count_commits(&self) -> Result<usize> {
        if !self.has_head_commit() {
            return Ok(0);
        }
        let mut revwalk = self.repo.revwalk().map_err(|e| repo_err("revwalk", e))?;
        revwalk.push_head().map_err(|e| repo_err("revwalk", e))?;
        Ok(revwalk.count())
    }
}
