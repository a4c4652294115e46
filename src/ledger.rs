//! Status ledger - last successful backup and the append-only history log.
//!
//! On-disk contract (read directly by other tooling):
//! - `last_backup` holds one timestamp, overwritten on every success
//! - `backup_history.log` holds one timestamp per line, newest last
//! - `error.log` holds `timestamp: message` lines for failed scheduled runs
//!
//! Timestamps are local time formatted as `YYYY-MM-DD HH:MM:SS`.

use crate::error::{Error, IoResultExt, Result};
use chrono::{Duration, NaiveDateTime};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const LAST_BACKUP_FILE: &str = "last_backup";
const HISTORY_FILE: &str = "backup_history.log";
const ERROR_LOG_FILE: &str = "error.log";

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()
}

/// Current local time, truncated to whole seconds.
pub fn now() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    parse_timestamp(&format_timestamp(&now)).unwrap_or(now)
}

#[derive(Debug, Clone)]
pub struct StatusLedger {
    dir: PathBuf,
}

impl StatusLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn last_backup_path(&self) -> PathBuf {
        self.dir.join(LAST_BACKUP_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.dir.join(ERROR_LOG_FILE)
    }

    /// Overwrite the last-success marker.
    pub fn record_success(&self, ts: &NaiveDateTime) -> Result<()> {
        fs::create_dir_all(&self.dir).at_path(&self.dir)?;
        let path = self.last_backup_path();
        let tmp = self.dir.join(format!("{}.tmp", LAST_BACKUP_FILE));
        fs::write(&tmp, format!("{}\n", format_timestamp(ts))).at_path(&tmp)?;
        fs::rename(&tmp, &path).at_path(&path)
    }

    /// Timestamp of the last successful backup, if any.
    pub fn last_success(&self) -> Result<Option<NaiveDateTime>> {
        let path = self.last_backup_path();
        match fs::read_to_string(&path) {
            Ok(content) => parse_timestamp(&content).map(Some).ok_or_else(|| {
                Error::Config(format!(
                    "Malformed timestamp in {}: {:?}",
                    path.display(),
                    content.trim()
                ))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Append one entry to the history log.
    pub fn append_history(&self, ts: &NaiveDateTime) -> Result<()> {
        self.append_line(&self.history_path(), &format_timestamp(ts))
    }

    /// Full history in on-disk order (oldest first). Unparseable lines are skipped.
    pub fn history(&self) -> Result<Vec<NaiveDateTime>> {
        let path = self.history_path();
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content.lines().filter_map(parse_timestamp).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Up to `limit` most recent entries, newest first.
    pub fn recent_history(&self, limit: usize) -> Result<Vec<NaiveDateTime>> {
        let mut history = self.history()?;
        history.reverse();
        history.truncate(limit);
        Ok(history)
    }

    /// Record a failed run in the error log.
    pub fn append_error(&self, ts: &NaiveDateTime, message: &str) -> Result<()> {
        let flat = message.replace('\n', " | ");
        self.append_line(
            &self.error_log_path(),
            &format!("{}: {}", format_timestamp(ts), flat),
        )
    }

    /// True if there is no successful backup or the last one is older than `max_age`.
    pub fn is_overdue(&self, now: &NaiveDateTime, max_age: Duration) -> Result<bool> {
        Ok(match self.last_success()? {
            Some(last) => *now - last > max_age,
            None => true,
        })
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).at_path(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .at_path(path)?;
        writeln!(file, "{}", line).at_path(path)
    }
}
