//! Remote identifiers (`owner/name`) and the remote existence probe.

use super::command::run_git;
use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// `owner/name` of the backup repository on the hosting endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteId {
    owner: String,
    name: String,
}

impl RemoteId {
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidRemote(s.to_string());

        let (owner, name) = s.trim().split_once('/').ok_or_else(invalid)?;
        let name = name.strip_suffix(".git").unwrap_or(name);
        let valid_part = |part: &str| {
            !part.is_empty()
                && part != "."
                && part != ".."
                && !part.contains('/')
                && !part.chars().any(|c| c.is_whitespace() || c.is_control())
        };
        if !valid_part(owner) || !valid_part(name) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for RemoteId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Outcome of the existence probe. Absent and unreachable are kept apart so
/// callers can retry a network failure but not a missing repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Present,
    Absent,
    Unreachable(String),
}

/// Hosting endpoint: URL templates plus the network timeout.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url_template: String,
    probe_template: Option<String>,
    timeout: Duration,
}

impl Endpoint {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url_template: url_template.into(),
            probe_template: None,
            timeout,
        }
    }

    pub fn with_probe(mut self, probe_template: impl Into<String>) -> Self {
        self.probe_template = Some(probe_template.into());
        self
    }

    pub fn from_config(config: &EndpointConfig) -> Self {
        let endpoint = Self::new(config.url_template.clone(), config.timeout());
        match config.probe_template() {
            Some(probe) => endpoint.with_probe(probe),
            None => endpoint,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Clone/pull/push URL for `remote`
    pub fn repo_url(&self, remote: &RemoteId) -> String {
        self.url_template.replace("{remote}", &remote.to_string())
    }

    /// Web URL for the lightweight probe, if the endpoint has one
    pub fn probe_url(&self, remote: &RemoteId) -> Option<String> {
        self.probe_template
            .as_ref()
            .map(|t| t.replace("{remote}", &remote.to_string()))
            .filter(|url| url.starts_with("https://") || url.starts_with("http://"))
    }

    /// Check whether `remote` exists.
    ///
    /// An http(s) probe URL is tried first. A 404 there is confirmed with
    /// `git ls-remote`, which sees private repositories through the
    /// credential helper.
    pub fn probe(&self, remote: &RemoteId) -> RemoteStatus {
        if let Some(url) = self.probe_url(remote) {
            match self.probe_http(&url) {
                RemoteStatus::Absent => {}
                other => return other,
            }
        }
        self.probe_git(remote)
    }

    fn probe_http(&self, url: &str) -> RemoteStatus {
        let client = match reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent("AutoStash")
            .build()
        {
            Ok(client) => client,
            Err(e) => return RemoteStatus::Unreachable(e.to_string()),
        };

        match client.get(url).send() {
            Ok(response) if response.status().is_success() => RemoteStatus::Present,
            Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                debug!("{} returned 404", url);
                RemoteStatus::Absent
            }
            Ok(response) => RemoteStatus::Unreachable(format!("HTTP {}", response.status())),
            Err(e) => RemoteStatus::Unreachable(e.to_string()),
        }
    }

    fn probe_git(&self, remote: &RemoteId) -> RemoteStatus {
        let url = self.repo_url(remote);
        match run_git(None, &["ls-remote", "--quiet", &url], self.timeout) {
            Ok(output) if output.success() => RemoteStatus::Present,
            Ok(output) => classify_ls_remote_failure(&output.stderr),
            Err(e) => RemoteStatus::Unreachable(e.to_string()),
        }
    }
}

fn classify_ls_remote_failure(stderr: &str) -> RemoteStatus {
    let lower = stderr.to_lowercase();
    let absent_markers = [
        "repository not found",
        "not found",
        "does not appear to be a git repository",
        "does not exist",
        "authentication failed",
        "terminal prompts disabled",
    ];
    if absent_markers.iter().any(|m| lower.contains(m)) {
        RemoteStatus::Absent
    } else {
        RemoteStatus::Unreachable(stderr.trim().to_string())
    }
}
