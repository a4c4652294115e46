//! Config module - AutoStash configuration (autostash.toml).
//!
//! The config file holds:
//! - The ordered list of folders to back up
//! - The remote repository (`owner/name`) and how to reach it
//! - Backup options and the fixed on-disk locations

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options that decide which optional steps a backup runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupOptions {
    /// Copy the allow-listed system files into `system_config/`
    #[serde(default)]
    pub include_system_files: bool,
    /// Produce an encrypted bundle of the mirror after pushing
    #[serde(default)]
    pub encrypt: bool,
}

/// Hosting endpoint the remote identifier is resolved against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Clone/pull/push URL, `{remote}` is replaced by `owner/name`
    #[serde(default = "default_url_template")]
    pub url_template: String,
    /// Web page checked by the existence probe (http(s) hosts only, empty disables it)
    #[serde(default = "default_probe_template")]
    pub probe_template: String,
    /// Upper bound for any single network operation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_url_template() -> String {
    "https://github.com/{remote}.git".to_string()
}

fn default_probe_template() -> String {
    "https://github.com/{remote}".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            probe_template: default_probe_template(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn probe_template(&self) -> Option<&str> {
        Some(self.probe_template.trim()).filter(|t| !t.is_empty())
    }
}

/// Fixed, process-wide locations. Other tooling may read these directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Local working copy of the remote
    #[serde(default = "default_mirror_dir")]
    pub mirror_dir: PathBuf,
    /// Destination of `restore`, wiped on every restore
    #[serde(default = "default_restore_dir")]
    pub restore_dir: PathBuf,
    /// Last-success marker, history log, error log and bundles
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_mirror_dir() -> PathBuf {
    home_dir().join(".autostash_repo")
}

fn default_restore_dir() -> PathBuf {
    home_dir().join("autostash_restore")
}

fn default_state_dir() -> PathBuf {
    home_dir().join(".autostash")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            mirror_dir: default_mirror_dir(),
            restore_dir: default_restore_dir(),
            state_dir: default_state_dir(),
        }
    }
}

impl PathsConfig {
    /// All paths rooted under one directory (handy for tests and portable installs).
    pub fn under(root: &Path) -> Self {
        Self {
            mirror_dir: root.join("repo"),
            restore_dir: root.join("restore"),
            state_dir: root.join("state"),
        }
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.state_dir.join("bundles")
    }
}

/// Main AutoStash configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Config version (for future migrations)
    #[serde(default = "default_version")]
    pub version: u32,

    /// Folders to back up, in backup order
    #[serde(default)]
    pub folders: Vec<PathBuf>,

    /// Remote repository as `owner/name`
    #[serde(default)]
    pub remote: Option<String>,

    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    #[serde(default)]
    pub options: BackupOptions,

    #[serde(default)]
    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

fn default_version() -> u32 {
    1
}

fn default_commit_message() -> String {
    "AutoStash Backup".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            folders: Vec::new(),
            remote: None,
            commit_message: default_commit_message(),
            options: BackupOptions::default(),
            endpoint: EndpointConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

/// Default config directory (~/.config/autostash/)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("autostash"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default config file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("autostash.toml")
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Cannot parse {}: {}", path.display(), e)))
    }

    /// Load config from `path`, falling back to defaults if the file does not exist yet
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from the default location
    pub fn load_default() -> Result<Self> {
        Self::load_or_default(&default_config_path())
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Cannot create {}: {}", parent.display(), e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Cannot serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Cannot write {}: {}", path.display(), e)))
    }

    /// Save config to the default location
    pub fn save_default(&self) -> Result<PathBuf> {
        let path = default_config_path();
        self.save(&path)?;
        Ok(path)
    }

    /// Add a folder to the backup list. Returns false if it was already listed.
    pub fn add_folder(&mut self, folder: PathBuf) -> bool {
        if self.folders.contains(&folder) {
            return false;
        }
        self.folders.push(folder);
        true
    }

    /// Remove a folder from the backup list. Returns false if it was not listed.
    pub fn remove_folder(&mut self, folder: &Path) -> bool {
        let before = self.folders.len();
        self.folders.retain(|f| f != folder);
        self.folders.len() != before
    }

    pub fn set_remote(&mut self, remote: String) {
        self.remote = Some(remote);
    }

    /// Whether a backup can run without extra arguments
    pub fn is_initialized(&self) -> bool {
        self.remote.is_some() && !self.folders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, 1);
        assert!(!config.is_initialized());
        assert!(!config.options.encrypt);
        assert_eq!(config.commit_message, "AutoStash Backup");
        assert_eq!(config.endpoint.url_template, "https://github.com/{remote}.git");
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("autostash.toml");

        let mut config = Config::new();
        config.set_remote("user/backups".to_string());
        config.add_folder(PathBuf::from("/home/user/Documents"));
        config.options.include_system_files = true;
        config.save(&config_path)?;

        let loaded = Config::load(&config_path)?;
        assert!(loaded.is_initialized());
        assert_eq!(loaded.remote.as_deref(), Some("user/backups"));
        assert_eq!(loaded.folders, vec![PathBuf::from("/home/user/Documents")]);
        assert!(loaded.options.include_system_files);

        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("autostash.toml");
        std::fs::write(&config_path, "folders = [\"/srv/data\"]\n").unwrap();

        let config = Config::load(&config_path)?;
        assert_eq!(config.folders.len(), 1);
        assert!(config.remote.is_none());
        assert_eq!(config.endpoint.timeout_secs, 300);

        Ok(())
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("autostash.toml");
        std::fs::write(&config_path, "folders = 42").unwrap();

        let err = Config::load(&config_path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_folder_list_dedup() {
        let mut config = Config::new();
        assert!(config.add_folder(PathBuf::from("/a")));
        assert!(config.add_folder(PathBuf::from("/b")));
        assert!(!config.add_folder(PathBuf::from("/a")));
        assert_eq!(config.folders, vec![PathBuf::from("/a"), PathBuf::from("/b")]);

        assert!(config.remove_folder(Path::new("/a")));
        assert!(!config.remove_folder(Path::new("/a")));
        assert_eq!(config.folders, vec![PathBuf::from("/b")]);
    }

    #[test]
    fn test_missing_file_loads_defaults() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_or_default(&temp_dir.path().join("absent.toml"))?;
        assert!(config.folders.is_empty());
        Ok(())
    }
}
