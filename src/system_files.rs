//! Optional capture of a fixed allow-list of system configuration files.
//!
//! These are the only paths ever read outside the caller's folders. The list
//! is a constant on purpose: nothing here discovers files dynamically.
//! Every failure in this step is per file and non-fatal.

use crate::error::{Error, IoResultExt, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Subdirectory of the mirror that receives captured files.
pub const SYSTEM_CONFIG_DIR: &str = "system_config";

/// Allow-listed system files.
pub const DEFAULT_SYSTEM_FILES: &[&str] = &[
    "/etc/fstab",
    "/etc/hosts",
    "/etc/hostname",
    "/etc/passwd",
    "/etc/group",
    "/etc/shadow",
    "/etc/sudoers",
    "/etc/crontab",
    "/etc/ssh/sshd_config",
];

/// A file that could not be captured.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub error: Error,
}

/// What one capture pass did.
#[derive(Debug, Default)]
pub struct SystemCapture {
    pub copied: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

/// The set of files to capture. Defaults to [`DEFAULT_SYSTEM_FILES`].
#[derive(Debug, Clone)]
pub struct SystemFiles {
    paths: Vec<PathBuf>,
}

impl Default for SystemFiles {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_FILES.iter().map(PathBuf::from))
    }
}

impl SystemFiles {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Copy every listed file to `mirror_root/system_config/<path>`.
    ///
    /// Never fails as a whole: unreadable files are logged and reported in
    /// [`SystemCapture::skipped`].
    pub fn capture(&self, mirror_root: &Path) -> SystemCapture {
        let base = mirror_root.join(SYSTEM_CONFIG_DIR);
        let mut report = SystemCapture::default();

        for path in &self.paths {
            let dest = base.join(strip_root(path));
            match copy_one(path, &dest) {
                Ok(()) => {
                    debug!("Captured {}", path.display());
                    report.copied.push(path.clone());
                }
                Err(error) => {
                    warn!("Skipping system file {}: {}", path.display(), error);
                    report.skipped.push(SkippedFile {
                        path: path.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            "System files: {} copied, {} skipped",
            report.copied.len(),
            report.skipped.len()
        );
        report
    }
}

/// `/etc/ssh/sshd_config` -> `etc/ssh/sshd_config`
fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

fn copy_one(src: &Path, dest: &Path) -> Result<()> {
    // Read first so a permission failure leaves no empty file behind
    let bytes = fs::read(src).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => Error::Permission {
            path: src.to_path_buf(),
            source: e,
        },
        _ => Error::io(src, e),
    })?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).at_path(parent)?;
    }
    fs::write(dest, bytes).at_path(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_list_is_absolute() {
        for path in SystemFiles::default().paths() {
            assert!(path.is_absolute(), "{} must be absolute", path.display());
        }
    }

    #[test]
    fn test_strip_root() {
        assert_eq!(
            strip_root(Path::new("/etc/ssh/sshd_config")),
            PathBuf::from("etc/ssh/sshd_config")
        );
    }

    #[test]
    fn test_capture_copies_and_skips_missing() {
        let temp = TempDir::new().unwrap();
        let etc = temp.path().join("etc");
        fs::create_dir_all(&etc).unwrap();
        fs::write(etc.join("hosts"), "127.0.0.1 localhost\n").unwrap();

        let files = SystemFiles::new(vec![etc.join("hosts"), etc.join("missing")]);
        let mirror = temp.path().join("mirror");
        let report = files.capture(&mirror);

        assert_eq!(report.copied, vec![etc.join("hosts")]);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0].error, Error::Io { .. }));

        let captured = mirror.join(SYSTEM_CONFIG_DIR).join(strip_root(&etc.join("hosts")));
        assert_eq!(
            fs::read_to_string(captured).unwrap(),
            "127.0.0.1 localhost\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_permission_skip() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let secret = temp.path().join("shadow");
        fs::write(&secret, "root:*:19000::::::\n").unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores file modes; nothing to assert there
        if fs::read(&secret).is_ok() {
            return;
        }

        let report = SystemFiles::new(vec![secret.clone()]).capture(&temp.path().join("mirror"));
        assert!(report.copied.is_empty());
        assert!(matches!(report.skipped[0].error, Error::Permission { .. }));
        assert!(!temp
            .path()
            .join("mirror")
            .join(SYSTEM_CONFIG_DIR)
            .join(strip_root(&secret))
            .exists());
    }
}
