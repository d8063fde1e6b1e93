//! Storage path resolution for vidflow
//!
//! All durable state lives as JSON documents under an OS-appropriate config
//! base (`~/.config/vidflow` on Unix-like systems). The root is overridable
//! so tests and embedders can redirect persistence to a scratch directory.

use std::path::{Path, PathBuf};

use crate::constants::files;
use crate::errors::AppError;

/// Resolved locations of the persistence files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    /// Resolve the default per-user config directory for this application
    pub fn default_os() -> crate::errors::Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| AppError::generic("could not determine OS config directory"))?;
        Ok(Self {
            root: base.join(files::APP_DIR_NAME),
        })
    }

    /// Use an explicit root directory (tests, portable installs)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory holding all persisted documents
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet
    pub fn ensure_exists(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Path of the settings snapshot
    pub fn settings_file(&self) -> PathBuf {
        self.root.join(files::SETTINGS_FILE)
    }

    /// Path of the pending-download resume snapshot
    pub fn pending_file(&self) -> PathBuf {
        self.root.join(files::PENDING_FILE)
    }

    /// Path of the download history
    pub fn history_file(&self) -> PathBuf {
        self.root.join(files::HISTORY_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_paths_under_root() {
        let paths = StoragePaths::with_root("/tmp/vf-test");
        assert_eq!(paths.settings_file(), PathBuf::from("/tmp/vf-test/settings.json"));
        assert_eq!(
            paths.pending_file(),
            PathBuf::from("/tmp/vf-test/pending_downloads.json")
        );
        assert_eq!(
            paths.history_file(),
            PathBuf::from("/tmp/vf-test/download_history.json")
        );
    }

    #[test]
    fn test_ensure_exists_creates_root() {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::with_root(temp.path().join("nested/config"));
        paths.ensure_exists().unwrap();
        assert!(paths.root().is_dir());
    }
}
