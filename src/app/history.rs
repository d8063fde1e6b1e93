//! Download history
//!
//! Append-only record of completed downloads, most recent first, capped at
//! 1000 entries and persisted to `download_history.json` after every change.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::models::{DownloadTask, HistoryEntry};
use crate::config::StoragePaths;
use crate::constants::{files, history};

fn default_schema_version() -> u32 {
    files::SCHEMA_VERSION
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryDocument {
    #[serde(default = "default_schema_version")]
    version: u32,
    #[serde(default)]
    entries: Vec<HistoryEntry>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Aggregate numbers over the whole history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStatistics {
    pub total_downloads: usize,
    pub total_bytes: u64,
}

/// Persistent store of completed downloads
pub struct HistoryStore {
    path: PathBuf,
    inner: Mutex<Vec<HistoryEntry>>,
}

impl HistoryStore {
    /// Load history from disk; an unreadable file yields an empty history
    pub fn new(paths: &StoragePaths) -> Self {
        let path = paths.history_file();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<HistoryDocument>(&contents) {
                Ok(document) => document.entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "history file invalid, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self {
            path,
            inner: Mutex::new(entries),
        }
    }

    /// Record a completed task.
    ///
    /// The entry is prepended (most recent first); the oldest entries beyond
    /// the cap are dropped. Persistence failures keep the in-memory record.
    pub fn record(&self, task: &DownloadTask, file_path: &Path, size_bytes: u64) -> HistoryEntry {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            descriptor: task.descriptor.clone(),
            file_path: file_path.to_path_buf(),
            completed_at: task.completed_at.unwrap_or_else(chrono::Utc::now),
            size_bytes,
        };

        {
            let mut entries = self.inner.lock();
            entries.insert(0, entry.clone());
            entries.truncate(history::MAX_ENTRIES);
        }
        self.persist();

        info!(url = %entry.descriptor.url, path = %entry.file_path.display(), "download recorded in history");
        entry
    }

    /// Every entry, most recent first
    pub fn all(&self) -> Vec<HistoryEntry> {
        self.inner.lock().clone()
    }

    /// The `limit` most recent entries
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let entries = self.inner.lock();
        entries.iter().take(limit).cloned().collect()
    }

    /// Entries whose title contains `query` (case-insensitive)
    pub fn search(&self, query: &str) -> Vec<HistoryEntry> {
        let query = query.to_lowercase();
        self.inner
            .lock()
            .iter()
            .filter(|e| e.descriptor.title.to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    /// Remove one entry by id; returns whether it existed
    pub fn remove(&self, id: Uuid) -> bool {
        let removed = {
            let mut entries = self.inner.lock();
            let before = entries.len();
            entries.retain(|e| e.id != id);
            entries.len() < before
        };
        if removed {
            self.persist();
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.inner.lock().clear();
        self.persist();
    }

    /// Aggregate counts over the history
    pub fn statistics(&self) -> HistoryStatistics {
        let entries = self.inner.lock();
        HistoryStatistics {
            total_downloads: entries.len(),
            total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
        }
    }

    fn persist(&self) {
        let document = HistoryDocument {
            version: files::SCHEMA_VERSION,
            entries: self.inner.lock().clone(),
            extra: serde_json::Map::new(),
        };

        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(&document)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(&self.path, contents)
        })();

        match result {
            Ok(()) => debug!(path = %self.path.display(), "history persisted"),
            Err(e) => error!(path = %self.path.display(), error = %e, "failed to persist history"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::VideoDescriptor;
    use tempfile::TempDir;

    fn task(url: &str, title: &str) -> DownloadTask {
        let descriptor = VideoDescriptor::builder(url).title(title).build().unwrap();
        let mut task = DownloadTask::new(descriptor, "/tmp");
        task.completed_at = Some(chrono::Utc::now());
        task
    }

    #[test]
    fn test_record_is_most_recent_first() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(&StoragePaths::with_root(temp.path()));

        store.record(&task("https://x/1", "first"), Path::new("/tmp/1.mp4"), 100);
        store.record(&task("https://x/2", "second"), Path::new("/tmp/2.mp4"), 200);

        let all = store.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].descriptor.title, "second");
        assert_eq!(all[1].descriptor.title, "first");
    }

    #[test]
    fn test_reload_round_trip() {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::with_root(temp.path());
        {
            let store = HistoryStore::new(&paths);
            store.record(&task("https://x/1", "kept"), Path::new("/tmp/1.mp4"), 512);
        }
        let store = HistoryStore::new(&paths);
        let all = store.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].descriptor.title, "kept");
        assert_eq!(all[0].size_bytes, 512);
    }

    #[test]
    fn test_recent_and_search() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(&StoragePaths::with_root(temp.path()));

        for i in 0..5 {
            store.record(
                &task(&format!("https://x/{i}"), &format!("video {i}")),
                Path::new("/tmp/v.mp4"),
                10,
            );
        }

        assert_eq!(store.recent(2).len(), 2);
        assert_eq!(store.recent(2)[0].descriptor.title, "video 4");
        assert_eq!(store.search("VIDEO 3").len(), 1);
        assert!(store.search("nothing").is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(&StoragePaths::with_root(temp.path()));

        let entry = store.record(&task("https://x/1", "t"), Path::new("/tmp/1.mp4"), 10);
        assert!(store.remove(entry.id));
        assert!(!store.remove(entry.id));

        store.record(&task("https://x/2", "t"), Path::new("/tmp/2.mp4"), 10);
        store.clear();
        assert!(store.all().is_empty());
    }

    #[test]
    fn test_statistics() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(&StoragePaths::with_root(temp.path()));

        store.record(&task("https://x/1", "a"), Path::new("/tmp/1.mp4"), 100);
        store.record(&task("https://x/2", "b"), Path::new("/tmp/2.mp4"), 250);

        let stats = store.statistics();
        assert_eq!(stats.total_downloads, 2);
        assert_eq!(stats.total_bytes, 350);
    }

    #[test]
    fn test_entry_cap() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(&StoragePaths::with_root(temp.path()));

        // Insert directly to avoid 1000+ disk writes in the test
        {
            let mut entries = store.inner.lock();
            for i in 0..history::MAX_ENTRIES {
                entries.push(HistoryEntry {
                    id: Uuid::new_v4(),
                    descriptor: VideoDescriptor::new(format!("https://x/{i}")).unwrap(),
                    file_path: PathBuf::from("/tmp/v.mp4"),
                    completed_at: chrono::Utc::now(),
                    size_bytes: 1,
                });
            }
        }

        store.record(&task("https://x/new", "newest"), Path::new("/tmp/n.mp4"), 1);

        let all = store.all();
        assert_eq!(all.len(), history::MAX_ENTRIES);
        assert_eq!(all[0].descriptor.title, "newest");
    }
}
