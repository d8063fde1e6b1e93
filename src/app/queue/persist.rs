//! Queue persistence: resume snapshots, export/import, URL lists
//!
//! All documents share the persistence envelope: one JSON object per file
//! with a top-level `version` integer; unknown fields on the envelope and on
//! individual records survive a load/store round trip.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::models::{DownloadStatus, DownloadTask, TaskId, VideoDescriptor};
use crate::constants::files;
use crate::errors::QueueResult;

use super::core::QueueStore;

fn default_schema_version() -> u32 {
    files::SCHEMA_VERSION
}

/// Persisted form of one resumable task
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingTaskRecord {
    id: TaskId,
    url: String,
    title: String,
    author: String,
    thumbnail_url: String,
    duration_seconds: u64,
    selected_quality: String,
    filename: String,
    download_subtitles: bool,
    download_path: PathBuf,
    status: DownloadStatus,
    progress: f64,
    created_at: DateTime<Utc>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl PendingTaskRecord {
    fn from_task(task: &DownloadTask) -> Self {
        Self {
            id: task.id,
            url: task.descriptor.url.clone(),
            title: task.descriptor.title.clone(),
            author: task.descriptor.author.clone(),
            thumbnail_url: task.descriptor.thumbnail_url.clone(),
            duration_seconds: task.descriptor.duration_seconds,
            selected_quality: task.descriptor.selected_quality.clone(),
            filename: task.descriptor.filename_hint.clone(),
            download_subtitles: task.descriptor.download_subtitles,
            download_path: task.download_path.clone(),
            status: task.status,
            progress: task.progress,
            created_at: task.created_at,
            extra: serde_json::Map::new(),
        }
    }

    /// Rebuild a task, revalidating the descriptor.
    ///
    /// A `downloading` record resumes as `queued` at zero progress.
    fn into_task(self) -> QueueResult<DownloadTask> {
        let descriptor = VideoDescriptor::builder(self.url)
            .title(self.title)
            .author(self.author)
            .thumbnail_url(self.thumbnail_url)
            .duration_seconds(self.duration_seconds)
            .selected_quality(self.selected_quality)
            .filename_hint(self.filename)
            .download_subtitles(self.download_subtitles)
            .build()?;

        let (status, progress) = match self.status {
            DownloadStatus::Downloading => (DownloadStatus::Queued, 0.0),
            other => (other, self.progress.clamp(0.0, 100.0)),
        };

        Ok(DownloadTask {
            id: self.id,
            descriptor,
            status,
            progress,
            download_path: self.download_path,
            created_at: self.created_at,
            completed_at: None,
            error_message: None,
        })
    }
}

/// Versioned document holding an array of task records
#[derive(Debug, Serialize, Deserialize)]
struct QueueDocument {
    #[serde(default = "default_schema_version")]
    version: u32,
    #[serde(default)]
    tasks: Vec<PendingTaskRecord>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl QueueDocument {
    fn new(tasks: Vec<PendingTaskRecord>) -> Self {
        Self {
            version: files::SCHEMA_VERSION,
            tasks,
            extra: serde_json::Map::new(),
        }
    }
}

fn write_document(target: &Path, document: &QueueDocument) -> QueueResult<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(document)?;
    std::fs::write(target, contents)?;
    Ok(())
}

fn read_document(source: &Path) -> QueueResult<QueueDocument> {
    let contents = std::fs::read_to_string(source)?;
    Ok(serde_json::from_str(&contents)?)
}

impl QueueStore {
    /// Write every resumable task (Queued, Downloading, Stopped) to `target`.
    ///
    /// When nothing is resumable the snapshot file is removed instead, so a
    /// later process does not offer an empty resume.
    pub fn snapshot_pending(&self, target: &Path) -> QueueResult<()> {
        let records: Vec<PendingTaskRecord> = self
            .tasks
            .lock()
            .iter()
            .filter(|t| {
                matches!(
                    t.status,
                    DownloadStatus::Queued | DownloadStatus::Downloading | DownloadStatus::Stopped
                )
            })
            .map(PendingTaskRecord::from_task)
            .collect();

        if records.is_empty() {
            if target.exists() {
                std::fs::remove_file(target)?;
            }
            return Ok(());
        }

        let count = records.len();
        write_document(target, &QueueDocument::new(records))?;
        info!(count, path = %target.display(), "pending downloads snapshotted");
        Ok(())
    }

    /// Read and validate a pending snapshot.
    ///
    /// Invalid records are skipped with a warning; a missing file yields an
    /// empty list. Loaded tasks are not inserted; pass them to
    /// [`QueueStore::restore`].
    pub fn load_pending(&self, source: &Path) -> QueueResult<Vec<DownloadTask>> {
        if !source.exists() {
            return Ok(Vec::new());
        }

        let document = read_document(source)?;
        let mut tasks = Vec::with_capacity(document.tasks.len());
        for record in document.tasks {
            match record.into_task() {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(error = %e, "skipping invalid pending task record"),
            }
        }
        Ok(tasks)
    }

    /// Export the whole queue to `target` in the snapshot schema
    pub fn export(&self, target: &Path) -> QueueResult<()> {
        let records: Vec<PendingTaskRecord> = self
            .tasks
            .lock()
            .iter()
            .map(PendingTaskRecord::from_task)
            .collect();
        let count = records.len();
        write_document(target, &QueueDocument::new(records))?;
        info!(count, path = %target.display(), "queue exported");
        Ok(())
    }

    /// Import tasks from an exported document as fresh queued tasks.
    ///
    /// Duplicate URLs and invalid records are skipped. Returns the number of
    /// tasks added.
    pub fn import(&self, source: &Path) -> QueueResult<usize> {
        let document = read_document(source)?;

        let mut imported = 0;
        for record in document.tasks {
            let download_path = record.download_path.clone();
            let descriptor = match record.into_task() {
                Ok(task) => task.descriptor,
                Err(e) => {
                    warn!(error = %e, "skipping invalid import record");
                    continue;
                }
            };
            if self.add(descriptor, download_path).is_ok() {
                imported += 1;
            }
        }
        info!(imported, path = %source.display(), "queue imported");
        Ok(imported)
    }

    /// Add one task per `http(s)` URL line in a text file.
    ///
    /// Blank lines, non-URL lines, and duplicates are skipped. Returns the
    /// number of tasks added.
    pub fn add_urls_from_file(
        &self,
        source: &Path,
        download_path: impl Into<PathBuf>,
    ) -> QueueResult<usize> {
        let contents = std::fs::read_to_string(source)?;
        let download_path = download_path.into();

        let mut added = 0;
        for line in contents.lines() {
            let url = line.trim();
            if !url.starts_with("http://") && !url.starts_with("https://") {
                continue;
            }
            let Ok(descriptor) = VideoDescriptor::new(url) else {
                continue;
            };
            if self.add(descriptor, download_path.clone()).is_ok() {
                added += 1;
            }
        }
        Ok(added)
    }
}
