//! Data models for vidflow
//!
//! This module defines the core data structures used throughout the runtime:
//! the immutable video descriptor, the mutable download task with its status
//! state machine, completed-download history entries, and search hits.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ModelError;

/// Opaque, stable identifier of a download task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh task id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a descriptor or search-hit URL
fn validate_url(url: &str) -> Result<(), ModelError> {
    if url.is_empty() {
        return Err(ModelError::EmptyUrl);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ModelError::InvalidUrl {
            url: url.to_string(),
        });
    }
    Ok(())
}

/// Immutable description of what to fetch
///
/// Validation is enforced at construction; once built, a descriptor never
/// changes. Workers receive descriptors by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    /// Source URL, always http:// or https://
    pub url: String,
    /// Video title as reported by the extractor
    pub title: String,
    /// Uploader or channel name
    pub author: String,
    /// Duration in seconds
    pub duration_seconds: u64,
    /// Thumbnail URL, may be empty
    pub thumbnail_url: String,
    /// Qualities the extractor offers, best first
    pub available_qualities: Vec<String>,
    /// Quality the user picked; "best" when unspecified
    pub selected_quality: String,
    /// Preferred output file stem
    pub filename_hint: String,
    /// Whether subtitles should be fetched alongside the media
    pub download_subtitles: bool,
}

impl VideoDescriptor {
    /// Create a minimal descriptor for a URL with all other fields defaulted
    pub fn new(url: impl Into<String>) -> Result<Self, ModelError> {
        Self::builder(url).build()
    }

    /// Start building a descriptor for the given URL
    pub fn builder(url: impl Into<String>) -> VideoDescriptorBuilder {
        VideoDescriptorBuilder {
            url: url.into(),
            title: String::new(),
            author: String::new(),
            duration_seconds: 0,
            thumbnail_url: String::new(),
            available_qualities: Vec::new(),
            selected_quality: "best".to_string(),
            filename_hint: String::new(),
            download_subtitles: false,
        }
    }
}

/// Builder for [`VideoDescriptor`]
#[derive(Debug, Clone)]
pub struct VideoDescriptorBuilder {
    url: String,
    title: String,
    author: String,
    duration_seconds: u64,
    thumbnail_url: String,
    available_qualities: Vec<String>,
    selected_quality: String,
    filename_hint: String,
    download_subtitles: bool,
}

impl VideoDescriptorBuilder {
    /// Set the video title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the uploader name
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Set the duration in seconds
    pub fn duration_seconds(mut self, seconds: u64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    /// Set the thumbnail URL
    pub fn thumbnail_url(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = url.into();
        self
    }

    /// Set the offered quality list, best first
    pub fn available_qualities(mut self, qualities: Vec<String>) -> Self {
        self.available_qualities = qualities;
        self
    }

    /// Set the quality to download
    pub fn selected_quality(mut self, quality: impl Into<String>) -> Self {
        self.selected_quality = quality.into();
        self
    }

    /// Set the preferred output file stem
    pub fn filename_hint(mut self, hint: impl Into<String>) -> Self {
        self.filename_hint = hint.into();
        self
    }

    /// Request subtitles alongside the media
    pub fn download_subtitles(mut self, enabled: bool) -> Self {
        self.download_subtitles = enabled;
        self
    }

    /// Validate and build the descriptor
    pub fn build(self) -> Result<VideoDescriptor, ModelError> {
        validate_url(&self.url)?;
        Ok(VideoDescriptor {
            url: self.url,
            title: self.title,
            author: self.author,
            duration_seconds: self.duration_seconds,
            thumbnail_url: self.thumbnail_url,
            available_qualities: self.available_qualities,
            selected_quality: self.selected_quality,
            filename_hint: self.filename_hint,
            download_subtitles: self.download_subtitles,
        })
    }
}

/// Lifecycle status of a download task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Waiting for the service to submit a worker
    Queued,
    /// A worker is actively fetching the media
    Downloading,
    /// Terminal: the media was produced
    Completed,
    /// Terminal: the worker reported a non-cancel error
    Failed,
    /// Terminal: the worker observed its cancellation token
    Stopped,
}

impl DownloadStatus {
    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Whether the state machine permits moving to `target`
    ///
    /// `Downloading -> Downloading` is allowed so workers can write progress
    /// through the same mutation path as real transitions.
    pub fn can_transition_to(&self, target: DownloadStatus) -> bool {
        match self {
            Self::Queued => matches!(target, Self::Downloading | Self::Stopped),
            Self::Downloading => matches!(
                target,
                Self::Downloading | Self::Completed | Self::Failed | Self::Stopped
            ),
            Self::Completed | Self::Failed | Self::Stopped => false,
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// A download task owned by the queue store
///
/// Only the queue store mutates `status`, `progress`, and the terminal
/// bookkeeping fields; everyone else works with copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Stable identifier assigned at creation
    pub id: TaskId,
    /// What to fetch
    pub descriptor: VideoDescriptor,
    /// Current lifecycle status
    pub status: DownloadStatus,
    /// Progress percentage in [0.0, 100.0]
    pub progress: f64,
    /// Directory the media is written into
    pub download_path: PathBuf,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task completed, if it did
    pub completed_at: Option<DateTime<Utc>>,
    /// Classified error message, present when status is Failed
    pub error_message: Option<String>,
}

impl DownloadTask {
    /// Create a fresh queued task for a descriptor
    pub fn new(descriptor: VideoDescriptor, download_path: impl Into<PathBuf>) -> Self {
        Self {
            id: TaskId::new(),
            descriptor,
            status: DownloadStatus::Queued,
            progress: 0.0,
            download_path: download_path.into(),
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }
}

/// Immutable record of a completed download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// History record id (distinct from the task id)
    pub id: Uuid,
    /// What was fetched
    pub descriptor: VideoDescriptor,
    /// Final media path on disk
    pub file_path: PathBuf,
    /// When the download completed
    pub completed_at: DateTime<Utc>,
    /// Size of the produced file in bytes
    pub size_bytes: u64,
}

/// One result row returned by a search backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Media URL, validated like descriptor URLs
    pub url: String,
    /// Result title
    pub title: String,
    /// Uploader or channel name
    pub author: String,
    /// Duration in seconds when the backend knows it
    pub duration_seconds: u64,
    /// Thumbnail URL, may be empty
    pub thumbnail_url: String,
}

impl SearchHit {
    /// Create a validated search hit
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        duration_seconds: u64,
        thumbnail_url: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let url = url.into();
        validate_url(&url)?;
        Ok(Self {
            url,
            title: title.into(),
            author: author.into(),
            duration_seconds,
            thumbnail_url: thumbnail_url.into(),
        })
    }
}
