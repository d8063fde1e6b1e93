//! Collaborator capabilities consumed by the runtime
//!
//! The concrete media extractor, search provider, and notification channel
//! live outside this crate. The runtime only sees the capability traits
//! defined here; implementations are injected by the embedding application.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::app::models::{SearchHit, VideoDescriptor};
use crate::errors::FetchResult;

/// One progress checkpoint reported by a fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Bytes written so far
    pub downloaded_bytes: u64,
    /// Total bytes or the fetcher's estimate, when known
    pub total_bytes: Option<u64>,
}

/// Callback a fetcher must invoke at every progress checkpoint.
///
/// Returning `Err` instructs the fetcher to abort the transfer; this is the
/// only way a blocked worker can be interrupted, so fetchers are expected to
/// call the sink frequently.
pub type ProgressSink = dyn Fn(ProgressUpdate) -> FetchResult<()> + Send + Sync;

/// What a URL resolves to
#[derive(Debug, Clone)]
pub enum MediaDescription {
    /// A single video
    Video(VideoDescriptor),
    /// A playlist of videos
    Playlist {
        title: String,
        entries: Vec<VideoDescriptor>,
    },
}

/// Media extraction engine
///
/// Errors surface as [`FetchError`](crate::errors::FetchError) carrying the
/// engine's raw message; the worker folds them into the bounded taxonomy.
/// When subtitles were requested and only subtitle acquisition failed,
/// implementations must return
/// [`FetchError::SubtitleUnavailable`](crate::errors::FetchError::SubtitleUnavailable)
/// with the produced media path so the non-fatal rule can apply.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Resolve a URL into a video or playlist description
    async fn describe(&self, url: &str) -> FetchResult<MediaDescription>;

    /// Download the media described by `descriptor` into `dir`.
    ///
    /// Returns the path of the produced file.
    async fn fetch(
        &self,
        descriptor: &VideoDescriptor,
        dir: &Path,
        sink: &ProgressSink,
    ) -> FetchResult<PathBuf>;

    /// Download the media plus subtitles when available
    async fn fetch_with_subtitles(
        &self,
        descriptor: &VideoDescriptor,
        dir: &Path,
        sink: &ProgressSink,
    ) -> FetchResult<PathBuf>;
}

/// Search filters understood by a backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    /// Maximum number of hits to return
    pub max_results: Option<usize>,
    /// Only return hits at most this long
    pub max_duration_seconds: Option<u64>,
}

/// Search provider invoked from the search pool
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run a query and return matching hits
    async fn search(&self, query: &str, filters: &SearchFilters) -> FetchResult<Vec<SearchHit>>;
}

/// Desktop notification channel. Best-effort: implementations must never
/// block and should swallow their own delivery failures.
pub trait NotificationDelivery: Send + Sync {
    fn notify(&self, summary: &str, body: &str);
}
