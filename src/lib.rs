//! vidflow
//!
//! The concurrent download-orchestration runtime behind a desktop video
//! downloader. The GUI shell, the concrete media extractor, and the search
//! provider live outside this crate; vidflow owns the coordination between
//! long-running background work and a single-threaded reactive frontend.
//!
//! # Key Components
//!
//! - **Event bus** delivering cross-task messages to one consumer task with
//!   bounded memory and FIFO ordering per producer
//! - **Worker pool registry** owning the bounded download and search pools
//!   with a coordinated shutdown protocol
//! - **Queue store** of download tasks: deduplication, enforced status
//!   transitions, and durable resume snapshots
//! - **Download service** driving a per-task state machine with cooperative
//!   cancellation and throttled progress reporting
//! - **Settings store** with atomic reads/writes, persist-on-mutation, and
//!   change notification
//! - **Safe callback registry** cancelling deferred UI callbacks when their
//!   consumer is torn down
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vidflow::prelude::*;
//!
//! # use std::path::{Path, PathBuf};
//! # struct MyFetcher;
//! # #[async_trait::async_trait]
//! # impl vidflow::app::fetch::MediaFetcher for MyFetcher {
//! #     async fn describe(&self, _: &str) -> vidflow::errors::FetchResult<vidflow::app::fetch::MediaDescription> { unimplemented!() }
//! #     async fn fetch(&self, _: &VideoDescriptor, _: &Path, _: &vidflow::app::fetch::ProgressSink) -> vidflow::errors::FetchResult<PathBuf> { unimplemented!() }
//! #     async fn fetch_with_subtitles(&self, _: &VideoDescriptor, _: &Path, _: &vidflow::app::fetch::ProgressSink) -> vidflow::errors::FetchResult<PathBuf> { unimplemented!() }
//! # }
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let paths = StoragePaths::default_os()?;
//!     let bus = EventBus::new();
//!     bus.start();
//!
//!     let settings = Arc::new(SettingsStore::new(&paths, bus.clone()));
//!     let queue = Arc::new(QueueStore::new(bus.clone()));
//!     let history = Arc::new(HistoryStore::new(&paths));
//!     let pools = Arc::new(PoolRegistry::new());
//!     let service = DownloadService::new(
//!         Arc::clone(&queue),
//!         Arc::clone(&history),
//!         Arc::clone(&settings),
//!         Arc::clone(&pools),
//!         bus.clone(),
//!         Arc::new(MyFetcher),
//!     );
//!
//!     let descriptor = VideoDescriptor::new("https://example.com/v/1")?;
//!     let task = queue.add(descriptor, settings.get_download_directory())?;
//!     service.start(task.id);
//!
//!     // ... on shutdown:
//!     service.stop_all();
//!     pools.shutdown(std::time::Duration::from_secs(10)).await;
//!     queue.snapshot_pending(&paths.pending_file())?;
//!     bus.stop();
//!     Ok(())
//! }
//! ```

// Core modules
pub mod app;
pub mod config;
pub mod constants;
pub mod errors;

// Prelude module for convenient imports
pub mod prelude;

// Re-export the most commonly used types at the top level
pub use errors::{AppError, Result};

pub use app::{
    // Orchestration
    CallbackRegistry,
    CancelToken,
    DownloadService,
    // Cross-task messaging
    Event,
    EventBus,
    EventKind,
    EventPayload,
    // Stores
    HistoryStore,
    PoolRegistry,
    QueueStore,
    SearchService,
    SettingsStore,
    // Data types
    DownloadStatus,
    DownloadTask,
    HistoryEntry,
    TaskId,
    VideoDescriptor,
};

pub use config::StoragePaths;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "vidflow");
    }

    #[test]
    fn test_public_api_accessibility() {
        // Key types are reachable from the crate root
        let bus = EventBus::new();
        assert_eq!(bus.queue_size(), 0);

        let descriptor = VideoDescriptor::new("https://example.com/v").unwrap();
        assert_eq!(descriptor.selected_quality, "best");

        let registry = PoolRegistry::new();
        assert!(!registry.is_shut_down());
    }
}
