//! Core runtime components
//!
//! This module contains the orchestration runtime: the event bus and its
//! consumer task, the worker pool registry, the queue / settings / history
//! stores, the download and search services, and the capability traits the
//! embedding application implements.

pub mod callbacks;
pub mod events;
pub mod fetch;
pub mod history;
pub mod models;
pub mod notify;
pub mod pools;
pub mod queue;
pub mod search;
pub mod service;
pub mod settings;

// Re-export the main public API
pub use callbacks::{CallbackHandle, CallbackRegistry};
pub use events::{
    BusConfig, Event, EventBus, EventKind, EventPayload, QueueAction, SubscriptionId,
};
pub use fetch::{
    MediaDescription, MediaFetcher, NotificationDelivery, ProgressSink, ProgressUpdate,
    SearchBackend, SearchFilters,
};
pub use history::{HistoryStatistics, HistoryStore};
pub use models::{
    DownloadStatus, DownloadTask, HistoryEntry, SearchHit, TaskId, VideoDescriptor,
};
pub use notify::NotificationRelay;
pub use pools::{CompletionHandle, PoolConfig, PoolRegistry, WorkerPool};
pub use queue::QueueStore;
pub use search::SearchService;
pub use service::{CancelToken, DownloadService};
pub use settings::{DownloadMode, SettingsSnapshot, SettingsStore, Theme};
