//! Prelude for the vidflow runtime
//!
//! Re-exports the items needed for typical embedding with a single
//! `use vidflow::prelude::*;` statement.

// Core result types
pub use crate::errors::{AppError, FetchError, FetchErrorKind, Result};

// Essential runtime components
pub use crate::app::{
    BusConfig,
    CallbackRegistry,
    CancelToken,
    DownloadService,
    Event,
    EventBus,
    EventKind,
    EventPayload,
    HistoryStore,
    PoolRegistry,
    QueueStore,
    SearchService,
    SettingsStore,
};

// Data types
pub use crate::app::{
    DownloadStatus, DownloadTask, HistoryEntry, SearchHit, TaskId, VideoDescriptor,
};

// Capability traits implemented by the embedder
pub use crate::app::{MediaFetcher, NotificationDelivery, SearchBackend, SearchFilters};

// Storage locations
pub use crate::config::StoragePaths;

// Standard library re-exports that are commonly needed
pub use std::sync::Arc;
