//! Application constants for vidflow
//!
//! This module centralizes all constants used throughout the runtime,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Event bus configuration
pub mod bus {
    use super::Duration;

    /// Maximum number of queued events before publishes are dropped
    pub const QUEUE_CAPACITY: usize = 1000;

    /// Interval between drain ticks on the consumer task
    pub const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

    /// Maximum events dispatched per drain tick
    pub const DRAIN_BATCH_SIZE: usize = 100;
}

/// Worker pool configuration
pub mod pools {
    /// Maximum concurrent download workers
    pub const MAX_DOWNLOAD_WORKERS: usize = 3;

    /// Maximum concurrent search workers
    pub const MAX_SEARCH_WORKERS: usize = 3;

    /// Log-name prefix for download workers
    pub const DOWNLOAD_WORKER_PREFIX: &str = "download-worker";

    /// Log-name prefix for search workers
    pub const SEARCH_WORKER_PREFIX: &str = "search-worker";
}

/// Progress reporting
pub mod progress {
    /// Integer percentage step between published progress events
    pub const THROTTLE_STEP_PERCENT: f64 = 5.0;
}

/// Download service behavior
pub mod service {
    /// Canonical reason recorded when a task is stopped by the user
    pub const STOP_REASON: &str = "stopped by user";
}

/// Persistence files and schema
pub mod files {
    /// Directory name under the OS config base
    pub const APP_DIR_NAME: &str = "vidflow";

    /// Settings snapshot file
    pub const SETTINGS_FILE: &str = "settings.json";

    /// Pending-download resume file
    pub const PENDING_FILE: &str = "pending_downloads.json";

    /// Completed-download history file
    pub const HISTORY_FILE: &str = "download_history.json";

    /// Current top-level schema version for all persisted documents
    pub const SCHEMA_VERSION: u32 = 1;
}

/// Download history limits
pub mod history {
    /// Maximum retained history entries (most recent first)
    pub const MAX_ENTRIES: usize = 1000;
}

// Re-export commonly used constants for convenience
pub use bus::{DRAIN_BATCH_SIZE, DRAIN_INTERVAL, QUEUE_CAPACITY};
pub use files::{APP_DIR_NAME, SCHEMA_VERSION};
pub use pools::{MAX_DOWNLOAD_WORKERS, MAX_SEARCH_WORKERS};
pub use service::STOP_REASON;
