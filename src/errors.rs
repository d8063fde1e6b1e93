//! Error types for vidflow
//!
//! This module defines the error types for all components of the runtime,
//! plus the bounded fetch-error taxonomy and its classifier. Errors are
//! designed to be actionable and to carry enough context for logging and
//! user feedback.

use std::path::PathBuf;

use thiserror::Error;

use crate::app::models::{DownloadStatus, TaskId};

/// Bounded taxonomy for errors surfaced by a media fetcher
///
/// Raw fetcher messages are folded into this closed variant space before
/// they reach the UI or the queue. `Cancelled` is modeled distinctly from
/// failure so user-initiated stops are never counted as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Connectivity problems: timeouts, unreachable hosts, dropped connections
    Network,
    /// Login-gated or private content
    Authentication,
    /// Requested format or quality cannot be produced
    Format,
    /// Metadata or stream extraction failed
    Extraction,
    /// The worker observed its cancellation token
    Cancelled,
    /// Anything that did not come out of the fetcher message space
    Other,
}

impl FetchErrorKind {
    /// Classify a raw fetcher error message into the taxonomy.
    ///
    /// Pure and deterministic: the same message always yields the same kind.
    /// Messages that match none of the keyword sets are extraction failures,
    /// since that is what an extractor most often reports free-form.
    pub fn classify(message: &str) -> Self {
        const NETWORK: &[&str] = &["network", "connection", "timeout", "unreachable"];
        const AUTHENTICATION: &[&str] = &["login", "private", "members-only"];
        const FORMAT: &[&str] = &["format", "quality", "unavailable"];

        let lower = message.to_lowercase();
        if NETWORK.iter().any(|kw| lower.contains(kw)) {
            Self::Network
        } else if AUTHENTICATION.iter().any(|kw| lower.contains(kw)) {
            Self::Authentication
        } else if FORMAT.iter().any(|kw| lower.contains(kw)) {
            Self::Format
        } else {
            Self::Extraction
        }
    }

    /// Human-readable message template for this kind, wrapping the raw text.
    ///
    /// This is what ends up in `DownloadFailed` payloads; the UI may map it
    /// to localized text.
    pub fn describe(&self, raw: &str) -> String {
        match self {
            Self::Network => format!("Network error: {raw}"),
            Self::Authentication => format!("Authentication required: {raw}"),
            Self::Format => format!("Requested format not available: {raw}"),
            Self::Extraction => format!("Could not extract media: {raw}"),
            Self::Cancelled => "Stopped by user".to_string(),
            Self::Other => format!("Download failed: {raw}"),
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Authentication => "authentication",
            Self::Format => "format",
            Self::Extraction => "extraction",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// Errors surfaced by a [`MediaFetcher`](crate::app::fetch::MediaFetcher)
/// or produced by the download worker around it
#[derive(Error, Debug)]
pub enum FetchError {
    /// The cancellation token was observed at a progress checkpoint
    #[error("download cancelled")]
    Cancelled,

    /// Subtitles could not be fetched but the main media artifact exists.
    ///
    /// The fetcher reports this structurally instead of encoding it in a
    /// message, so the subtitle-non-fatal rule never has to sniff strings.
    #[error("subtitles unavailable for {}: {message}", media_path.display())]
    SubtitleUnavailable { media_path: PathBuf, message: String },

    /// Raw fetcher failure; the message is classified via [`FetchErrorKind`]
    #[error("{message}")]
    Failed { message: String },
}

impl FetchError {
    /// Construct a raw fetcher failure from a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Fold this error into the bounded taxonomy
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Cancelled => FetchErrorKind::Cancelled,
            Self::SubtitleUnavailable { .. } => FetchErrorKind::Format,
            Self::Failed { message } => FetchErrorKind::classify(message),
        }
    }
}

/// Validation errors for the immutable data model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Descriptor URL was empty
    #[error("URL cannot be empty")]
    EmptyUrl,

    /// Descriptor URL did not start with http:// or https://
    #[error("URL must start with http:// or https://: {url}")]
    InvalidUrl { url: String },
}

/// Queue store errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// A live task already represents this URL
    #[error("URL already in queue: {url}")]
    DuplicateUrl { url: String },

    /// No task with the given id exists
    #[error("task not found: {id}")]
    TaskNotFound { id: TaskId },

    /// The requested status change is not permitted by the state machine
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: DownloadStatus,
        to: DownloadStatus,
    },

    /// Snapshot or import document could not be parsed
    #[error("invalid queue document")]
    InvalidDocument(#[from] serde_json::Error),

    /// I/O error during snapshot, export, or import
    #[error("queue persistence I/O error")]
    Io(#[from] std::io::Error),

    /// Descriptor validation failed while rebuilding a task
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Worker pool and registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool no longer accepts work
    #[error("{pool} pool is shutting down and no longer accepts work")]
    ShuttingDown { pool: &'static str },

    /// The registry has been shut down; pools are gone
    #[error("worker pool registry has been shut down")]
    RegistryShutDown,
}

/// Settings store errors
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Key is not part of the settings schema
    #[error("unknown settings key: {key}")]
    UnknownKey { key: String },

    /// Value failed schema validation for its key
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// Snapshot could not be serialized or parsed
    #[error("invalid settings document")]
    InvalidDocument(#[from] serde_json::Error),

    /// I/O error persisting the snapshot
    #[error("settings persistence I/O error")]
    Io(#[from] std::io::Error),
}

/// Safe-callback registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// Strict mode: scheduling was attempted off the consumer task
    #[error("UI callback '{operation}' scheduled from outside the consumer task")]
    ThreadSafetyViolation { operation: String },
}

/// Top-level application error that can represent any component error
#[derive(Error, Debug)]
pub enum AppError {
    /// Model validation error
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Queue store error
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Worker pool error
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Settings store error
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Callback registry error
    #[error(transparent)]
    Callback(#[from] CallbackError),

    /// Fetcher error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Model(_) => "model",
            AppError::Queue(_) => "queue",
            AppError::Pool(_) => "pool",
            AppError::Settings(_) => "settings",
            AppError::Callback(_) => "callback",
            AppError::Fetch(_) => "fetch",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Queue result type alias
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Pool result type alias
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Settings result type alias
pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Callback result type alias
pub type CallbackResult<T> = std::result::Result<T, CallbackError>;
