//! Download task registry
//!
//! This module provides the thread-safe store of download tasks: locked
//! mutations with URL deduplication, status transitions enforced by the
//! task state machine, and durable snapshotting for crash-recovery resume.
//!
//! # Features
//!
//! - **Deduplication**: at most one live task per URL, enforced atomically
//!   under the store lock
//! - **Status transitions**: `update_status` is the only status mutator and
//!   rejects illegal transitions; terminal states are sticky
//! - **Snapshots**: pending tasks persist to a versioned JSON document and
//!   resume as `Queued` in a later process lifetime
//! - **Bulk transfer**: queue export/import and plain URL-list loading

pub mod core;
pub mod persist;

pub use core::QueueStore;
