//! Download service
//!
//! Owns the decision of whether and when each task runs, how its progress is
//! driven, and how it terminates. One worker per active task is submitted to
//! the download pool; a cancellation token per active task is the only way
//! to interrupt it. The service lock guards the `active` and `cancel` maps
//! and is held only for short map operations.

pub mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::app::events::EventBus;
use crate::app::fetch::MediaFetcher;
use crate::app::history::HistoryStore;
use crate::app::models::{DownloadStatus, TaskId};
use crate::app::pools::{CompletionHandle, PoolRegistry};
use crate::app::queue::QueueStore;
use crate::app::settings::SettingsStore;

/// One-shot cooperative cancellation flag
///
/// The service sets it, the worker reads it at every progress checkpoint.
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Maps guarded by the service lock
#[derive(Default)]
pub(crate) struct ServiceState {
    pub(crate) active: HashMap<TaskId, CompletionHandle>,
    pub(crate) cancel: HashMap<TaskId, CancelToken>,
}

/// Everything a worker needs, cloned into its future
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) queue: Arc<QueueStore>,
    pub(crate) history: Arc<HistoryStore>,
    pub(crate) settings: Arc<SettingsStore>,
    pub(crate) bus: EventBus,
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    pub(crate) state: Arc<Mutex<ServiceState>>,
}

/// Orchestrates the lifecycle of every download task
pub struct DownloadService {
    pools: Arc<PoolRegistry>,
    ctx: WorkerContext,
}

impl DownloadService {
    /// Wire the service to its collaborators
    pub fn new(
        queue: Arc<QueueStore>,
        history: Arc<HistoryStore>,
        settings: Arc<SettingsStore>,
        pools: Arc<PoolRegistry>,
        bus: EventBus,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Self {
        Self {
            pools,
            ctx: WorkerContext {
                queue,
                history,
                settings,
                bus,
                fetcher,
                state: Arc::new(Mutex::new(ServiceState::default())),
            },
        }
    }

    /// Start a download for a queued task.
    ///
    /// Returns `false` when the task does not exist, is already active, or
    /// the download pool refuses the submission. The check-and-record of the
    /// active entry is atomic under the service lock, so two racing starts
    /// of the same task submit exactly one worker.
    pub fn start(&self, task_id: TaskId) -> bool {
        let Some(task) = self.ctx.queue.get(task_id) else {
            warn!(%task_id, "cannot start unknown task");
            return false;
        };
        if task.status != DownloadStatus::Queued {
            warn!(%task_id, status = %task.status, "only queued tasks can be started");
            return false;
        }

        let pool = match self.pools.download_pool() {
            Ok(pool) => pool,
            Err(e) => {
                warn!(%task_id, error = %e, "download pool unavailable");
                return false;
            }
        };

        // Holding the lock across the spawn also delays the worker's
        // completion cleanup until both maps are populated.
        let mut state = self.ctx.state.lock();
        if state.active.contains_key(&task_id) {
            warn!(%task_id, "task is already downloading");
            return false;
        }

        let token = CancelToken::new();
        let url = task.descriptor.url.clone();
        match pool.spawn(worker::run(self.ctx.clone(), task, token.clone())) {
            Ok(handle) => {
                state.active.insert(task_id, handle);
                state.cancel.insert(task_id, token);
                info!(%task_id, %url, "download started");
                true
            }
            Err(e) => {
                warn!(%task_id, error = %e, "could not submit download worker");
                false
            }
        }
    }

    /// Request cancellation of an active download.
    ///
    /// Returns `true` when a token was set; the worker transitions the task
    /// to Stopped at its next progress checkpoint. Returns `false` when the
    /// task has no recorded token (not active).
    pub fn stop(&self, task_id: TaskId) -> bool {
        {
            let state = self.ctx.state.lock();
            if let Some(token) = state.cancel.get(&task_id) {
                token.set();
                info!(%task_id, "stop requested");
                return true;
            }
        }
        warn!(%task_id, "cannot stop task: not active");
        false
    }

    /// Set every recorded cancellation token; returns how many were set
    pub fn stop_all(&self) -> usize {
        let state = self.ctx.state.lock();
        for token in state.cancel.values() {
            token.set();
        }
        let stopped = state.cancel.len();
        if stopped > 0 {
            info!(stopped, "stop requested for all active downloads");
        }
        stopped
    }

    /// Start every task currently in Queued status.
    ///
    /// A task that fails to start does not affect the others. Returns the
    /// number of workers submitted.
    pub fn start_all_queued(&self) -> usize {
        let queued = self.ctx.queue.by_status(DownloadStatus::Queued);
        if queued.is_empty() {
            info!("no queued tasks to start");
            return 0;
        }

        let total = queued.len();
        let mut started = 0;
        for task in queued {
            if self.start(task.id) {
                started += 1;
            }
        }
        info!(started, total, "queued downloads started");
        started
    }

    /// Number of currently active downloads
    pub fn active_count(&self) -> usize {
        self.ctx.state.lock().active.len()
    }
}
