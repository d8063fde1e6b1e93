//! Worker pools and the pool registry
//!
//! The registry owns the two named, bounded pools the runtime submits work
//! to: one for downloads, one for searches, each capped at three concurrent
//! workers. Pools are created lazily (the initializer runs at most once even
//! under races) and torn down together through a bounded shutdown protocol:
//! no new work is accepted, in-flight workers are expected to observe their
//! cancellation tokens, and workers that ignore them past the deadline are
//! abandoned to the runtime.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::constants::pools;
use crate::errors::{PoolError, PoolResult};

/// Static parameters of one pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Log-name prefix for workers of this pool
    pub name: &'static str,
    /// Maximum concurrently running workers
    pub max_workers: usize,
}

impl PoolConfig {
    /// Production download pool: 3 workers
    pub fn download() -> Self {
        Self {
            name: pools::DOWNLOAD_WORKER_PREFIX,
            max_workers: pools::MAX_DOWNLOAD_WORKERS,
        }
    }

    /// Production search pool: 3 workers
    pub fn search() -> Self {
        Self {
            name: pools::SEARCH_WORKER_PREFIX,
            max_workers: pools::MAX_SEARCH_WORKERS,
        }
    }
}

/// Observable handle to one submitted unit of work
#[derive(Debug)]
pub struct CompletionHandle {
    abort: AbortHandle,
}

impl CompletionHandle {
    /// Whether the worker has finished (successfully or not)
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    /// Forcibly abort the worker. Cooperative cancellation via the task's
    /// token is always preferred; this exists for emergency teardown only.
    pub fn abort(&self) {
        self.abort.abort();
    }
}

/// A named pool bounding how many submitted futures run at once
pub struct WorkerPool {
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    accepting: AtomicBool,
    next_worker: AtomicU64,
}

impl WorkerPool {
    fn new(config: PoolConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        Self {
            config,
            semaphore,
            handles: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
            next_worker: AtomicU64::new(0),
        }
    }

    /// Pool name prefix
    pub fn name(&self) -> &'static str {
        self.config.name
    }

    /// Submit work to the pool.
    ///
    /// The future is spawned immediately but waits for one of the pool's
    /// permits before its body runs, so at most `max_workers` bodies execute
    /// concurrently. Fails once shutdown has begun.
    pub fn spawn<F>(&self, work: F) -> PoolResult<CompletionHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(PoolError::ShuttingDown {
                pool: self.config.name,
            });
        }

        let worker = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let name = self.config.name;
        let semaphore = Arc::clone(&self.semaphore);

        let handle = tokio::spawn(async move {
            let worker_name = format!("{name}-{worker}");
            let Ok(_permit) = semaphore.acquire_owned().await else {
                debug!(worker = %worker_name, "pool closed before start");
                return;
            };
            debug!(worker = %worker_name, "worker started");
            work.await;
            debug!(worker = %worker_name, "worker finished");
        });

        let completion = CompletionHandle {
            abort: handle.abort_handle(),
        };

        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(completion)
    }

    /// Number of workers currently holding an execution permit
    pub fn running_workers(&self) -> usize {
        self.config
            .max_workers
            .saturating_sub(self.semaphore.available_permits())
    }

    fn begin_shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    fn take_handles(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.handles.lock())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.config.name)
            .field("max_workers", &self.config.max_workers)
            .field("accepting", &self.accepting.load(Ordering::SeqCst))
            .finish()
    }
}

/// Registry owning the download and search pools
pub struct PoolRegistry {
    download_config: PoolConfig,
    search_config: PoolConfig,
    download: OnceCell<WorkerPool>,
    search: OnceCell<WorkerPool>,
    shut_down: AtomicBool,
}

impl PoolRegistry {
    /// Registry with production pool sizes
    pub fn new() -> Self {
        Self::with_configs(PoolConfig::download(), PoolConfig::search())
    }

    /// Registry with custom pool parameters (tests, embedder tuning)
    pub fn with_configs(download: PoolConfig, search: PoolConfig) -> Self {
        Self {
            download_config: download,
            search_config: search,
            download: OnceCell::new(),
            search: OnceCell::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// The download pool, created on first access
    pub fn download_pool(&self) -> PoolResult<&WorkerPool> {
        self.pool(&self.download, &self.download_config)
    }

    /// The search pool, created on first access
    pub fn search_pool(&self) -> PoolResult<&WorkerPool> {
        self.pool(&self.search, &self.search_config)
    }

    fn pool<'a>(
        &self,
        cell: &'a OnceCell<WorkerPool>,
        config: &PoolConfig,
    ) -> PoolResult<&'a WorkerPool> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(PoolError::RegistryShutDown);
        }
        Ok(cell.get_or_init(|| {
            info!(
                pool = config.name,
                max_workers = config.max_workers,
                "worker pool created"
            );
            WorkerPool::new(config.clone())
        }))
    }

    /// Shut down both pools.
    ///
    /// No new work is accepted from the moment this is called; in-flight
    /// workers are awaited up to `timeout`. Returns `true` when every worker
    /// exited in time, `false` otherwise (stragglers keep running detached).
    /// Idempotent: repeated calls return `true` immediately.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("pool shutdown already initiated");
            return true;
        }
        info!(timeout_ms = timeout.as_millis() as u64, "shutting down worker pools");

        let mut handles = Vec::new();
        for pool in [self.download.get(), self.search.get()].into_iter().flatten() {
            pool.begin_shutdown();
            handles.extend(pool.take_handles());
        }

        if handles.is_empty() {
            info!("worker pools shut down (no in-flight work)");
            return true;
        }

        let worker_count = handles.len();
        match tokio::time::timeout(timeout, join_all(handles)).await {
            Ok(results) => {
                let panicked = results.iter().filter(|r| r.is_err()).count();
                if panicked > 0 {
                    warn!(panicked, "workers terminated abnormally during shutdown");
                }
                info!(worker_count, "all workers exited");
                true
            }
            Err(_) => {
                warn!(
                    worker_count,
                    "pool shutdown timed out, abandoning uncooperative workers"
                );
                false
            }
        }
    }

    /// Whether shutdown has been initiated
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
