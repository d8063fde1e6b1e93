//! Safe deferred callbacks for consumer-side state
//!
//! UI objects in an embedding application schedule delayed work on the
//! consumer task (refreshes, debounced updates). A [`CallbackRegistry`] is
//! composed into each such object: it tracks every live handle and cancels
//! them all when the object is torn down, so late deliveries can never touch
//! destroyed state. Scheduled closures only ever execute on the event bus's
//! consumer task, at drain ticks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::app::events::EventBus;
use crate::errors::{CallbackError, CallbackResult};

/// One deferred closure waiting for its tick
struct ScheduledCallback {
    due: Instant,
    cancelled: Arc<AtomicBool>,
    torn_down: Arc<AtomicBool>,
    callback: Box<dyn FnOnce() + Send>,
}

/// Timer list executed by the consumer drain task
///
/// Shared between the event bus (which runs it) and every callback registry
/// (which feeds it).
pub(crate) struct CallbackScheduler {
    entries: Mutex<Vec<ScheduledCallback>>,
}

impl CallbackScheduler {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, entry: ScheduledCallback) {
        self.entries.lock().push(entry);
    }

    /// Execute every due entry. Runs on the consumer task only.
    pub(crate) fn run_due(&self) -> usize {
        let now = Instant::now();
        let due: Vec<ScheduledCallback> = {
            let mut entries = self.entries.lock();
            let mut extracted = Vec::new();
            let mut i = 0;
            while i < entries.len() {
                if entries[i].due <= now {
                    extracted.push(entries.remove(i));
                } else {
                    i += 1;
                }
            }
            extracted
        };

        let mut executed = 0;
        for entry in due {
            if entry.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            if entry.torn_down.load(Ordering::SeqCst) {
                // The target went away between scheduling and execution
                debug!("skipping callback for torn-down consumer");
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(entry.callback));
            if outcome.is_err() {
                error!("scheduled callback panicked");
            }
            executed += 1;
        }
        executed
    }
}

/// Handle to one scheduled callback
///
/// An invalid handle is returned when scheduling is attempted after
/// teardown; cancelling it does nothing.
#[derive(Debug, Clone)]
pub struct CallbackHandle {
    cancelled: Option<Arc<AtomicBool>>,
}

impl CallbackHandle {
    fn live(flag: Arc<AtomicBool>) -> Self {
        Self {
            cancelled: Some(flag),
        }
    }

    fn invalid() -> Self {
        Self { cancelled: None }
    }

    /// Whether this handle refers to a callback that was actually scheduled
    pub fn is_valid(&self) -> bool {
        self.cancelled.is_some()
    }

    /// Prevent the callback from running if it has not run yet
    pub fn cancel(&self) {
        if let Some(flag) = &self.cancelled {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Per-consumer registry of deferred callbacks
pub struct CallbackRegistry {
    bus: EventBus,
    torn_down: Arc<AtomicBool>,
    handles: Mutex<Vec<CallbackHandle>>,
    strict: bool,
}

impl CallbackRegistry {
    /// Create a registry bound to a bus's consumer task
    pub fn new(bus: &EventBus) -> Self {
        Self::with_strict_mode(bus, false)
    }

    /// Create a registry that rejects cross-task scheduling.
    ///
    /// In strict mode, scheduling from anywhere but the consumer task
    /// returns [`CallbackError::ThreadSafetyViolation`] instead of silently
    /// going through. Meant for debug builds of the embedding application.
    pub fn with_strict_mode(bus: &EventBus, strict: bool) -> Self {
        Self {
            bus: bus.clone(),
            torn_down: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
            strict,
        }
    }

    /// Schedule `f` to run on the consumer task after `delay`.
    ///
    /// Returns an invalid handle (and does nothing) if the consumer has
    /// already been torn down.
    pub fn schedule_after<F>(&self, delay: Duration, f: F) -> CallbackResult<CallbackHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(delay, f, "schedule_after")
    }

    /// Schedule `f` to run at the next consumer quiescent point
    pub fn schedule_idle<F>(&self, f: F) -> CallbackResult<CallbackHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(Duration::ZERO, f, "schedule_idle")
    }

    fn schedule<F>(&self, delay: Duration, f: F, operation: &str) -> CallbackResult<CallbackHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.strict && !self.bus.is_consumer_context() {
            error!(operation, "callback scheduled from outside the consumer task");
            return Err(CallbackError::ThreadSafetyViolation {
                operation: operation.to_string(),
            });
        }

        if self.torn_down.load(Ordering::SeqCst) {
            debug!(operation, "ignoring schedule on torn-down consumer");
            return Ok(CallbackHandle::invalid());
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        self.bus.scheduler().push(ScheduledCallback {
            due: Instant::now() + delay,
            cancelled: Arc::clone(&cancelled),
            torn_down: Arc::clone(&self.torn_down),
            callback: Box::new(f),
        });

        let handle = CallbackHandle::live(cancelled);
        self.handles.lock().push(handle.clone());
        Ok(handle)
    }

    /// Cancel every live handle and mark the consumer torn down.
    ///
    /// Subsequent scheduling is a no-op. Idempotent.
    pub fn cleanup_callbacks(&self) {
        // Mark torn down before cancelling so nothing new slips in
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let handles = {
            let mut handles = self.handles.lock();
            std::mem::take(&mut *handles)
        };
        let cancelled = handles.len();
        for handle in handles {
            handle.cancel();
        }

        if cancelled > 0 {
            info!(cancelled, "cleaned up consumer callbacks");
        }
    }

    /// Whether `cleanup_callbacks` has been called
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Number of handles issued and not yet cleaned up
    pub fn tracked_callback_count(&self) -> usize {
        self.handles.lock().len()
    }
}

impl Drop for CallbackRegistry {
    fn drop(&mut self) {
        self.cleanup_callbacks();
    }
}
