//! Event bus for cross-task communication
//!
//! The bus is the only sanctioned conduit for work produced on a background
//! worker to influence the single consumer task that runs subscribers (the
//! UI side of an embedding application). Producers publish from any task or
//! thread without blocking; a bounded FIFO queue caps memory; one drain task
//! dispatches events to subscribers in subscription order.
//!
//! # Usage
//!
//! ```rust,no_run
//! use vidflow::app::events::{Event, EventBus, EventKind, EventPayload};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! bus.start();
//!
//! let sub_id = bus.subscribe(EventKind::DownloadComplete, |event| {
//!     println!("completed: {:?}", event.payload);
//! });
//!
//! // From any worker:
//! bus.emit(EventPayload::DownloadFailed {
//!     task_id: vidflow::app::models::TaskId::new(),
//!     error: "Network error: connection reset".into(),
//! });
//!
//! bus.unsubscribe(sub_id);
//! bus.stop();
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::app::callbacks::CallbackScheduler;
use crate::app::models::{SearchHit, TaskId};
use crate::app::settings::SettingsSnapshot;
use crate::constants::bus;

/// Closed set of event kinds the core publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DownloadProgress,
    DownloadComplete,
    DownloadFailed,
    DownloadStopped,
    QueueUpdated,
    SettingsChanged,
    SearchComplete,
    SearchFailed,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DownloadProgress => "download_progress",
            Self::DownloadComplete => "download_complete",
            Self::DownloadFailed => "download_failed",
            Self::DownloadStopped => "download_stopped",
            Self::QueueUpdated => "queue_updated",
            Self::SettingsChanged => "settings_changed",
            Self::SearchComplete => "search_complete",
            Self::SearchFailed => "search_failed",
        };
        write!(f, "{name}")
    }
}

/// Queue mutation that triggered a `QueueUpdated` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Add,
    Remove,
    Update,
    Clear,
}

impl std::fmt::Display for QueueAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Update => "update",
            Self::Clear => "clear",
        };
        write!(f, "{name}")
    }
}

/// Tagged event payload; one variant per [`EventKind`]
#[derive(Debug, Clone)]
pub enum EventPayload {
    DownloadProgress {
        task_id: TaskId,
        progress: f64,
        downloaded_bytes: Option<u64>,
        total_bytes: Option<u64>,
    },
    DownloadComplete {
        task_id: TaskId,
        file_path: PathBuf,
    },
    DownloadFailed {
        task_id: TaskId,
        error: String,
    },
    DownloadStopped {
        task_id: TaskId,
        reason: String,
    },
    QueueUpdated {
        action: QueueAction,
        task_id: Option<TaskId>,
        task_count: usize,
    },
    SettingsChanged {
        changed_keys: Vec<String>,
        settings: SettingsSnapshot,
    },
    SearchComplete {
        query: String,
        results: Vec<SearchHit>,
        result_count: usize,
    },
    SearchFailed {
        query: String,
        error: String,
    },
}

impl EventPayload {
    /// The kind discriminant used for subscription lookup
    pub fn kind(&self) -> EventKind {
        match self {
            Self::DownloadProgress { .. } => EventKind::DownloadProgress,
            Self::DownloadComplete { .. } => EventKind::DownloadComplete,
            Self::DownloadFailed { .. } => EventKind::DownloadFailed,
            Self::DownloadStopped { .. } => EventKind::DownloadStopped,
            Self::QueueUpdated { .. } => EventKind::QueueUpdated,
            Self::SettingsChanged { .. } => EventKind::SettingsChanged,
            Self::SearchComplete { .. } => EventKind::SearchComplete,
            Self::SearchFailed { .. } => EventKind::SearchFailed,
        }
    }
}

/// An event in flight: immutable after publication
#[derive(Debug, Clone)]
pub struct Event {
    /// Kind-tagged payload
    pub payload: EventPayload,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Stamp a payload with the current time
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
        }
    }

    /// The kind discriminant of the payload
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Token required to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Tunable bus parameters
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Maximum queued events before publishes are dropped
    pub capacity: usize,
    /// Interval between drain ticks
    pub drain_interval: Duration,
    /// Maximum events dispatched per tick
    pub drain_batch_size: usize,
}

impl BusConfig {
    /// Configuration with short ticks for fast tests
    pub fn for_testing() -> Self {
        Self {
            drain_interval: Duration::from_millis(10),
            ..Self::default()
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: bus::QUEUE_CAPACITY,
            drain_interval: bus::DRAIN_INTERVAL,
            drain_batch_size: bus::DRAIN_BATCH_SIZE,
        }
    }
}

type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

tokio::task_local! {
    /// Set for the whole lifetime of a drain task; its presence marks the
    /// consumer context.
    static CONSUMER_CONTEXT: ();
}

/// Thread-safe event bus with a single consumer drain task
///
/// Cheap to clone; all clones share the same queue and listener registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    config: BusConfig,
    /// Bounded FIFO of undispatched events
    queue: Mutex<VecDeque<Event>>,
    /// Per-kind listener lists in subscription order; lock separate from the
    /// queue so publishing never contends with subscribe/unsubscribe
    listeners: Mutex<HashMap<EventKind, Vec<(SubscriptionId, Subscriber)>>>,
    next_subscription: AtomicU64,
    running: AtomicBool,
    /// Deferred UI callbacks executed at drain ticks
    scheduler: Arc<CallbackScheduler>,
}

impl EventBus {
    /// Create a bus with production defaults
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with custom parameters
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                queue: Mutex::new(VecDeque::new()),
                listeners: Mutex::new(HashMap::new()),
                next_subscription: AtomicU64::new(0),
                running: AtomicBool::new(false),
                scheduler: Arc::new(CallbackScheduler::new()),
            }),
        }
    }

    /// Publish an event from any task or thread.
    ///
    /// Non-blocking and best-effort: returns `false` and drops the event if
    /// the queue is full. Producers may log and coalesce on a `false` return.
    pub fn publish(&self, event: Event) -> bool {
        let kind = event.kind();
        {
            let mut queue = self.inner.queue.lock();
            if queue.len() >= self.inner.config.capacity {
                drop(queue);
                warn!(%kind, "event queue full, dropping event");
                return false;
            }
            queue.push_back(event);
        }
        debug!(%kind, "event published");
        true
    }

    /// Stamp and publish a payload; see [`EventBus::publish`]
    pub fn emit(&self, payload: EventPayload) -> bool {
        self.publish(Event::new(payload))
    }

    /// Register a callback for one event kind.
    ///
    /// The callback is only ever invoked on the consumer task, in
    /// subscription order relative to other subscribers of the same kind.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.inner.listeners.lock();
        listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        debug!(%kind, subscription = %id, "subscribed");
        id
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let mut found = false;
        listeners.retain(|kind, subs| {
            let before = subs.len();
            subs.retain(|(sub_id, _)| *sub_id != id);
            if subs.len() < before {
                found = true;
                debug!(%kind, subscription = %id, "unsubscribed");
            }
            !subs.is_empty()
        });
        if !found {
            warn!(subscription = %id, "subscription id not found");
        }
        found
    }

    /// Begin the drain loop. The spawned task is the consumer context.
    ///
    /// Calling `start` while the loop is already running is a no-op.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("event bus already running");
            return;
        }
        info!("event bus started");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(CONSUMER_CONTEXT.scope((), async move {
            let mut tick = tokio::time::interval(inner.config.drain_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while inner.running.load(Ordering::SeqCst) {
                tick.tick().await;
                inner.scheduler.run_due();
                inner.drain_once();
            }

            debug!("event bus drain loop exited");
        }));
    }

    /// Mark the bus inactive and clear pending events.
    ///
    /// The drain loop exits after the batch it is currently processing.
    /// Returns the number of cleared events.
    pub fn stop(&self) -> usize {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return 0;
        }
        let cleared = {
            let mut queue = self.inner.queue.lock();
            let cleared = queue.len();
            queue.clear();
            cleared
        };
        info!(cleared, "event bus stopped");
        cleared
    }

    /// Whether the drain loop is active
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Number of events waiting to be dispatched
    pub fn queue_size(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Number of live subscriptions, optionally restricted to one kind
    pub fn listener_count(&self, kind: Option<EventKind>) -> usize {
        let listeners = self.inner.listeners.lock();
        match kind {
            Some(kind) => listeners.get(&kind).map_or(0, Vec::len),
            None => listeners.values().map(Vec::len).sum(),
        }
    }

    /// Whether the caller is running inside the consumer drain task
    pub fn is_consumer_context(&self) -> bool {
        CONSUMER_CONTEXT.try_with(|_| ()).is_ok()
    }

    /// Scheduler shared with callback registries
    pub(crate) fn scheduler(&self) -> Arc<CallbackScheduler> {
        Arc::clone(&self.inner.scheduler)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("running", &self.is_running())
            .field("queue_size", &self.queue_size())
            .finish()
    }
}

impl BusInner {
    /// Dispatch up to one batch of events; runs on the consumer task only
    fn drain_once(&self) {
        let batch: Vec<Event> = {
            let mut queue = self.queue.lock();
            let take = queue.len().min(self.config.drain_batch_size);
            queue.drain(..take).collect()
        };

        if batch.is_empty() {
            return;
        }

        for event in &batch {
            self.dispatch(event);
        }
        debug!(processed = batch.len(), "drained events");
    }

    /// Invoke every live subscriber for an event's kind
    fn dispatch(&self, event: &Event) {
        let kind = event.kind();
        let subscribers: Vec<(SubscriptionId, Subscriber)> = {
            let listeners = self.listeners.lock();
            listeners.get(&kind).cloned().unwrap_or_default()
        };

        if subscribers.is_empty() {
            debug!(%kind, "no listeners for event");
            return;
        }

        for (id, callback) in subscribers {
            // A panicking subscriber must not interrupt the drain
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(event)));
            if outcome.is_err() {
                error!(subscription = %id, %kind, "subscriber panicked during dispatch");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn test_bus() -> EventBus {
        EventBus::with_config(BusConfig::for_testing())
    }

    fn progress_payload(task_id: TaskId, progress: f64) -> EventPayload {
        EventPayload::DownloadProgress {
            task_id,
            progress,
            downloaded_bytes: None,
            total_bytes: None,
        }
    }

    async fn settle(bus: &EventBus) {
        // A few drain ticks at the testing interval
        sleep(bus.inner.config.drain_interval * 10).await;
    }

    #[tokio::test]
    async fn test_publish_and_dispatch() {
        let bus = test_bus();
        bus.start();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        bus.subscribe(EventKind::DownloadProgress, move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.emit(progress_payload(TaskId::new(), 50.0)));
        settle(&bus).await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.queue_size(), 0);
        bus.stop();
    }

    #[tokio::test]
    async fn test_fifo_order_per_producer() {
        let bus = test_bus();
        bus.start();

        let observed = Arc::new(Mutex::new(Vec::new()));
        let observed_clone = Arc::clone(&observed);
        bus.subscribe(EventKind::DownloadProgress, move |event| {
            if let EventPayload::DownloadProgress { progress, .. } = event.payload {
                observed_clone.lock().push(progress);
            }
        });

        let task_id = TaskId::new();
        for i in 0..50 {
            assert!(bus.emit(progress_payload(task_id, i as f64)));
        }
        settle(&bus).await;

        let observed = observed.lock().clone();
        assert_eq!(observed.len(), 50);
        let mut sorted = observed.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(observed, sorted);
        bus.stop();
    }

    #[tokio::test]
    async fn test_bounded_queue_reports_full() {
        let bus = EventBus::new(); // capacity 1000, never started
        let task_id = TaskId::new();

        let mut accepted = 0;
        let mut dropped = 0;
        for i in 0..1500 {
            if bus.emit(progress_payload(task_id, (i % 100) as f64)) {
                accepted += 1;
            } else {
                dropped += 1;
            }
        }

        assert_eq!(accepted, 1000);
        assert_eq!(dropped, 500);
        assert_eq!(bus.queue_size(), 1000);
    }

    #[tokio::test]
    async fn test_stop_clears_queue_and_reports_count() {
        let bus = test_bus();
        bus.start();
        // Let the drain task come up, then flood without letting it run
        settle(&bus).await;

        for _ in 0..5 {
            bus.emit(progress_payload(TaskId::new(), 1.0));
        }
        let cleared = bus.stop();
        assert!(cleared <= 5);
        assert_eq!(bus.queue_size(), 0);
        assert!(!bus.is_running());
        // stop on a stopped bus is a no-op
        assert_eq!(bus.stop(), 0);
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let bus = test_bus();
        bus.start();
        bus.start();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        bus.subscribe(EventKind::DownloadComplete, move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(EventPayload::DownloadComplete {
            task_id: TaskId::new(),
            file_path: PathBuf::from("/tmp/x.mp4"),
        });
        settle(&bus).await;

        // Exactly one drain loop dispatched the event once
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        bus.stop();
    }

    #[tokio::test]
    async fn test_unsubscribe_prevents_delivery() {
        let bus = test_bus();
        bus.start();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let id = bus.subscribe(EventKind::DownloadStopped, move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.listener_count(Some(EventKind::DownloadStopped)), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(None), 0);

        bus.emit(EventPayload::DownloadStopped {
            task_id: TaskId::new(),
            reason: "stopped by user".into(),
        });
        settle(&bus).await;

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        bus.stop();
    }

    #[tokio::test]
    async fn test_unsubscribed_between_enqueue_and_dispatch() {
        let bus = test_bus();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let id = bus.subscribe(EventKind::DownloadFailed, move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Enqueue while the drain loop is not running, then unsubscribe
        bus.emit(EventPayload::DownloadFailed {
            task_id: TaskId::new(),
            error: "Network error: timeout".into(),
        });
        bus.unsubscribe(id);

        bus.start();
        settle(&bus).await;

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        bus.stop();
    }

    #[tokio::test]
    async fn test_panicking_subscriber_does_not_break_drain() {
        let bus = test_bus();
        bus.start();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        bus.subscribe(EventKind::DownloadProgress, |_| {
            panic!("subscriber bug");
        });
        bus.subscribe(EventKind::DownloadProgress, move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(progress_payload(TaskId::new(), 10.0));
        bus.emit(progress_payload(TaskId::new(), 20.0));
        settle(&bus).await;

        // Both events reached the healthy subscriber despite the panic
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        bus.stop();
    }

    #[tokio::test]
    async fn test_subscribers_run_on_consumer_task() {
        let bus = test_bus();
        bus.start();

        let on_consumer = Arc::new(AtomicBool::new(false));
        let on_consumer_clone = Arc::clone(&on_consumer);
        let bus_clone = bus.clone();
        bus.subscribe(EventKind::QueueUpdated, move |_| {
            on_consumer_clone.store(bus_clone.is_consumer_context(), Ordering::SeqCst);
        });

        // Publisher is definitely not the consumer
        assert!(!bus.is_consumer_context());
        bus.emit(EventPayload::QueueUpdated {
            action: QueueAction::Add,
            task_id: None,
            task_count: 1,
        });
        settle(&bus).await;

        assert!(on_consumer.load(Ordering::SeqCst));
        bus.stop();
    }
}
