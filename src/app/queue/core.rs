//! Core queue store implementation
//!
//! All public operations acquire the single store lock; readers receive
//! copies. Every mutation publishes a `QueueUpdated` event while the lock is
//! held, so event order always matches mutation order.

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::app::events::{EventBus, EventPayload, QueueAction};
use crate::app::models::{DownloadStatus, DownloadTask, TaskId, VideoDescriptor};
use crate::errors::{QueueError, QueueResult};

/// Thread-safe registry of download tasks
pub struct QueueStore {
    bus: EventBus,
    pub(super) tasks: Mutex<Vec<DownloadTask>>,
}

impl QueueStore {
    /// Create an empty store publishing onto `bus`
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Append a queued task for `descriptor`.
    ///
    /// Fails with [`QueueError::DuplicateUrl`] when a live task already
    /// represents the descriptor's URL. The duplicate check and the insert
    /// happen atomically under the store lock.
    pub fn add(
        &self,
        descriptor: VideoDescriptor,
        download_path: impl Into<std::path::PathBuf>,
    ) -> QueueResult<DownloadTask> {
        let task = {
            let mut tasks = self.tasks.lock();
            if tasks.iter().any(|t| t.descriptor.url == descriptor.url) {
                return Err(QueueError::DuplicateUrl {
                    url: descriptor.url,
                });
            }
            let task = DownloadTask::new(descriptor, download_path);
            tasks.push(task.clone());
            self.bus.emit(EventPayload::QueueUpdated {
                action: QueueAction::Add,
                task_id: Some(task.id),
                task_count: tasks.len(),
            });
            task
        };
        debug!(task_id = %task.id, url = %task.descriptor.url, "task added to queue");
        Ok(task)
    }

    /// Remove a task by id; returns whether it was present
    pub fn remove(&self, id: TaskId) -> bool {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        let removed = tasks.len() < before;
        if removed {
            self.bus.emit(EventPayload::QueueUpdated {
                action: QueueAction::Remove,
                task_id: Some(id),
                task_count: tasks.len(),
            });
        }
        removed
    }

    /// Point lookup; returns a copy
    pub fn get(&self, id: TaskId) -> Option<DownloadTask> {
        self.tasks.lock().iter().find(|t| t.id == id).cloned()
    }

    /// Snapshot of every task
    pub fn all(&self) -> Vec<DownloadTask> {
        self.tasks.lock().clone()
    }

    /// Snapshot of tasks in one status
    pub fn by_status(&self, status: DownloadStatus) -> Vec<DownloadTask> {
        self.tasks
            .lock()
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    /// Number of tasks in the store
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether the store holds no tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Whether any live task represents `url`
    pub fn is_url_present(&self, url: &str) -> bool {
        self.tasks.lock().iter().any(|t| t.descriptor.url == url)
    }

    /// Change a task's status, enforcing transition legality.
    ///
    /// This is the only status mutator in the system. Fields are updated
    /// atomically: Completed forces progress to 100 and stamps
    /// `completed_at`; Failed records a non-empty error message; Stopped
    /// records the stop reason.
    pub fn update_status(
        &self,
        id: TaskId,
        status: DownloadStatus,
        progress: Option<f64>,
        error: Option<String>,
    ) -> QueueResult<()> {
        let mut tasks = self.tasks.lock();
        let task_count = tasks.len();
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(QueueError::TaskNotFound { id })?;

        if !task.status.can_transition_to(status) {
            return Err(QueueError::InvalidTransition {
                from: task.status,
                to: status,
            });
        }

        task.status = status;
        if let Some(progress) = progress {
            task.progress = progress.clamp(0.0, 100.0);
        }
        match status {
            DownloadStatus::Completed => {
                task.progress = 100.0;
                task.completed_at = Some(Utc::now());
                task.error_message = None;
            }
            DownloadStatus::Failed => {
                task.error_message =
                    Some(error.unwrap_or_else(|| "download failed".to_string()));
            }
            DownloadStatus::Stopped => {
                if error.is_some() {
                    task.error_message = error;
                }
            }
            _ => {}
        }

        self.bus.emit(EventPayload::QueueUpdated {
            action: QueueAction::Update,
            task_id: Some(id),
            task_count,
        });
        Ok(())
    }

    /// Remove every task
    pub fn clear(&self) {
        let mut tasks = self.tasks.lock();
        let removed = tasks.len();
        tasks.clear();
        self.bus.emit(EventPayload::QueueUpdated {
            action: QueueAction::Clear,
            task_id: None,
            task_count: 0,
        });
        info!(removed, "queue cleared");
    }

    /// Insert previously loaded tasks, skipping URLs already represented.
    ///
    /// Returns how many tasks were restored.
    pub fn restore(&self, incoming: Vec<DownloadTask>) -> usize {
        let mut restored = 0;
        {
            let mut tasks = self.tasks.lock();
            for task in incoming {
                if tasks
                    .iter()
                    .any(|t| t.descriptor.url == task.descriptor.url)
                {
                    continue;
                }
                let id = task.id;
                tasks.push(task);
                restored += 1;
                self.bus.emit(EventPayload::QueueUpdated {
                    action: QueueAction::Add,
                    task_id: Some(id),
                    task_count: tasks.len(),
                });
            }
        }
        if restored > 0 {
            info!(restored, "pending tasks restored to queue");
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::BusConfig;
    use std::sync::Arc;

    fn descriptor(url: &str) -> VideoDescriptor {
        VideoDescriptor::builder(url)
            .title("t")
            .build()
            .unwrap()
    }

    fn store() -> QueueStore {
        QueueStore::new(EventBus::with_config(BusConfig::for_testing()))
    }

    #[test]
    fn test_add_and_lookup() {
        let store = store();
        let task = store.add(descriptor("https://x/1"), "/tmp").unwrap();

        assert_eq!(task.status, DownloadStatus::Queued);
        assert_eq!(task.progress, 0.0);
        assert_eq!(store.len(), 1);
        assert!(store.is_url_present("https://x/1"));

        let copy = store.get(task.id).unwrap();
        assert_eq!(copy.id, task.id);
        assert_eq!(store.get(TaskId::new()), None);
    }

    #[test]
    fn test_duplicate_url_rejected() {
        let store = store();
        store.add(descriptor("https://x/7"), "/tmp").unwrap();

        let err = store.add(descriptor("https://x/7"), "/tmp").unwrap_err();
        assert!(matches!(err, QueueError::DuplicateUrl { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = store();
        let a = store.add(descriptor("https://x/a"), "/tmp").unwrap();
        store.add(descriptor("https://x/b"), "/tmp").unwrap();

        assert!(store.remove(a.id));
        assert!(!store.remove(a.id));
        assert_eq!(store.len(), 1);
        assert!(!store.is_url_present("https://x/a"));

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_by_status_filters() {
        let store = store();
        let a = store.add(descriptor("https://x/a"), "/tmp").unwrap();
        store.add(descriptor("https://x/b"), "/tmp").unwrap();

        store
            .update_status(a.id, DownloadStatus::Downloading, Some(10.0), None)
            .unwrap();

        assert_eq!(store.by_status(DownloadStatus::Queued).len(), 1);
        assert_eq!(store.by_status(DownloadStatus::Downloading).len(), 1);
        assert_eq!(store.by_status(DownloadStatus::Completed).len(), 0);
    }

    #[test]
    fn test_update_status_completed_invariant() {
        let store = store();
        let task = store.add(descriptor("https://x/1"), "/tmp").unwrap();

        store
            .update_status(task.id, DownloadStatus::Downloading, Some(40.0), None)
            .unwrap();
        store
            .update_status(task.id, DownloadStatus::Completed, None, None)
            .unwrap();

        let task = store.get(task.id).unwrap();
        assert_eq!(task.status, DownloadStatus::Completed);
        assert_eq!(task.progress, 100.0);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_update_status_failed_records_message() {
        let store = store();
        let task = store.add(descriptor("https://x/1"), "/tmp").unwrap();

        store
            .update_status(task.id, DownloadStatus::Downloading, None, None)
            .unwrap();
        store
            .update_status(
                task.id,
                DownloadStatus::Failed,
                None,
                Some("Network error: timeout".to_string()),
            )
            .unwrap();

        let task = store.get(task.id).unwrap();
        assert_eq!(task.status, DownloadStatus::Failed);
        assert_eq!(
            task.error_message.as_deref(),
            Some("Network error: timeout")
        );
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let store = store();
        let task = store.add(descriptor("https://x/1"), "/tmp").unwrap();

        // Queued cannot jump straight to Completed
        let err = store
            .update_status(task.id, DownloadStatus::Completed, None, None)
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { .. }));

        // Terminal states are sticky
        store
            .update_status(task.id, DownloadStatus::Stopped, None, None)
            .unwrap();
        let err = store
            .update_status(task.id, DownloadStatus::Downloading, None, None)
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { .. }));

        let unknown = store
            .update_status(TaskId::new(), DownloadStatus::Downloading, None, None)
            .unwrap_err();
        assert!(matches!(unknown, QueueError::TaskNotFound { .. }));
    }

    #[test]
    fn test_progress_clamped() {
        let store = store();
        let task = store.add(descriptor("https://x/1"), "/tmp").unwrap();

        store
            .update_status(task.id, DownloadStatus::Downloading, Some(250.0), None)
            .unwrap();
        assert_eq!(store.get(task.id).unwrap().progress, 100.0);
    }

    #[tokio::test]
    async fn test_concurrent_unique_adds() {
        let store = Arc::new(store());

        let mut handles = Vec::new();
        for producer in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    store
                        .add(
                            descriptor(&format!("https://x/{producer}/{i}")),
                            "/tmp",
                        )
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }

    #[tokio::test]
    async fn test_concurrent_same_url_single_winner() {
        let store = Arc::new(store());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.add(descriptor("https://x/7"), "/tmp").is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(store.all().len(), 1);
    }

    #[test]
    fn test_restore_skips_duplicates() {
        let store = store();
        store.add(descriptor("https://x/1"), "/tmp").unwrap();

        let incoming = vec![
            DownloadTask::new(descriptor("https://x/1"), "/tmp"),
            DownloadTask::new(descriptor("https://x/2"), "/tmp"),
        ];
        assert_eq!(store.restore(incoming), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_mutations_publish_queue_updated() {
        use crate::app::events::EventKind;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let bus = EventBus::with_config(BusConfig::for_testing());
        bus.start();
        let store = QueueStore::new(bus.clone());

        let actions = Arc::new(AtomicUsize::new(0));
        let actions_clone = Arc::clone(&actions);
        bus.subscribe(EventKind::QueueUpdated, move |_| {
            actions_clone.fetch_add(1, Ordering::SeqCst);
        });

        let task = store.add(descriptor("https://x/1"), "/tmp").unwrap();
        store
            .update_status(task.id, DownloadStatus::Downloading, Some(5.0), None)
            .unwrap();
        store.remove(task.id);
        store.clear();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(actions.load(Ordering::SeqCst), 4);
        bus.stop();
    }
}
