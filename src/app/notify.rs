//! Notification relay
//!
//! Bridges completion events to the desktop notification channel. Only
//! `DownloadComplete` and `DownloadFailed` are forwarded: user-initiated
//! stops are not errors and never reach the notification path. Delivery is
//! gated by the `notifications_enabled` setting at event time.

use std::sync::Arc;

use tracing::debug;

use crate::app::events::{EventBus, EventKind, EventPayload, SubscriptionId};
use crate::app::fetch::NotificationDelivery;
use crate::app::settings::SettingsStore;

/// Subscriptions forwarding download outcomes to a delivery channel
pub struct NotificationRelay {
    bus: EventBus,
    subscriptions: Vec<SubscriptionId>,
}

impl NotificationRelay {
    /// Subscribe the relay on `bus`
    pub fn attach(
        bus: &EventBus,
        settings: Arc<SettingsStore>,
        delivery: Arc<dyn NotificationDelivery>,
    ) -> Self {
        let mut subscriptions = Vec::new();

        {
            let settings = Arc::clone(&settings);
            let delivery = Arc::clone(&delivery);
            subscriptions.push(bus.subscribe(EventKind::DownloadComplete, move |event| {
                if !settings.snapshot().notifications_enabled {
                    return;
                }
                if let EventPayload::DownloadComplete { file_path, .. } = &event.payload {
                    let name = file_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| file_path.display().to_string());
                    delivery.notify("Download complete", &name);
                    debug!(file = %name, "completion notification sent");
                }
            }));
        }

        subscriptions.push(bus.subscribe(EventKind::DownloadFailed, move |event| {
            if !settings.snapshot().notifications_enabled {
                return;
            }
            if let EventPayload::DownloadFailed { error, .. } = &event.payload {
                delivery.notify("Download failed", error);
                debug!(%error, "failure notification sent");
            }
        }));

        Self {
            bus: bus.clone(),
            subscriptions,
        }
    }

    /// Remove the relay's subscriptions
    pub fn detach(&self) {
        for id in &self.subscriptions {
            self.bus.unsubscribe(*id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::BusConfig;
    use crate::app::models::TaskId;
    use crate::config::StoragePaths;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingDelivery {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl NotificationDelivery for RecordingDelivery {
        fn notify(&self, summary: &str, body: &str) {
            self.sent.lock().push((summary.to_string(), body.to_string()));
        }
    }

    async fn run_relay(notifications_enabled: bool) -> Vec<(String, String)> {
        let temp = TempDir::new().unwrap();
        let bus = EventBus::with_config(BusConfig::for_testing());
        bus.start();

        let settings = Arc::new(SettingsStore::new(
            &StoragePaths::with_root(temp.path()),
            bus.clone(),
        ));
        settings
            .set("notifications_enabled", json!(notifications_enabled))
            .unwrap();

        let delivery = Arc::new(RecordingDelivery::default());
        let forwarder: Arc<dyn NotificationDelivery> = delivery.clone();
        let _relay = NotificationRelay::attach(&bus, settings, forwarder);

        let task_id = TaskId::new();
        bus.emit(EventPayload::DownloadComplete {
            task_id,
            file_path: PathBuf::from("/tmp/video.mp4"),
        });
        bus.emit(EventPayload::DownloadFailed {
            task_id,
            error: "Network error: timeout".to_string(),
        });
        bus.emit(EventPayload::DownloadStopped {
            task_id,
            reason: "stopped by user".to_string(),
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        bus.stop();
        let sent = delivery.sent.lock().clone();
        sent
    }

    #[tokio::test]
    async fn test_complete_and_failed_forwarded_stopped_ignored() {
        let sent = run_relay(true).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "Download complete");
        assert_eq!(sent[0].1, "video.mp4");
        assert_eq!(sent[1].0, "Download failed");
    }

    #[tokio::test]
    async fn test_disabled_notifications_silent() {
        let sent = run_relay(false).await;
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_detach_removes_subscriptions() {
        let temp = TempDir::new().unwrap();
        let bus = EventBus::with_config(BusConfig::for_testing());
        let settings = Arc::new(SettingsStore::new(
            &StoragePaths::with_root(temp.path()),
            bus.clone(),
        ));
        let delivery = Arc::new(RecordingDelivery::default());

        let forwarder: Arc<dyn NotificationDelivery> = delivery;
        let relay = NotificationRelay::attach(&bus, settings, forwarder);
        assert_eq!(bus.listener_count(None), 2);
        relay.detach();
        assert_eq!(bus.listener_count(None), 0);
    }
}
