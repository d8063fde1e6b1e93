//! Typed settings store with persist-on-mutation
//!
//! Holds the process-wide configuration cell. Reads hand out value copies;
//! every value-changing write persists the whole snapshot to `settings.json`
//! and publishes a `SettingsChanged` event carrying the changed keys and the
//! post-state snapshot. A persistence failure keeps the in-memory update
//! (and still publishes, so subscribers match what readers observe).

use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::app::events::{EventBus, EventPayload};
use crate::config::StoragePaths;
use crate::constants::files;
use crate::errors::{SettingsError, SettingsResult};

/// UI theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

impl std::str::FromStr for Theme {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(Self::Dark),
            "light" => Ok(Self::Light),
            other => Err(SettingsError::InvalidValue {
                key: "theme".to_string(),
                reason: format!("must be 'dark' or 'light', got '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dark => write!(f, "dark"),
            Self::Light => write!(f, "light"),
        }
    }
}

/// How queued downloads are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadMode {
    #[serde(rename = "sequential")]
    Sequential,
    #[serde(rename = "multi-threaded")]
    MultiThreaded,
}

impl std::str::FromStr for DownloadMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "multi-threaded" => Ok(Self::MultiThreaded),
            other => Err(SettingsError::InvalidValue {
                key: "download_mode".to_string(),
                reason: format!("must be 'sequential' or 'multi-threaded', got '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::MultiThreaded => write!(f, "multi-threaded"),
        }
    }
}

fn default_schema_version() -> u32 {
    files::SCHEMA_VERSION
}

fn default_download_directory() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(files::APP_DIR_NAME)
}

/// Value-type copy of the full settings schema
///
/// Unknown fields found in a persisted file are carried in `extra` and
/// written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSnapshot {
    pub version: u32,
    pub download_directory: PathBuf,
    pub theme: Theme,
    pub download_mode: DownloadMode,
    pub subtitle_download: bool,
    pub notifications_enabled: bool,
    pub auto_resume: bool,
    pub debug_thread_safety: bool,
    pub proxy_enabled: bool,
    pub proxy_host: String,
    pub proxy_port: String,
    pub cookies_path: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            version: default_schema_version(),
            download_directory: default_download_directory(),
            theme: Theme::Dark,
            download_mode: DownloadMode::Sequential,
            subtitle_download: false,
            notifications_enabled: true,
            auto_resume: true,
            debug_thread_safety: false,
            proxy_enabled: false,
            proxy_host: String::new(),
            proxy_port: String::new(),
            cookies_path: String::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl SettingsSnapshot {
    /// Serialize to a flat key/value map (schema fields plus `extra`)
    fn to_map(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// Process-wide configuration cell
pub struct SettingsStore {
    path: PathBuf,
    bus: EventBus,
    inner: Mutex<SettingsSnapshot>,
}

impl SettingsStore {
    /// Load settings from disk, falling back to defaults on a missing or
    /// unreadable file (the unreadable file is left in place, not clobbered
    /// until the next write).
    pub fn new(paths: &StoragePaths, bus: EventBus) -> Self {
        let path = paths.settings_file();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "settings file invalid, using defaults");
                    SettingsSnapshot::default()
                }
            },
            Err(_) => SettingsSnapshot::default(),
        };

        Self {
            path,
            bus,
            inner: Mutex::new(snapshot),
        }
    }

    /// Copy of the full current snapshot
    pub fn snapshot(&self) -> SettingsSnapshot {
        self.inner.lock().clone()
    }

    /// Get a setting by key as a JSON value; `None` for keys outside the
    /// schema and the preserved extras
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().to_map().get(key).cloned()
    }

    /// Set a setting by key, validating against the schema.
    ///
    /// A write that does not change the stored value neither persists nor
    /// publishes.
    pub fn set(&self, key: &str, value: Value) -> SettingsResult<()> {
        // Persisting under the lock keeps the on-disk snapshot ordered with
        // respect to concurrent writers.
        let mut inner = self.inner.lock();
        if !apply_value(&mut inner, key, value)? {
            return Ok(());
        }
        let snapshot = inner.clone();
        self.persist_and_publish(vec![key.to_string()], snapshot);
        Ok(())
    }

    /// Current download directory
    pub fn get_download_directory(&self) -> PathBuf {
        self.inner.lock().download_directory.clone()
    }

    /// Change the download directory
    pub fn set_download_directory(&self, path: impl Into<PathBuf>) -> SettingsResult<()> {
        self.set(
            "download_directory",
            Value::String(path.into().to_string_lossy().into_owned()),
        )
    }

    /// Current theme
    pub fn theme(&self) -> Theme {
        self.inner.lock().theme
    }

    /// Change the theme
    pub fn set_theme(&self, theme: Theme) -> SettingsResult<()> {
        self.set("theme", Value::String(theme.to_string()))
    }

    /// Current download mode
    pub fn download_mode(&self) -> DownloadMode {
        self.inner.lock().download_mode
    }

    /// Change the download mode
    pub fn set_download_mode(&self, mode: DownloadMode) -> SettingsResult<()> {
        self.set("download_mode", Value::String(mode.to_string()))
    }

    /// Replace every setting with its default value
    pub fn reset_to_defaults(&self) -> SettingsResult<()> {
        let defaults = SettingsSnapshot::default();
        let mut inner = self.inner.lock();

        let before = inner.to_map();
        let after = defaults.to_map();
        let changed_keys: Vec<String> = before
            .iter()
            .filter(|(key, value)| after.get(*key) != Some(value))
            .map(|(key, _)| key.clone())
            .collect();
        *inner = defaults;

        if changed_keys.is_empty() {
            return Ok(());
        }
        let snapshot = inner.clone();
        self.persist_and_publish(changed_keys, snapshot);
        Ok(())
    }

    fn persist_and_publish(&self, changed_keys: Vec<String>, snapshot: SettingsSnapshot) {
        if let Err(e) = self.persist(&snapshot) {
            // Keep the in-memory update; readers and subscribers stay consistent
            error!(path = %self.path.display(), error = %e, "failed to persist settings");
        } else {
            debug!(keys = ?changed_keys, "settings persisted");
        }

        self.bus.emit(EventPayload::SettingsChanged {
            changed_keys,
            settings: snapshot,
        });
    }

    fn persist(&self, snapshot: &SettingsSnapshot) -> SettingsResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// Apply one validated key/value pair; returns whether the value changed
fn apply_value(
    snapshot: &mut SettingsSnapshot,
    key: &str,
    value: Value,
) -> SettingsResult<bool> {
    fn expect_string(key: &str, value: &Value) -> SettingsResult<String> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SettingsError::InvalidValue {
                key: key.to_string(),
                reason: "expected a string".to_string(),
            })
    }

    fn expect_bool(key: &str, value: &Value) -> SettingsResult<bool> {
        value.as_bool().ok_or_else(|| SettingsError::InvalidValue {
            key: key.to_string(),
            reason: "expected a boolean".to_string(),
        })
    }

    macro_rules! assign {
        ($field:expr, $new:expr) => {{
            let new = $new;
            if $field == new {
                Ok(false)
            } else {
                $field = new;
                Ok(true)
            }
        }};
    }

    match key {
        "download_directory" => {
            assign!(
                snapshot.download_directory,
                PathBuf::from(expect_string(key, &value)?)
            )
        }
        "theme" => assign!(snapshot.theme, expect_string(key, &value)?.parse::<Theme>()?),
        "download_mode" => {
            assign!(
                snapshot.download_mode,
                expect_string(key, &value)?.parse::<DownloadMode>()?
            )
        }
        "subtitle_download" => assign!(snapshot.subtitle_download, expect_bool(key, &value)?),
        "notifications_enabled" => {
            assign!(snapshot.notifications_enabled, expect_bool(key, &value)?)
        }
        "auto_resume" => assign!(snapshot.auto_resume, expect_bool(key, &value)?),
        "debug_thread_safety" => {
            assign!(snapshot.debug_thread_safety, expect_bool(key, &value)?)
        }
        "proxy_enabled" => assign!(snapshot.proxy_enabled, expect_bool(key, &value)?),
        "proxy_host" => assign!(snapshot.proxy_host, expect_string(key, &value)?),
        "proxy_port" => assign!(snapshot.proxy_port, expect_string(key, &value)?),
        "cookies_path" => assign!(snapshot.cookies_path, expect_string(key, &value)?),
        "version" => Err(SettingsError::InvalidValue {
            key: key.to_string(),
            reason: "schema version is read-only".to_string(),
        }),
        other => Err(SettingsError::UnknownKey {
            key: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::{BusConfig, EventKind};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> (SettingsStore, EventBus) {
        let bus = EventBus::with_config(BusConfig::for_testing());
        let paths = StoragePaths::with_root(temp.path());
        (SettingsStore::new(&paths, bus.clone()), bus)
    }

    #[test]
    fn test_defaults() {
        let temp = TempDir::new().unwrap();
        let (store, _bus) = store_in(&temp);

        assert_eq!(store.theme(), Theme::Dark);
        assert_eq!(store.download_mode(), DownloadMode::Sequential);
        assert_eq!(store.get("notifications_enabled"), Some(json!(true)));
        assert_eq!(store.get("no_such_key"), None);
    }

    #[test]
    fn test_set_persists_snapshot() {
        let temp = TempDir::new().unwrap();
        let (store, _bus) = store_in(&temp);

        store.set_theme(Theme::Light).unwrap();

        let paths = StoragePaths::with_root(temp.path());
        let contents = std::fs::read_to_string(paths.settings_file()).unwrap();
        let on_disk: SettingsSnapshot = serde_json::from_str(&contents).unwrap();
        assert_eq!(on_disk.theme, Theme::Light);
        assert_eq!(on_disk.version, files::SCHEMA_VERSION);
    }

    #[test]
    fn test_reload_round_trip() {
        let temp = TempDir::new().unwrap();
        {
            let (store, _bus) = store_in(&temp);
            store.set_download_mode(DownloadMode::MultiThreaded).unwrap();
            store.set("subtitle_download", json!(true)).unwrap();
        }
        let (store, _bus) = store_in(&temp);
        assert_eq!(store.download_mode(), DownloadMode::MultiThreaded);
        assert_eq!(store.get("subtitle_download"), Some(json!(true)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        let (store, _bus) = store_in(&temp);

        assert!(matches!(
            store.set("theme", json!("blue")),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.set("download_mode", json!("parallel")),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.set("auto_resume", json!("yes")),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.set("bogus", json!(1)),
            Err(SettingsError::UnknownKey { .. })
        ));
        // Nothing was persisted by failed writes
        let paths = StoragePaths::with_root(temp.path());
        assert!(!paths.settings_file().exists());
    }

    #[tokio::test]
    async fn test_change_event_published_with_changed_keys() {
        let temp = TempDir::new().unwrap();
        let (store, bus) = store_in(&temp);
        bus.start();

        let seen: Arc<parking_lot::Mutex<Vec<(Vec<String>, Theme)>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        bus.subscribe(EventKind::SettingsChanged, move |event| {
            if let crate::app::events::EventPayload::SettingsChanged {
                changed_keys,
                settings,
            } = &event.payload
            {
                seen_clone.lock().push((changed_keys.clone(), settings.theme));
            }
        });

        store.set_theme(Theme::Light).unwrap();
        // Unchanged write publishes nothing
        store.set_theme(Theme::Light).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, vec!["theme".to_string()]);
        assert_eq!(seen[0].1, Theme::Light);
        bus.stop();
    }

    #[test]
    fn test_reset_to_defaults() {
        let temp = TempDir::new().unwrap();
        let (store, _bus) = store_in(&temp);

        store.set_theme(Theme::Light).unwrap();
        store.set("proxy_enabled", json!(true)).unwrap();
        store.reset_to_defaults().unwrap();

        assert_eq!(store.theme(), Theme::Dark);
        assert_eq!(store.get("proxy_enabled"), Some(json!(false)));
    }

    #[test]
    fn test_unknown_fields_preserved_on_round_trip() {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::with_root(temp.path());
        paths.ensure_exists().unwrap();
        std::fs::write(
            paths.settings_file(),
            r#"{"version": 1, "theme": "light", "future_flag": {"nested": 3}}"#,
        )
        .unwrap();

        let (store, _bus) = store_in(&temp);
        assert_eq!(store.theme(), Theme::Light);

        store.set("subtitle_download", json!(true)).unwrap();

        let contents = std::fs::read_to_string(paths.settings_file()).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(raw["future_flag"]["nested"], json!(3));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::with_root(temp.path());
        paths.ensure_exists().unwrap();
        std::fs::write(paths.settings_file(), "{not json").unwrap();

        let (store, _bus) = store_in(&temp);
        assert_eq!(store.theme(), Theme::Dark);
    }
}
