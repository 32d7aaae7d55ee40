//! Persisted application settings.
//!
//! The store holds a closed set of keys. Every mutation runs the same
//! pipeline under one lock: validate, persist the whole object, commit to
//! memory, publish the change, then apply the window side effect. A value
//! is never visible as current before it is on disk.
//!
//! The file is replaced atomically: the object is written to a temporary
//! file next to the target and renamed over it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::broadcast;

use crate::error::{SettingsError, WindowError};
use crate::error_log::ErrorLog;
use crate::platform::{UiCommand, UiDispatcher};

/// Themes the UI ships with.
pub const AVAILABLE_THEMES: [&str; 2] = ["dark", "orange"];

/// Theme used when none is stored.
pub const DEFAULT_THEME: &str = "dark";

/// Capacity of the change notification channel.
const CHANGE_CAPACITY: usize = 64;

/// A recognized setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKey {
    Theme,
    Fullscreen,
    Notifications,
}

impl SettingKey {
    /// All recognized keys.
    pub const ALL: [SettingKey; 3] = [
        SettingKey::Theme,
        SettingKey::Fullscreen,
        SettingKey::Notifications,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::Theme => "theme",
            SettingKey::Fullscreen => "fullscreen",
            SettingKey::Notifications => "notifications",
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// Checks `value` against the key's type and domain.
    pub fn validate(self, value: &Value) -> bool {
        match self {
            SettingKey::Theme => value.as_str().is_some_and(|theme| {
                AVAILABLE_THEMES
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(theme))
            }),
            SettingKey::Fullscreen | SettingKey::Notifications => value.is_boolean(),
        }
    }

    fn default_value(self) -> Value {
        match self {
            SettingKey::Theme => Value::from(DEFAULT_THEME),
            SettingKey::Fullscreen => Value::Bool(false),
            SettingKey::Notifications => Value::Bool(true),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

/// How an update treats a key that was never initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Any recognized key may be written.
    Upsert,
    /// The key must already hold a value.
    Patch,
}

/// A committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingChange {
    pub key: SettingKey,
    pub old_value: Option<Value>,
    pub new_value: Value,
}

/// All current settings plus the allowed themes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub settings: BTreeMap<SettingKey, Value>,
    pub available_themes: Vec<&'static str>,
}

/// Persisted key/value settings with change notification.
pub struct SettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<SettingKey, Value>>,
    changes: broadcast::Sender<SettingChange>,
    errors: Arc<ErrorLog>,
    dispatcher: Option<Arc<dyn UiDispatcher>>,
}

impl SettingsStore {
    /// Loads the settings file, keeping only recognized keys with valid
    /// values. Falls back to (and persists) the defaults when nothing usable
    /// is found. Never fails: file problems are logged and recovered.
    pub fn open(path: impl Into<PathBuf>, errors: Arc<ErrorLog>) -> Self {
        let path = path.into();
        let mut values = load_recognized(&path);

        if values.is_empty() {
            values = defaults();
            match write_atomically(&path, &values) {
                Ok(()) => tracing::info!(path = %path.display(), "Initialized default settings"),
                Err(e) => tracing::warn!(error = %e, "Failed to persist default settings"),
            }
        } else {
            tracing::info!(
                path = %path.display(),
                theme = ?values.get(&SettingKey::Theme),
                "Settings loaded"
            );
        }

        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            path,
            values: Mutex::new(values),
            changes,
            errors,
            dispatcher: None,
        }
    }

    /// Routes fullscreen changes to the UI context through `dispatcher`.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn UiDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Reads the boot-time fullscreen flag without opening a store.
    pub fn boot_fullscreen(path: &Path) -> bool {
        load_recognized(path)
            .get(&SettingKey::Fullscreen)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Result<Value, SettingsError> {
        SettingKey::parse(key)
            .and_then(|k| self.values.lock().get(&k).cloned())
            .ok_or_else(|| SettingsError::NotFound(key.to_string()))
    }

    /// All current settings and the allowed themes.
    pub fn get_all(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            settings: self.values.lock().clone(),
            available_themes: AVAILABLE_THEMES.to_vec(),
        }
    }

    /// Current theme, or the default if none is stored.
    pub fn current_theme(&self) -> String {
        self.values
            .lock()
            .get(&SettingKey::Theme)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_THEME)
            .to_string()
    }

    /// Upsert-style update of a recognized key.
    pub fn set(&self, key: &str, value: Value) -> Result<SettingChange, SettingsError> {
        self.update(key, value, UpdateMode::Upsert)
    }

    /// Strict update: fails with `NotFound` if `key` holds no value yet.
    pub fn patch(&self, key: &str, value: Value) -> Result<SettingChange, SettingsError> {
        self.update(key, value, UpdateMode::Patch)
    }

    /// Runs the update pipeline for `key`.
    pub fn update(
        &self,
        key: &str,
        value: Value,
        mode: UpdateMode,
    ) -> Result<SettingChange, SettingsError> {
        let mut values = self.values.lock();

        let parsed = match (SettingKey::parse(key), mode) {
            (Some(parsed), _) => parsed,
            (None, UpdateMode::Upsert) => return Err(SettingsError::UnknownKey(key.to_string())),
            (None, UpdateMode::Patch) => return Err(SettingsError::NotFound(key.to_string())),
        };

        if mode == UpdateMode::Patch && !values.contains_key(&parsed) {
            return Err(SettingsError::NotFound(key.to_string()));
        }

        self.commit(&mut values, parsed, value)
    }

    /// Flips the fullscreen flag (absent counts as `false`) and returns the
    /// new value.
    pub fn toggle_fullscreen(&self) -> Result<bool, SettingsError> {
        let mut values = self.values.lock();
        let fullscreen = !values
            .get(&SettingKey::Fullscreen)
            .and_then(Value::as_bool)
            .unwrap_or(false);

        self.commit(&mut values, SettingKey::Fullscreen, Value::Bool(fullscreen))?;
        Ok(fullscreen)
    }

    /// Subscribes to committed changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingChange> {
        self.changes.subscribe()
    }

    // Runs with the store lock held so concurrent updates are serialized
    // and side effects are dispatched in commit order.
    fn commit(
        &self,
        values: &mut BTreeMap<SettingKey, Value>,
        key: SettingKey,
        value: Value,
    ) -> Result<SettingChange, SettingsError> {
        if !key.validate(&value) {
            return Err(SettingsError::InvalidValue(key.to_string()));
        }

        let mut candidate = values.clone();
        let old_value = candidate.insert(key, value.clone());
        write_atomically(&self.path, &candidate)?;
        *values = candidate;

        tracing::info!(key = %key, value = %value, "Setting updated");

        let change = SettingChange {
            key,
            old_value,
            new_value: value,
        };
        // No subscribers is not an error.
        let _ = self.changes.send(change.clone());

        if let (SettingKey::Fullscreen, Some(fullscreen)) = (key, change.new_value.as_bool()) {
            self.apply_fullscreen(fullscreen);
        }

        Ok(change)
    }

    fn apply_fullscreen(&self, fullscreen: bool) {
        let Some(dispatcher) = &self.dispatcher else {
            tracing::debug!(fullscreen, "No UI attached, fullscreen change not applied");
            return;
        };

        if let Err(e) = dispatcher.dispatch(UiCommand::SetFullscreen(fullscreen)) {
            tracing::warn!(error = %e, "Error scheduling fullscreen update");
            self.errors.record_error(&WindowError::from(e));
        }
    }
}

impl fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.path)
            .field("values", &*self.values.lock())
            .finish()
    }
}

fn defaults() -> BTreeMap<SettingKey, Value> {
    SettingKey::ALL
        .into_iter()
        .map(|key| (key, key.default_value()))
        .collect()
}

fn load_recognized(path: &Path) -> BTreeMap<SettingKey, Value> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "Settings file not found, using defaults");
            return BTreeMap::new();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read settings file");
            return BTreeMap::new();
        }
    };

    let object: Map<String, Value> = match serde_json::from_str(&contents) {
        Ok(object) => object,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Error parsing settings file");
            return BTreeMap::new();
        }
    };

    object
        .into_iter()
        .filter_map(|(name, value)| {
            let Some(key) = SettingKey::parse(&name) else {
                tracing::debug!(key = %name, "Dropping unrecognized setting");
                return None;
            };
            if !key.validate(&value) {
                tracing::warn!(key = %key, value = %value, "Dropping invalid stored setting");
                return None;
            }
            Some((key, value))
        })
        .collect()
}

fn write_atomically(path: &Path, values: &BTreeMap<SettingKey, Value>) -> Result<(), SettingsError> {
    let contents = serde_json::to_vec_pretty(values)?;
    let persist_error = |source: io::Error| SettingsError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(persist_error)?;
    file.write_all(&contents).map_err(persist_error)?;
    file.as_file().sync_all().map_err(persist_error)?;
    file.persist(path).map_err(|e| persist_error(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDispatcher;
    use proptest::prelude::*;
    use serde_json::json;
    use std::thread;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> SettingsStore {
        SettingsStore::open(dir.path().join("settings.json"), Arc::new(ErrorLog::new()))
    }

    fn read_file(dir: &TempDir) -> Value {
        let contents = fs::read_to_string(dir.path().join("settings.json")).unwrap();
        serde_json::from_str(&contents).unwrap()
    }

    #[test]
    fn test_first_run_persists_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let expected = json!({"theme": "dark", "fullscreen": false, "notifications": true});
        assert_eq!(read_file(&dir), expected);
        assert_eq!(serde_json::to_value(&store.get_all().settings).unwrap(), expected);
        assert_eq!(store.get_all().available_themes, vec!["dark", "orange"]);
    }

    #[test]
    fn test_set_then_get_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let change = store.set("theme", json!("orange")).unwrap();
        assert_eq!(change.old_value, Some(json!("dark")));
        assert_eq!(change.new_value, json!("orange"));
        assert_eq!(store.get("theme").unwrap(), json!("orange"));

        store.set("notifications", json!(false)).unwrap();
        drop(store);

        let reopened = open_store(&dir);
        assert_eq!(reopened.get("theme").unwrap(), json!("orange"));
        assert_eq!(reopened.get("notifications").unwrap(), json!(false));
    }

    #[test]
    fn test_invalid_value_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.set("theme", json!("orange")).unwrap();
        let before = read_file(&dir);

        assert!(matches!(
            store.set("theme", json!("purple")),
            Err(SettingsError::InvalidValue(_))
        ));
        assert!(matches!(
            store.set("fullscreen", json!("yes")),
            Err(SettingsError::InvalidValue(_))
        ));

        assert_eq!(store.get("theme").unwrap(), json!("orange"));
        assert_eq!(store.get("fullscreen").unwrap(), json!(false));
        assert_eq!(read_file(&dir), before);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        assert!(matches!(
            store.set("volume", json!(11)),
            Err(SettingsError::UnknownKey(_))
        ));
        assert!(matches!(store.get("volume"), Err(SettingsError::NotFound(_))));
        assert!(store.get_all().settings.len() == 3);
        assert!(read_file(&dir).get("volume").is_none());
    }

    #[test]
    fn test_patch_requires_initialized_key() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), r#"{"theme":"orange"}"#).unwrap();
        let store = open_store(&dir);

        assert!(matches!(
            store.patch("notifications", json!(false)),
            Err(SettingsError::NotFound(_))
        ));
        assert!(matches!(
            store.patch("volume", json!(1)),
            Err(SettingsError::NotFound(_))
        ));

        let change = store.set("notifications", json!(false)).unwrap();
        assert_eq!(change.old_value, None);

        store.patch("notifications", json!(true)).unwrap();
        assert_eq!(store.get("notifications").unwrap(), json!(true));
    }

    #[test]
    fn test_load_drops_unknown_and_invalid_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("settings.json"),
            r#"{"theme":"ORANGE","fullscreen":"yes","legacy":1,"notifications":false}"#,
        )
        .unwrap();

        let store = open_store(&dir);
        let settings = store.get_all().settings;

        assert_eq!(settings.len(), 2);
        assert_eq!(settings[&SettingKey::Theme], json!("ORANGE"));
        assert_eq!(settings[&SettingKey::Notifications], json!(false));
        assert!(store.get("fullscreen").is_err());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{not json").unwrap();

        let errors = Arc::new(ErrorLog::new());
        let store = SettingsStore::open(dir.path().join("settings.json"), errors.clone());

        assert_eq!(store.current_theme(), "dark");
        assert_eq!(read_file(&dir)["notifications"], json!(true));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_theme_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set("theme", json!("Orange")).unwrap();
        assert_eq!(store.get("theme").unwrap(), json!("Orange"));
        assert_eq!(store.current_theme(), "Orange");
    }

    #[test]
    fn test_toggle_twice_restores_value_and_dispatches() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let store = open_store(&dir).with_dispatcher(dispatcher.clone());

        assert!(store.toggle_fullscreen().unwrap());
        assert_eq!(read_file(&dir)["fullscreen"], json!(true));
        assert!(!store.toggle_fullscreen().unwrap());
        assert_eq!(store.get("fullscreen").unwrap(), json!(false));

        assert_eq!(
            dispatcher.commands(),
            vec![UiCommand::SetFullscreen(true), UiCommand::SetFullscreen(false)]
        );
    }

    #[test]
    fn test_toggle_without_stored_flag_starts_from_false() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), r#"{"theme":"dark"}"#).unwrap();
        let store = open_store(&dir);

        assert!(store.toggle_fullscreen().unwrap());
        assert_eq!(store.get("fullscreen").unwrap(), json!(true));
    }

    #[test]
    fn test_failed_dispatch_keeps_persisted_value() {
        let dir = tempfile::tempdir().unwrap();
        let errors = Arc::new(ErrorLog::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        dispatcher.close();
        let store = SettingsStore::open(dir.path().join("settings.json"), errors.clone())
            .with_dispatcher(dispatcher);

        store.set("fullscreen", json!(true)).unwrap();

        assert_eq!(read_file(&dir)["fullscreen"], json!(true));
        assert_eq!(errors.len(), 1);
        assert!(errors.list()[0].failure.kind.ends_with("WindowError"));
    }

    #[test]
    fn test_persist_failure_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("settings.json");
        let store = SettingsStore::open(&path, Arc::new(ErrorLog::new()));

        let result = store.set("theme", json!("orange"));
        assert!(matches!(result, Err(SettingsError::Persist { .. })));
        assert_eq!(store.get("theme").unwrap(), json!("dark"));
    }

    #[test]
    fn test_changes_are_published() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let mut changes = store.subscribe();

        store.set("theme", json!("orange")).unwrap();

        let change = changes.try_recv().unwrap();
        assert_eq!(change.key, SettingKey::Theme);
        assert_eq!(change.old_value, Some(json!("dark")));
        assert_eq!(change.new_value, json!("orange"));
        assert!(store.set("theme", json!("purple")).is_err());
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_toggles_lose_no_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(&dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        store.toggle_fullscreen().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // 200 flips from `false`.
        assert_eq!(store.get("fullscreen").unwrap(), json!(false));
        assert_eq!(read_file(&dir)["fullscreen"], json!(false));
    }

    #[test]
    fn test_concurrent_sets_end_on_last_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(&dir));
        let mut changes = store.subscribe();

        let handles: Vec<_> = ["dark", "orange", "DARK", "Orange"]
            .into_iter()
            .map(|theme| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        store.set("theme", json!(theme)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut last = None;
        let mut previous = Some(json!("dark"));
        while let Ok(change) = changes.try_recv() {
            assert_eq!(change.old_value, previous);
            previous = Some(change.new_value.clone());
            last = Some(change.new_value);
        }
        assert_eq!(store.get("theme").unwrap(), last.unwrap());
    }

    #[test]
    fn test_boot_fullscreen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert!(!SettingsStore::boot_fullscreen(&path));

        fs::write(&path, r#"{"fullscreen":true}"#).unwrap();
        assert!(SettingsStore::boot_fullscreen(&path));

        fs::write(&path, "garbage").unwrap();
        assert!(!SettingsStore::boot_fullscreen(&path));
    }

    #[test]
    fn test_key_parse_is_exact() {
        assert_eq!(SettingKey::parse("theme"), Some(SettingKey::Theme));
        assert_eq!(SettingKey::parse("Theme"), None);
        assert!("volume".parse::<SettingKey>().is_err());
        assert_eq!(SettingKey::Notifications.to_string(), "notifications");
    }

    proptest! {
        #[test]
        fn prop_unknown_theme_rejected(theme in "[a-zA-Z]{0,12}") {
            let known = AVAILABLE_THEMES.iter().any(|t| t.eq_ignore_ascii_case(&theme));
            prop_assert_eq!(SettingKey::Theme.validate(&json!(theme)), known);
        }

        #[test]
        fn prop_boolean_keys_accept_only_booleans(flag in any::<bool>(), number in any::<i64>()) {
            for key in [SettingKey::Fullscreen, SettingKey::Notifications] {
                prop_assert!(key.validate(&json!(flag)));
                prop_assert!(!key.validate(&json!(number)));
                prop_assert!(!key.validate(&json!(flag.to_string())));
            }
        }
    }
}
