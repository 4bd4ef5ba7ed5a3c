//! `general.json` settings store (§4.K). A flat, opaque-to-the-core JSON
//! object; only a handful of keys are actually interpreted here, the
//! rest simply round-trip through `/settings` for the UI's own use.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::{json, Map, Value};

use crate::error::CoreError;

fn default_table() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert("uihttpport".to_string(), json!(51343));
    defaults.insert("mdns".to_string(), json!(true));
    defaults.insert("language".to_string(), json!(0));
    defaults
}

/// Guarded by a single lock, matching the teacher's field-level
/// `RwLock` usage on `AppState` (one lock per logical resource, not one
/// giant lock over everything).
pub struct SettingsStore {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl SettingsStore {
    /// Load from `path`, backfilling any default key missing from the
    /// on-disk file and re-saving (§6, §4.K).
    pub fn load(path: PathBuf) -> Result<Self, CoreError> {
        let mut values = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str::<Map<String, Value>>(&text).unwrap_or_default()
        } else {
            Map::new()
        };

        let mut backfilled = false;
        for (key, default_value) in default_table() {
            if !values.contains_key(&key) {
                values.insert(key, default_value);
                backfilled = true;
            }
        }

        let store = Self {
            path,
            values: RwLock::new(values),
        };
        if backfilled {
            store.flush()?;
        }
        Ok(store)
    }

    pub fn get_all(&self) -> Map<String, Value> {
        self.values.read().clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    pub fn uihttpport(&self) -> u16 {
        self.get("uihttpport")
            .and_then(|v| v.as_u64())
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(51343)
    }

    pub fn mdns_enabled(&self) -> bool {
        self.get("mdns").and_then(|v| v.as_bool()).unwrap_or(true)
    }

    /// Merge `patch` into the current table and persist (`PUT /settings`).
    pub fn update(&self, patch: Map<String, Value>) -> Result<(), CoreError> {
        {
            let mut values = self.values.write();
            for (key, value) in patch {
                values.insert(key, value);
            }
        }
        self.flush()
    }

    /// `PUT /settings/reset` — restore the built-in default table.
    pub fn reset(&self) -> Result<(), CoreError> {
        *self.values.write() = default_table();
        self.flush()
    }

    fn flush(&self) -> Result<(), CoreError> {
        let text = serde_json::to_string_pretty(&*self.values.read())
            .expect("settings table is always serializable");
        if let Some(parent) = Path::new(&self.path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_on_missing_file_backfills_all_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("general.json");
        let store = SettingsStore::load(path.clone()).unwrap();
        assert_eq!(store.uihttpport(), 51343);
        assert!(store.mdns_enabled());
        assert!(path.exists());
    }

    #[test]
    fn load_preserves_existing_keys_and_backfills_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("general.json");
        std::fs::write(&path, r#"{"uihttpport": 9999, "customkey": "value"}"#).unwrap();

        let store = SettingsStore::load(path).unwrap();
        assert_eq!(store.uihttpport(), 9999);
        assert!(store.mdns_enabled());
        assert_eq!(store.get("customkey"), Some(json!("value")));
    }

    #[test]
    fn update_merges_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("general.json");
        let store = SettingsStore::load(path.clone()).unwrap();

        let mut patch = Map::new();
        patch.insert("uihttpport".to_string(), json!(12345));
        store.update(patch).unwrap();
        assert_eq!(store.uihttpport(), 12345);

        let reloaded = SettingsStore::load(path).unwrap();
        assert_eq!(reloaded.uihttpport(), 12345);
    }

    #[test]
    fn reset_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("general.json");
        let store = SettingsStore::load(path).unwrap();
        let mut patch = Map::new();
        patch.insert("uihttpport".to_string(), json!(1));
        store.update(patch).unwrap();

        store.reset().unwrap();
        assert_eq!(store.uihttpport(), 51343);
        assert!(store.get("customkey_never_set").is_none());
    }
}
