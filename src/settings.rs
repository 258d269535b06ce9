//! Host settings store.
//!
//! The reconciler only needs `get` and `update`. The real store is a flat JSON
//! object file (by default the workspace's `.vscode/settings.json`); the
//! in-memory store backs dry runs and tests.

use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One entry of an instruction list setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionEntry {
    pub text: String,
    /// Omitted from the written value when `None`.
    pub language: Option<String>,
}

/// Value written to the settings store for an instruction kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsPayload {
    /// Passed through untouched (from `.vscode/copilot.json`).
    Raw(Value),
    /// A list of `{text, language?}` entries.
    Instructions(Vec<InstructionEntry>),
}

impl SettingsPayload {
    /// A single-entry instruction list. Empty languages are treated as absent.
    pub fn single(text: impl Into<String>, language: Option<&str>) -> Self {
        Self::Instructions(vec![InstructionEntry {
            text: text.into(),
            language: language.filter(|l| !l.is_empty()).map(str::to_string),
        }])
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Raw(value) => value,
            Self::Instructions(entries) => Value::Array(
                entries
                    .into_iter()
                    .map(|entry| {
                        let mut object = Map::new();
                        object.insert("text".to_string(), Value::String(entry.text));
                        if let Some(language) = entry.language {
                            object.insert("language".to_string(), Value::String(language));
                        }
                        Value::Object(object)
                    })
                    .collect(),
            ),
        }
    }
}

/// Key-value settings scoped to the active workspace.
#[allow(async_fn_in_trait)]
pub trait SettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn update(&self, key: &str, value: Value) -> Result<()>;
}

/// Settings stored as a flat JSON object in a file.
pub struct FileSettings {
    path: PathBuf,
    // Serializes read-modify-write cycles of concurrent updates.
    lock: Mutex<()>,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole settings object. A missing or blank file is empty.
    pub async fn snapshot(&self) -> Result<Map<String, Value>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };

        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&contents)
            .with_context(|| format!("Invalid JSON in {}", self.path.display()))?
        {
            Value::Object(map) => Ok(map),
            _ => bail!("{} does not contain a JSON object", self.path.display()),
        }
    }
}

impl SettingsStore for FileSettings {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.snapshot().await?.get(key).cloned())
    }

    async fn update(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut settings = self.snapshot().await?;
        settings.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let mut contents = serde_json::to_string_pretty(&Value::Object(settings))?;
        contents.push('\n');
        tokio::fs::write(&self.path, contents)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        info!(path = ?self.path, key, "setting_written");
        Ok(())
    }
}

/// Settings held in memory. Records every update in order.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RefCell<Map<String, Value>>,
    writes: RefCell<Vec<(String, Value)>>,
    #[cfg(test)]
    failing_keys: RefCell<Vec<String>>,
}

impl MemorySettings {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing set of values without recording writes.
    pub fn seeded(values: Map<String, Value>) -> Self {
        Self {
            values: RefCell::new(values),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.values.borrow().clone()
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        self.writes.borrow().clone()
    }

    /// Make updates to `key` fail.
    #[cfg(test)]
    pub fn fail_on(&self, key: &str) {
        self.failing_keys.borrow_mut().push(key.to_string());
    }
}

impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    async fn update(&self, key: &str, value: Value) -> Result<()> {
        #[cfg(test)]
        if self.failing_keys.borrow().iter().any(|k| k == key) {
            bail!("settings store rejected {}", key);
        }

        debug!(key, "memory_setting_written");
        self.writes
            .borrow_mut()
            .push((key.to_string(), value.clone()));
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_single_payload_without_language() {
        assert_eq!(
            SettingsPayload::single("Use tabs.", None).into_value(),
            json!([{ "text": "Use tabs." }])
        );
        assert_eq!(
            SettingsPayload::single("Use tabs.", Some("")).into_value(),
            json!([{ "text": "Use tabs." }])
        );
    }

    #[test]
    fn test_single_payload_with_language() {
        assert_eq!(
            SettingsPayload::single("Use #[test].", Some("rust")).into_value(),
            json!([{ "text": "Use #[test].", "language": "rust" }])
        );
    }

    #[test]
    fn test_raw_payload_is_verbatim() {
        let value = json!(["be terse"]);
        assert_eq!(SettingsPayload::Raw(value.clone()).into_value(), value);
    }

    #[tokio::test]
    async fn test_file_settings_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let settings = FileSettings::new(dir.path().join(".vscode/settings.json"));
        assert!(settings.snapshot().await.unwrap().is_empty());
        assert_eq!(settings.get("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_settings_update_creates_file_and_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".vscode/settings.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"editor.tabSize": 4}"#).unwrap();

        let settings = FileSettings::new(&path);
        settings
            .update("github.copilot.chat.reviewSelection.instructions", json!(["be terse"]))
            .await
            .unwrap();

        let snapshot = settings.snapshot().await.unwrap();
        assert_eq!(snapshot.get("editor.tabSize"), Some(&json!(4)));
        assert_eq!(
            snapshot.get("github.copilot.chat.reviewSelection.instructions"),
            Some(&json!(["be terse"]))
        );
        // existing keys keep their position
        assert_eq!(snapshot.keys().next().map(String::as_str), Some("editor.tabSize"));
    }

    #[tokio::test]
    async fn test_file_settings_concurrent_updates_both_land() {
        let dir = TempDir::new().unwrap();
        let settings = FileSettings::new(dir.path().join("settings.json"));

        let (a, b) = futures::join!(
            settings.update("a", json!(true)),
            settings.update("b", json!({ "x": true }))
        );
        a.unwrap();
        b.unwrap();

        let snapshot = settings.snapshot().await.unwrap();
        assert_eq!(snapshot.get("a"), Some(&json!(true)));
        assert_eq!(snapshot.get("b"), Some(&json!({ "x": true })));
    }

    #[tokio::test]
    async fn test_file_settings_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        let settings = FileSettings::new(&path);
        assert!(settings.update("a", json!(1)).await.is_err());
        // file left as it was
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1, 2]");
    }

    #[tokio::test]
    async fn test_memory_settings_records_writes() {
        let settings = MemorySettings::new();
        settings.update("a", json!(1)).await.unwrap();
        settings.update("a", json!(2)).await.unwrap();

        assert_eq!(settings.get("a").await.unwrap(), Some(json!(2)));
        assert_eq!(settings.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_settings_seeded_has_no_writes() {
        let mut values = Map::new();
        values.insert("a".to_string(), json!(1));
        let settings = MemorySettings::seeded(values);

        assert_eq!(settings.get("a").await.unwrap(), Some(json!(1)));
        assert!(settings.writes().is_empty());
    }

    #[tokio::test]
    async fn test_memory_settings_fail_on() {
        let settings = MemorySettings::new();
        settings.fail_on("a");
        assert!(settings.update("a", json!(1)).await.is_err());
        assert!(settings.writes().is_empty());
    }
}
