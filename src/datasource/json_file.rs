// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! JSON file datasource.
//!
//! The whole store is one JSON object on disk: top-level keys are entity ids,
//! values are arbitrary JSON payloads. Every mutation is a full
//! read-modify-write of the file, serialized through a single async mutex so
//! one cycle completes before the next begins. The new contents are staged
//! next to the target and renamed over it, so readers never see a
//! half-written file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::traits::{Capabilities, Datasource, DatasourceError, DatasourceOptions, WriteMode};

const INITIAL_FILE_CONTENT: &str = "{}";

/// File handling options for [`JsonFileDatasource::open_with`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct JsonFileOptions {
    /// Truncate the file to `{}` on open, discarding existing content
    #[serde(default)]
    pub force_empty: bool,
}

pub struct JsonFileDatasource {
    path: PathBuf,
    options: DatasourceOptions,
    writable: bool,
    file_access: Mutex<()>,
}

impl JsonFileDatasource {
    /// Open a JSON file datasource, creating the file with `{}` if absent.
    pub async fn open(path: impl AsRef<Path>, options: DatasourceOptions) -> Result<Self, DatasourceError> {
        Self::open_with(path, JsonFileOptions::default(), options).await
    }

    pub async fn open_with(
        path: impl AsRef<Path>,
        file_options: JsonFileOptions,
        options: DatasourceOptions,
    ) -> Result<Self, DatasourceError> {
        let path = path.as_ref().to_path_buf();

        if file_options.force_empty {
            fs::write(&path, INITIAL_FILE_CONTENT).await?;
            info!(path = %path.display(), "JSON datasource truncated to empty object");
        } else if !fs::try_exists(&path).await? {
            fs::write(&path, INITIAL_FILE_CONTENT).await?;
            info!(path = %path.display(), "JSON datasource file created");
        }

        Ok(Self {
            path,
            options,
            writable: true,
            file_access: Mutex::new(()),
        })
    }

    /// Read-only view over an existing JSON file.
    ///
    /// Never creates the file. Writes resolve as "nothing happened" and the
    /// datasource always registers as [`WriteMode::NoWrite`].
    #[must_use]
    pub fn read_only(path: impl AsRef<Path>, options: DatasourceOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options: options.with_write_mode(WriteMode::NoWrite),
            writable: false,
            file_access: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        !self.writable
    }

    async fn read_file(&self) -> Result<Map<String, Value>, DatasourceError> {
        let raw = fs::read(&self.path).await?;
        let parsed: Value = serde_json::from_slice(&raw)?;
        match parsed {
            Value::Object(map) => Ok(map),
            other => Err(DatasourceError::InvalidData {
                location: self.path.display().to_string(),
                reason: format!("expected a JSON object at top level, found {}", json_type(&other)),
            }),
        }
    }

    async fn write_file(&self, data: &Map<String, Value>) -> Result<(), DatasourceError> {
        // Encode first: a payload that cannot be serialized never touches disk
        let encoded = serde_json::to_vec(data)?;
        let staging = self.staging_path();
        fs::write(&staging, &encoded).await?;
        fs::rename(&staging, &self.path).await?;
        debug!(path = %self.path.display(), bytes = encoded.len(), "JSON datasource written");
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Run one serialized read-modify-write cycle.
    ///
    /// `mutate` returns the operation outcome and whether the file changed.
    async fn modify<T, F>(&self, mutate: F) -> Result<T, DatasourceError>
    where
        T: Send,
        F: FnOnce(&mut Map<String, Value>) -> (T, bool) + Send,
    {
        let _guard = self.file_access.lock().await;
        let mut data = self.read_file().await?;
        let (outcome, dirty) = mutate(&mut data);
        if dirty {
            self.write_file(&data).await?;
        }
        Ok(outcome)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl Datasource for JsonFileDatasource {
    fn options(&self) -> &DatasourceOptions {
        &self.options
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn kind(&self) -> &'static str {
        if self.writable { "json_file" } else { "json_readonly" }
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, DatasourceError> {
        let data = self.read_file().await?;
        Ok(data.get(key).filter(|v| !v.is_null()).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<Option<String>, DatasourceError> {
        if !self.writable {
            return Ok(None);
        }
        self.modify(|data| {
            data.insert(key.to_string(), value);
            (Some(key.to_string()), true)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, DatasourceError> {
        if !self.writable {
            return Ok(false);
        }
        self.modify(|data| {
            let existed = data.shift_remove(key).is_some();
            (existed, existed)
        })
        .await
    }

    async fn getall(&self) -> Result<Vec<String>, DatasourceError> {
        Ok(self.read_file().await?.keys().cloned().collect())
    }

    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Option<Value>>, DatasourceError> {
        let data = self.read_file().await?;
        Ok(keys
            .iter()
            .map(|key| (key.clone(), data.get(key).filter(|v| !v.is_null()).cloned()))
            .collect())
    }

    async fn mset(&self, payload: &IndexMap<String, Value>) -> Result<Vec<String>, DatasourceError> {
        if !self.writable || payload.is_empty() {
            return Ok(Vec::new());
        }
        self.modify(|data| {
            for (key, value) in payload {
                data.insert(key.clone(), value.clone());
            }
            (payload.keys().cloned().collect(), true)
        })
        .await
    }

    async fn mdelete(&self, keys: &[String]) -> Result<HashMap<String, bool>, DatasourceError> {
        if !self.writable {
            return Ok(keys.iter().map(|key| (key.clone(), false)).collect());
        }
        self.modify(|data| {
            let report: HashMap<String, bool> = keys
                .iter()
                .map(|key| (key.clone(), data.shift_remove(key).is_some()))
                .collect();
            let dirty = report.values().any(|removed| *removed);
            (report, dirty)
        })
        .await
    }

    async fn find(&self, pattern: &Regex) -> Result<Vec<String>, DatasourceError> {
        Ok(self
            .read_file()
            .await?
            .keys()
            .filter(|key| pattern.is_match(key))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_empty_object() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileDatasource::open(&path, DatasourceOptions::default()).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert!(store.getall().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_keeps_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"city":"Kyiv"}"#).unwrap();

        let store = JsonFileDatasource::open(&path, DatasourceOptions::default()).await.unwrap();
        assert_eq!(store.get("city").await.unwrap(), Some(json!("Kyiv")));
    }

    #[tokio::test]
    async fn test_force_empty_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"city":"Kyiv"}"#).unwrap();

        let store = JsonFileDatasource::open_with(
            &path,
            JsonFileOptions { force_empty: true },
            DatasourceOptions::default(),
        )
        .await
        .unwrap();

        assert!(store.get("city").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_persists_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileDatasource::open(&path, DatasourceOptions::default()).await.unwrap();

        let ack = store.set("model", json!({"brand": "Apple"})).await.unwrap();
        assert_eq!(ack.as_deref(), Some("model"));

        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"model": {"brand": "Apple"}}));
        assert!(!dir.path().join("store.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let dir = tempdir().unwrap();
        let store = JsonFileDatasource::open(dir.path().join("s.json"), DatasourceOptions::default())
            .await
            .unwrap();
        store.set("key", json!("value")).await.unwrap();

        assert!(store.delete("key").await.unwrap());
        assert!(!store.delete("key").await.unwrap());
    }

    #[tokio::test]
    async fn test_mdelete_reports_per_key() {
        let dir = tempdir().unwrap();
        let store = JsonFileDatasource::open(dir.path().join("s.json"), DatasourceOptions::default())
            .await
            .unwrap();
        let payload: IndexMap<String, Value> =
            [("foo".to_string(), json!(1)), ("bar".to_string(), json!(2))].into_iter().collect();
        store.mset(&payload).await.unwrap();

        let keys: Vec<String> = ["foo", "bar", "weird"].iter().map(|s| s.to_string()).collect();
        let report = store.mdelete(&keys).await.unwrap();

        assert_eq!(report["foo"], true);
        assert_eq!(report["bar"], true);
        assert_eq!(report["weird"], false);
        assert!(store.getall().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writes_are_not_lost() {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            JsonFileDatasource::open(dir.path().join("s.json"), DatasourceOptions::default())
                .await
                .unwrap(),
        );

        let mut handles = vec![];
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set(&format!("key-{}", i), json!(i)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.getall().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileDatasource::open(&path, DatasourceOptions::default()).await.unwrap();
        assert!(matches!(store.get("any").await, Err(DatasourceError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_non_object_file_is_invalid_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("array.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = JsonFileDatasource::read_only(&path, DatasourceOptions::default());
        assert!(matches!(store.getall().await, Err(DatasourceError::InvalidData { .. })));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error_for_read_only() {
        let dir = tempdir().unwrap();
        let store = JsonFileDatasource::read_only(dir.path().join("absent.json"), DatasourceOptions::default());
        assert!(matches!(store.get("x").await, Err(DatasourceError::Io(_))));
    }

    #[tokio::test]
    async fn test_read_only_ignores_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.json");
        std::fs::write(&path, r#"{"city":"Kyiv"}"#).unwrap();

        let store = JsonFileDatasource::read_only(&path, DatasourceOptions::default());
        assert!(store.is_read_only());
        assert_eq!(store.options().write_mode, WriteMode::NoWrite);
        assert_eq!(store.set("region", json!("Poltava")).await.unwrap(), None);
        assert!(!store.delete("city").await.unwrap());
        assert_eq!(store.get("city").await.unwrap(), Some(json!("Kyiv")));
        assert_eq!(store.getall().await.unwrap(), vec!["city"]);
    }

    #[tokio::test]
    async fn test_find_filters_keys() {
        let dir = tempdir().unwrap();
        let store = JsonFileDatasource::open(dir.path().join("s.json"), DatasourceOptions::default())
            .await
            .unwrap();
        for key in ["city", "state", "region"] {
            store.set(key, json!(key)).await.unwrap();
        }

        let mut found = store.find(&Regex::new("(?i)E").unwrap()).await.unwrap();
        found.sort();
        assert_eq!(found, vec!["region", "state"]);
    }
}
