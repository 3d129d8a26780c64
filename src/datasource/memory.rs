// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;

use super::traits::{Capabilities, Datasource, DatasourceError, DatasourceOptions};

/// Plain in-memory map datasource. Keys are listed in insertion order.
pub struct InMemoryDatasource {
    options: DatasourceOptions,
    data: RwLock<IndexMap<String, Value>>,
}

impl InMemoryDatasource {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(DatasourceOptions::default())
    }

    #[must_use]
    pub fn with_options(options: DatasourceOptions) -> Self {
        Self {
            options,
            data: RwLock::new(IndexMap::new()),
        }
    }

    /// Get current item count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Clear all items
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl Default for InMemoryDatasource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Datasource for InMemoryDatasource {
    fn options(&self) -> &DatasourceOptions {
        &self.options
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, DatasourceError> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<Option<String>, DatasourceError> {
        self.data.write().insert(key.to_string(), value);
        Ok(Some(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<bool, DatasourceError> {
        Ok(self.data.write().shift_remove(key).is_some())
    }

    async fn getall(&self) -> Result<Vec<String>, DatasourceError> {
        Ok(self.data.read().keys().cloned().collect())
    }

    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Option<Value>>, DatasourceError> {
        let data = self.data.read();
        Ok(keys
            .iter()
            .map(|key| (key.clone(), data.get(key).cloned()))
            .collect())
    }

    async fn mset(&self, payload: &IndexMap<String, Value>) -> Result<Vec<String>, DatasourceError> {
        let mut data = self.data.write();
        for (key, value) in payload {
            data.insert(key.clone(), value.clone());
        }
        Ok(payload.keys().cloned().collect())
    }

    async fn mdelete(&self, keys: &[String]) -> Result<HashMap<String, bool>, DatasourceError> {
        let mut data = self.data.write();
        Ok(keys
            .iter()
            .map(|key| (key.clone(), data.shift_remove(key).is_some()))
            .collect())
    }

    async fn find(&self, pattern: &Regex) -> Result<Vec<String>, DatasourceError> {
        Ok(self
            .data
            .read()
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

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryDatasource::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_set_resolves_with_key() {
        let store = InMemoryDatasource::new();
        let ack = store.set("key", json!("value")).await.unwrap();
        assert_eq!(ack.as_deref(), Some("key"));
        assert_eq!(store.get("key").await.unwrap(), Some(json!("value")));
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = InMemoryDatasource::new();
        assert!(store.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = InMemoryDatasource::new();
        store.set("to-delete", json!(1)).await.unwrap();

        assert!(store.delete("to-delete").await.unwrap());
        assert!(!store.delete("to-delete").await.unwrap());
        assert!(store.get("to-delete").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_getall_keeps_insertion_order() {
        let store = InMemoryDatasource::new();
        store.set("key2", json!(2)).await.unwrap();
        store.set("key1", json!(1)).await.unwrap();
        store.set("weird-key", json!(3)).await.unwrap();
        store.delete("key1").await.unwrap();

        assert_eq!(store.getall().await.unwrap(), vec!["key2", "weird-key"]);
    }

    #[tokio::test]
    async fn test_batch_operations() {
        let store = InMemoryDatasource::new();
        let payload: IndexMap<String, Value> = [
            ("city".to_string(), json!("Kyiv")),
            ("state".to_string(), json!("Ukraine")),
        ]
        .into_iter()
        .collect();

        let written = store.mset(&payload).await.unwrap();
        assert_eq!(written, vec!["city", "state"]);

        let keys = vec!["city".to_string(), "region".to_string()];
        let found = store.mget(&keys).await.unwrap();
        assert_eq!(found["city"], Some(json!("Kyiv")));
        assert_eq!(found["region"], None);

        let removed = store.mdelete(&keys).await.unwrap();
        assert!(removed["city"]);
        assert!(!removed["region"]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_pattern() {
        let store = InMemoryDatasource::new();
        for key in ["city", "state", "region"] {
            store.set(key, json!(key)).await.unwrap();
        }

        let found = store.find(&Regex::new("y").unwrap()).await.unwrap();
        assert_eq!(found, vec!["city"]);

        let found = store.find(&Regex::new("e").unwrap()).await.unwrap();
        assert_eq!(found, vec!["state", "region"]);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryDatasource::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store_clone = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let key = format!("batch-{}-item-{}", batch, i);
                    store_clone.set(&key, json!(i)).await.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
