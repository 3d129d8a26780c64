// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Priority-ordered datasource stack.
//!
//! Sorting and write grouping happen once, at construction. Each
//! registration also pins the datasource's [`Capabilities`] so batch calls
//! are routed to native implementations or synthesized from per-key calls
//! without re-probing.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::datasource::{Capabilities, Datasource, DatasourceError, DatasourceOptions, WriteMode};

/// A datasource as registered in a stack.
#[derive(Clone)]
pub struct Registration {
    datasource: Arc<dyn Datasource>,
    options: DatasourceOptions,
    capabilities: Capabilities,
    label: String,
}

impl Registration {
    fn new(position: usize, datasource: Arc<dyn Datasource>) -> Self {
        let options = *datasource.options();
        let capabilities = datasource.capabilities();
        let label = format!("{}#{}", datasource.kind(), position);
        Self {
            datasource,
            options,
            capabilities,
            label,
        }
    }

    #[must_use]
    pub fn datasource(&self) -> &Arc<dyn Datasource> {
        &self.datasource
    }

    #[must_use]
    pub fn options(&self) -> &DatasourceOptions {
        &self.options
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// `kind#position` where position is the registration index
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.datasource.kind()
    }

    pub(crate) async fn batch_get(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Option<Value>>, DatasourceError> {
        if self.capabilities.batch_get {
            return self.datasource.mget(keys).await;
        }
        let values = try_join_all(keys.iter().map(|key| self.datasource.get(key))).await?;
        Ok(keys.iter().cloned().zip(values).collect())
    }

    /// Per-key reads where each failure is read as a miss.
    pub(crate) async fn degraded_get(&self, keys: &[String]) -> HashMap<String, Option<Value>> {
        let results = join_all(keys.iter().map(|key| self.datasource.get(key))).await;
        keys.iter()
            .cloned()
            .zip(results)
            .map(|(key, result)| match result {
                Ok(value) => (key, value),
                Err(e) => {
                    warn!(datasource = %self.label, id = %key, error = %e, "Per-id read failed during degraded mget");
                    crate::metrics::record_datasource_error(self.kind(), "get");
                    (key, None)
                }
            })
            .collect()
    }

    pub(crate) async fn batch_set(
        &self,
        payload: &IndexMap<String, Value>,
    ) -> Result<Vec<String>, DatasourceError> {
        if self.capabilities.batch_set {
            return self.datasource.mset(payload).await;
        }
        let acks = try_join_all(
            payload
                .iter()
                .map(|(key, value)| self.datasource.set(key, value.clone())),
        )
        .await?;
        Ok(acks.into_iter().flatten().collect())
    }

    pub(crate) async fn batch_delete(&self, keys: &[String]) -> Result<HashMap<String, bool>, DatasourceError> {
        if self.capabilities.batch_delete {
            return self.datasource.mdelete(keys).await;
        }
        let removed = try_join_all(keys.iter().map(|key| self.datasource.delete(key))).await?;
        Ok(keys.iter().cloned().zip(removed).collect())
    }

    pub(crate) async fn find(&self, pattern: &Regex) -> Result<Vec<String>, DatasourceError> {
        if self.capabilities.find {
            return self.datasource.find(pattern).await;
        }
        Ok(self
            .datasource
            .getall()
            .await?
            .into_iter()
            .filter(|key| pattern.is_match(key))
            .collect())
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("label", &self.label)
            .field("options", &self.options)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Datasources sorted for reads, with the write groups derived from them.
///
/// Sorts are stable: equal priorities keep registration order.
#[derive(Debug, Clone)]
pub struct DatasourceStack {
    readers: Vec<Registration>,
    write_first: Vec<Registration>,
    write_always: Vec<Registration>,
    write_allowed: Vec<Registration>,
}

impl DatasourceStack {
    #[must_use]
    pub fn new(datasources: Vec<Arc<dyn Datasource>>) -> Self {
        let mut readers: Vec<Registration> = datasources
            .into_iter()
            .enumerate()
            .map(|(position, datasource)| Registration::new(position, datasource))
            .collect();
        readers.sort_by(|a, b| b.options.read_priority.total_cmp(&a.options.read_priority));

        let mut write_first: Vec<Registration> = readers
            .iter()
            .filter(|r| r.options.write_mode == WriteMode::WriteFirst)
            .cloned()
            .collect();
        write_first.sort_by(|a, b| b.options.write_priority.total_cmp(&a.options.write_priority));

        let write_always = readers
            .iter()
            .filter(|r| r.options.write_mode == WriteMode::WriteAlways)
            .cloned()
            .collect();

        let write_allowed = readers
            .iter()
            .filter(|r| r.options.is_writable())
            .cloned()
            .collect();

        Self {
            readers,
            write_first,
            write_always,
            write_allowed,
        }
    }

    /// All datasources, highest read priority first
    #[must_use]
    pub fn readers(&self) -> &[Registration] {
        &self.readers
    }

    /// `WriteFirst` datasources, highest write priority first
    #[must_use]
    pub fn write_first(&self) -> &[Registration] {
        &self.write_first
    }

    #[must_use]
    pub fn write_always(&self) -> &[Registration] {
        &self.write_always
    }

    /// Every datasource except `NoWrite` ones
    #[must_use]
    pub fn write_allowed(&self) -> &[Registration] {
        &self.write_allowed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}
