// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read fan-out tier (`NoSync`).
//!
//! Reads walk the stack in read-priority order and fall back to the next
//! datasource on a miss or a failure. Writes are no-ops at this tier; the
//! write tiers wrap it and reuse its raw read paths.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::try_join_all;
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::metrics::LatencyTimer;

use super::stack::DatasourceStack;
use super::types::{EntityFactory, RepositoryError, SyncReport};
use super::Repository;

const TIER: &str = "read_through";

pub struct ReadThroughRepository {
    stack: DatasourceStack,
    entity_factory: Option<EntityFactory>,
}

impl ReadThroughRepository {
    #[must_use]
    pub fn new(stack: DatasourceStack, entity_factory: Option<EntityFactory>) -> Self {
        Self { stack, entity_factory }
    }

    #[must_use]
    pub fn stack(&self) -> &DatasourceStack {
        &self.stack
    }

    /// Apply the entity factory, if any
    pub(crate) fn present(&self, value: Value) -> Value {
        match &self.entity_factory {
            Some(factory) => factory(value),
            None => value,
        }
    }

    pub(crate) fn present_map(&self, raw: HashMap<String, Option<Value>>) -> HashMap<String, Option<Value>> {
        raw.into_iter()
            .map(|(id, value)| (id, value.map(|v| self.present(v))))
            .collect()
    }

    /// First non-null value in read-priority order, without the entity factory.
    pub(crate) async fn get_raw(&self, id: &str) -> Option<Value> {
        for reg in self.stack.readers() {
            match reg.datasource().get(id).await {
                Ok(Some(value)) if !value.is_null() => {
                    debug!(id, datasource = reg.label(), "Read hit");
                    return Some(value);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(id, datasource = reg.label(), error = %e, "Read failed, falling back to next datasource");
                    crate::metrics::record_fallback("get", reg.kind());
                }
            }
        }
        None
    }

    /// Batch read over the stack, without the entity factory.
    ///
    /// Each datasource is asked only for ids still unresolved. A failed batch
    /// call is retried against the same datasource as per-id reads before
    /// moving on. Every requested id is present in the result.
    pub(crate) async fn mget_raw(&self, ids: &[String]) -> HashMap<String, Option<Value>> {
        let mut pending: IndexSet<String> = ids.iter().cloned().collect();
        let mut resolved: HashMap<String, Value> = HashMap::with_capacity(pending.len());

        for reg in self.stack.readers() {
            if pending.is_empty() {
                break;
            }
            let batch: Vec<String> = pending.iter().cloned().collect();
            let found = match reg.batch_get(&batch).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(datasource = reg.label(), ids = batch.len(), error = %e, "Batch read failed, retrying per id");
                    crate::metrics::record_fallback("mget", reg.kind());
                    reg.degraded_get(&batch).await
                }
            };

            for (id, value) in found {
                let Some(value) = value.filter(|v| !v.is_null()) else { continue };
                if pending.swap_remove(&id) {
                    resolved.insert(id, value);
                }
            }
            debug!(datasource = reg.label(), remaining = pending.len(), "Batch read pass complete");
        }

        ids.iter()
            .map(|id| (id.clone(), resolved.get(id).cloned()))
            .collect()
    }

    /// Union of every datasource's keys, in order of first appearance.
    pub(crate) async fn getall_keys(&self) -> Result<IndexSet<String>, RepositoryError> {
        let reports = try_join_all(self.stack.readers().iter().map(|reg| reg.datasource().getall())).await?;
        Ok(reports.into_iter().flatten().collect())
    }

    /// Union of every datasource's keys matching `pattern`.
    pub(crate) async fn find_keys(&self, pattern: &Regex) -> Result<IndexSet<String>, RepositoryError> {
        let reports = try_join_all(self.stack.readers().iter().map(|reg| reg.find(pattern))).await?;
        Ok(reports.into_iter().flatten().collect())
    }
}

#[async_trait]
impl Repository for ReadThroughRepository {
    async fn get(&self, id: &str) -> Result<Option<Value>, RepositoryError> {
        let _timer = LatencyTimer::new(TIER, "get");
        Ok(self.get_raw(id).await.map(|value| self.present(value)))
    }

    async fn set(&self, _id: &str, _value: Value) -> Result<Option<String>, RepositoryError> {
        Ok(None)
    }

    async fn delete(&self, _id: &str) -> Result<bool, RepositoryError> {
        Ok(false)
    }

    async fn mget(&self, ids: &[String]) -> Result<HashMap<String, Option<Value>>, RepositoryError> {
        let _timer = LatencyTimer::new(TIER, "mget");
        Ok(self.present_map(self.mget_raw(ids).await))
    }

    async fn mset(&self, _payload: &IndexMap<String, Value>) -> Result<Vec<String>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn mdelete(&self, _ids: &[String]) -> Result<HashMap<String, bool>, RepositoryError> {
        Ok(HashMap::new())
    }

    async fn getall(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self.getall_keys().await?.into_iter().collect())
    }

    async fn find(&self, pattern: &str) -> Result<Vec<String>, RepositoryError> {
        let pattern = Regex::new(pattern)?;
        Ok(self.find_keys(&pattern).await?.into_iter().collect())
    }

    async fn sync(&self) -> Result<SyncReport, RepositoryError> {
        Ok(SyncReport::default())
    }
}
