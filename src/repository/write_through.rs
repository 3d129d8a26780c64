// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write routing tier (`SyncOnUpdate`).
//!
//! Every write reaches backing storage before the call resolves:
//! - `WriteAlways` datasources all receive the write, concurrently
//! - `WriteFirst` datasources are tried one at a time in write-priority
//!   order until one acknowledges
//! - `NoWrite` datasources are never written or deleted from
//!
//! Both paths run concurrently and are both awaited.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::{debug, warn};

use crate::datasource::DatasourceError;
use crate::metrics::LatencyTimer;

use super::read_through::ReadThroughRepository;
use super::stack::Registration;
use super::types::{RepositoryError, SyncReport};
use super::Repository;

const TIER: &str = "write_through";

/// Counts targeted datasources and their failures for one write call.
///
/// The call only fails when every datasource it targeted failed.
#[derive(Default)]
struct WriteTally {
    attempted: usize,
    failures: Vec<String>,
}

impl WriteTally {
    fn observe<T>(&mut self, operation: &'static str, reg: &Registration, result: Result<T, DatasourceError>) -> Option<T> {
        self.attempted += 1;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(operation, datasource = reg.label(), error = %e, "Datasource write failed");
                crate::metrics::record_datasource_error(reg.kind(), operation);
                self.failures.push(format!("{}: {}", reg.label(), e));
                None
            }
        }
    }

    fn merge(&mut self, other: WriteTally) {
        self.attempted += other.attempted;
        self.failures.extend(other.failures);
    }

    fn finish<T>(self, operation: &'static str, value: T) -> Result<T, RepositoryError> {
        let all_failed = self.attempted > 0 && self.failures.len() == self.attempted;
        crate::metrics::record_operation(TIER, operation, if all_failed { "error" } else { "success" });
        if all_failed {
            return Err(RepositoryError::AllWritesFailed {
                operation,
                attempted: self.attempted,
                failures: self.failures,
            });
        }
        Ok(value)
    }
}

pub struct WriteThroughRepository {
    reader: ReadThroughRepository,
}

impl WriteThroughRepository {
    #[must_use]
    pub fn new(reader: ReadThroughRepository) -> Self {
        Self { reader }
    }

    /// The read tier this repository routes reads through
    #[must_use]
    pub fn reader(&self) -> &ReadThroughRepository {
        &self.reader
    }

    /// Walk the `WriteFirst` group until one datasource acknowledges the key.
    async fn set_first(&self, id: &str, value: &Value) -> (Option<String>, WriteTally) {
        let mut tally = WriteTally::default();
        for reg in self.reader.stack().write_first() {
            let result = reg.datasource().set(id, value.clone()).await;
            if let Some(Some(ack)) = tally.observe("set", reg, result) {
                debug!(id, datasource = reg.label(), "Write-first winner");
                return (Some(ack), tally);
            }
        }
        (None, tally)
    }

    async fn set_always(&self, id: &str, value: &Value) -> (bool, WriteTally) {
        let group = self.reader.stack().write_always();
        let results = join_all(group.iter().map(|reg| reg.datasource().set(id, value.clone()))).await;

        let mut tally = WriteTally::default();
        let mut acknowledged = false;
        for (reg, result) in group.iter().zip(results) {
            if let Some(Some(_)) = tally.observe("set", reg, result) {
                acknowledged = true;
            }
        }
        (acknowledged, tally)
    }

    async fn mset_first(&self, payload: &IndexMap<String, Value>) -> (Vec<String>, WriteTally) {
        let mut tally = WriteTally::default();
        for reg in self.reader.stack().write_first() {
            let result = reg.batch_set(payload).await;
            if let Some(acks) = tally.observe("mset", reg, result) {
                debug!(datasource = reg.label(), written = acks.len(), "Write-first batch winner");
                return (acks, tally);
            }
        }
        (Vec::new(), tally)
    }

    async fn mset_always(&self, payload: &IndexMap<String, Value>) -> (Vec<String>, WriteTally) {
        let group = self.reader.stack().write_always();
        let results = join_all(group.iter().map(|reg| reg.batch_set(payload))).await;

        let mut tally = WriteTally::default();
        let mut acks = Vec::new();
        for (reg, result) in group.iter().zip(results) {
            if let Some(written) = tally.observe("mset", reg, result) {
                acks.extend(written);
            }
        }
        (acks, tally)
    }
}

#[async_trait]
impl Repository for WriteThroughRepository {
    async fn get(&self, id: &str) -> Result<Option<Value>, RepositoryError> {
        self.reader.get(id).await
    }

    async fn set(&self, id: &str, value: Value) -> Result<Option<String>, RepositoryError> {
        let _timer = LatencyTimer::new(TIER, "set");
        let ((winner, mut tally), (broadcast, always_tally)) =
            tokio::join!(self.set_first(id, &value), self.set_always(id, &value));
        tally.merge(always_tally);

        let ack = (winner.is_some() || broadcast).then(|| id.to_string());
        tally.finish("set", ack)
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let _timer = LatencyTimer::new(TIER, "delete");
        let group = self.reader.stack().write_allowed();
        let results = join_all(group.iter().map(|reg| reg.datasource().delete(id))).await;

        let mut tally = WriteTally::default();
        let mut removed = false;
        for (reg, result) in group.iter().zip(results) {
            removed |= tally.observe("delete", reg, result).unwrap_or(false);
        }
        tally.finish("delete", removed)
    }

    async fn mget(&self, ids: &[String]) -> Result<HashMap<String, Option<Value>>, RepositoryError> {
        self.reader.mget(ids).await
    }

    async fn mset(&self, payload: &IndexMap<String, Value>) -> Result<Vec<String>, RepositoryError> {
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        let _timer = LatencyTimer::new(TIER, "mset");
        let ((winner, mut tally), (broadcast, always_tally)) =
            tokio::join!(self.mset_first(payload), self.mset_always(payload));
        tally.merge(always_tally);

        let written: IndexSet<String> = winner.into_iter().chain(broadcast).collect();
        tally.finish("mset", written.into_iter().collect())
    }

    async fn mdelete(&self, ids: &[String]) -> Result<HashMap<String, bool>, RepositoryError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let _timer = LatencyTimer::new(TIER, "mdelete");
        let group = self.reader.stack().write_allowed();
        let results = join_all(group.iter().map(|reg| reg.batch_delete(ids))).await;

        let mut tally = WriteTally::default();
        let mut merged: HashMap<String, bool> = ids.iter().map(|id| (id.clone(), false)).collect();
        for (reg, result) in group.iter().zip(results) {
            let Some(report) = tally.observe("mdelete", reg, result) else { continue };
            for (id, removed) in report {
                *merged.entry(id).or_insert(false) |= removed;
            }
        }
        tally.finish("mdelete", merged)
    }

    async fn getall(&self) -> Result<Vec<String>, RepositoryError> {
        self.reader.getall().await
    }

    async fn find(&self, pattern: &str) -> Result<Vec<String>, RepositoryError> {
        self.reader.find(pattern).await
    }

    /// Writes already reached backing storage; nothing to flush.
    async fn sync(&self) -> Result<SyncReport, RepositoryError> {
        Ok(SyncReport::default())
    }
}
