// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write-behind tier (`SyncOnRequest`).
//!
//! Writes and deletes land in a [`SyncCacheDatasource`] instead of the
//! backing stack. Reads see the cache first: a pending value shadows the
//! backing value and a tombstone hides it. [`sync()`](Repository::sync)
//! drains the cache into the write-routing tier.
//!
//! # Sync protocol
//!
//! ```text
//! snapshot cache ──► Set entries ──► backing mset ──► clear acknowledged keys
//!                └─► Delete entries ─► backing mdelete ─► clear tombstones
//! ```
//!
//! A failing backing call aborts the drain and leaves its entries cached for
//! the next attempt. Keys rewritten while a drain is in flight are not
//! cleared: only entries still equal to the snapshot are removed.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::datasource::{CacheEntry, SyncCacheDatasource};
use crate::metrics::LatencyTimer;

use super::types::{RepositoryError, SyncReport};
use super::write_through::WriteThroughRepository;
use super::Repository;

const TIER: &str = "write_behind";

pub struct WriteBehindRepository {
    backing: WriteThroughRepository,
    cache: SyncCacheDatasource,
}

impl WriteBehindRepository {
    #[must_use]
    pub fn new(backing: WriteThroughRepository) -> Self {
        Self {
            backing,
            cache: SyncCacheDatasource::new(),
        }
    }

    /// The write-routing tier that `sync()` drains into
    #[must_use]
    pub fn backing(&self) -> &WriteThroughRepository {
        &self.backing
    }

    /// The pending-write cache
    #[must_use]
    pub fn cache(&self) -> &SyncCacheDatasource {
        &self.cache
    }

    /// Number of writes and tombstones waiting for the next sync
    #[must_use]
    pub fn pending(&self) -> usize {
        self.cache.len()
    }

    /// Apply cached writes and tombstones on top of a backing key set.
    fn overlay(mut keys: IndexSet<String>, cached: Vec<(String, CacheEntry)>) -> Vec<String> {
        for (key, entry) in cached {
            match entry {
                CacheEntry::Set(_) => {
                    keys.insert(key);
                }
                CacheEntry::Delete => {
                    keys.shift_remove(&key);
                }
            }
        }
        keys.into_iter().collect()
    }
}

#[async_trait]
impl Repository for WriteBehindRepository {
    async fn get(&self, id: &str) -> Result<Option<Value>, RepositoryError> {
        // A cached null shadows the backing value and reads as a miss
        match self.cache.expose(id) {
            Some(CacheEntry::Set(value)) if !value.is_null() => Ok(Some(self.backing.reader().present(value))),
            Some(_) => Ok(None),
            None => self.backing.get(id).await,
        }
    }

    async fn set(&self, id: &str, value: Value) -> Result<Option<String>, RepositoryError> {
        self.cache.put(id, value);
        crate::metrics::set_sync_pending(self.cache.len());
        Ok(Some(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        self.cache.mark_as_removed(id);
        crate::metrics::set_sync_pending(self.cache.len());
        Ok(true)
    }

    async fn mget(&self, ids: &[String]) -> Result<HashMap<String, Option<Value>>, RepositoryError> {
        let _timer = LatencyTimer::new(TIER, "mget");
        let cached = self.cache.expose_many(ids);
        let remaining: Vec<String> = ids
            .iter()
            .filter(|id| !cached.contains_key(*id))
            .cloned()
            .collect();

        let mut merged = if remaining.is_empty() {
            HashMap::new()
        } else {
            self.backing.reader().mget_raw(&remaining).await
        };
        for (id, entry) in cached {
            let value = match entry {
                CacheEntry::Set(value) => Some(value).filter(|v| !v.is_null()),
                CacheEntry::Delete => None,
            };
            merged.insert(id, value);
        }
        Ok(self.backing.reader().present_map(merged))
    }

    async fn mset(&self, payload: &IndexMap<String, Value>) -> Result<Vec<String>, RepositoryError> {
        let mut written = Vec::with_capacity(payload.len());
        for (id, value) in payload {
            if let Some(id) = self.set(id, value.clone()).await? {
                written.push(id);
            }
        }
        Ok(written)
    }

    async fn mdelete(&self, ids: &[String]) -> Result<HashMap<String, bool>, RepositoryError> {
        let mut report = HashMap::with_capacity(ids.len());
        for id in ids {
            let marked = self.delete(id).await?;
            report.insert(id.clone(), marked);
        }
        Ok(report)
    }

    async fn getall(&self) -> Result<Vec<String>, RepositoryError> {
        let keys = self.backing.reader().getall_keys().await?;
        Ok(Self::overlay(keys, self.cache.snapshot()))
    }

    async fn find(&self, pattern: &str) -> Result<Vec<String>, RepositoryError> {
        let pattern = Regex::new(pattern)?;
        let keys = self.backing.reader().find_keys(&pattern).await?;
        Ok(Self::overlay(keys, self.cache.matching(&pattern)))
    }

    #[tracing::instrument(skip(self), fields(pending))]
    async fn sync(&self) -> Result<SyncReport, RepositoryError> {
        let _timer = LatencyTimer::new(TIER, "sync");
        let snapshot = self.cache.snapshot();
        tracing::Span::current().record("pending", snapshot.len());
        if snapshot.is_empty() {
            debug!("Sync cache empty, nothing to drain");
            return Ok(SyncReport::default());
        }

        let mut writes: IndexMap<String, Value> = IndexMap::new();
        let mut removals: Vec<String> = Vec::new();
        for (id, entry) in snapshot {
            match entry {
                CacheEntry::Set(value) => {
                    writes.insert(id, value);
                }
                CacheEntry::Delete => removals.push(id),
            }
        }

        let mut report = SyncReport::default();

        if !writes.is_empty() {
            let acknowledged = match self.backing.mset(&writes).await {
                Ok(acknowledged) => acknowledged,
                Err(e) => {
                    warn!(writes = writes.len(), error = %e, "Sync write drain failed, entries stay cached");
                    crate::metrics::record_sync(0, 0, false);
                    return Err(e);
                }
            };
            let expected: Vec<(String, CacheEntry)> = acknowledged
                .into_iter()
                .filter_map(|id| {
                    let value = writes.get(&id)?.clone();
                    Some((id, CacheEntry::Set(value)))
                })
                .collect();
            report.applied = self.cache.remove_if_unchanged(&expected);
        }

        if !removals.is_empty() {
            if let Err(e) = self.backing.mdelete(&removals).await {
                warn!(tombstones = removals.len(), error = %e, "Sync delete drain failed, tombstones stay cached");
                crate::metrics::record_sync(report.applied.len(), 0, false);
                return Err(e);
            }
            let expected: Vec<(String, CacheEntry)> = removals
                .into_iter()
                .map(|id| (id, CacheEntry::Delete))
                .collect();
            report.removed = self.cache.remove_if_unchanged(&expected);
        }

        report.pending = self.cache.len();
        crate::metrics::record_sync(report.applied.len(), report.removed.len(), true);
        crate::metrics::set_sync_pending(report.pending);
        info!(
            applied = report.applied.len(),
            removed = report.removed.len(),
            pending = report.pending,
            "Sync drain complete"
        );
        Ok(report)
    }
}
