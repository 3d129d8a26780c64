// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tombstone-aware write-behind cache.
//!
//! Holds at most one pending operation per key: either a value waiting to be
//! written or a tombstone waiting to be applied as a delete. A later write to
//! the same key always replaces the earlier entry.

use std::collections::HashMap;

use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;

/// A pending operation held in the sync cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// Value to be written on next sync
    Set(Value),
    /// Tombstone: key to be deleted on next sync
    Delete,
}

impl CacheEntry {
    /// The pending value, `None` for tombstones
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Set(value) => Some(value),
            Self::Delete => None,
        }
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

/// In-memory cache of pending writes and tombstones.
///
/// Owned by the write-behind tier and never placed in a datasource stack:
/// reads go through [`expose`](Self::expose), which keeps tombstones
/// visible so they can hide backing values.
pub struct SyncCacheDatasource {
    entries: RwLock<IndexMap<String, CacheEntry>>,
}

impl SyncCacheDatasource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
        }
    }

    /// Raw entry for a key
    #[must_use]
    pub fn expose(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Raw entries for the keys that have one
    #[must_use]
    pub fn expose_many(&self, keys: &[String]) -> HashMap<String, CacheEntry> {
        let entries = self.entries.read();
        keys.iter()
            .filter_map(|key| entries.get(key).map(|entry| (key.clone(), entry.clone())))
            .collect()
    }

    /// Record a pending write, replacing any earlier entry for the key.
    pub fn put(&self, key: &str, value: Value) {
        self.entries.write().insert(key.to_string(), CacheEntry::Set(value));
    }

    /// Record a tombstone, replacing any earlier entry for the key.
    pub fn mark_as_removed(&self, key: &str) {
        self.entries.write().insert(key.to_string(), CacheEntry::Delete);
    }

    /// Point-in-time copy of every pending entry, in insertion order
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, CacheEntry)> {
        self.entries
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Entries whose key matches `pattern`
    #[must_use]
    pub fn matching(&self, pattern: &Regex) -> Vec<(String, CacheEntry)> {
        self.entries
            .read()
            .iter()
            .filter(|(key, _)| pattern.is_match(key))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Remove entries that still hold exactly the expected operation.
    ///
    /// Entries replaced since `expected` was taken are left in place for the
    /// next sync. Returns the keys actually removed.
    pub fn remove_if_unchanged(&self, expected: &[(String, CacheEntry)]) -> Vec<String> {
        let mut entries = self.entries.write();
        expected
            .iter()
            .filter_map(|(key, entry)| {
                if entries.get(key) == Some(entry) {
                    entries.shift_remove(key);
                    Some(key.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Number of pending entries (writes and tombstones)
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for SyncCacheDatasource {
    fn default() -> Self {
        Self::new()
    }
}
