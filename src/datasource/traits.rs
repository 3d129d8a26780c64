// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The capability contract every datasource backend satisfies.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid data in '{location}': {reason}")]
    InvalidData { location: String, reason: String },
    #[error("Datasource backend error: {0}")]
    Backend(String),
}

/// How a datasource takes part in write fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Read-only participant, skipped by every write and delete.
    NoWrite,
    /// Competes for a single write, highest `write_priority` first.
    #[default]
    WriteFirst,
    /// Receives every write unconditionally.
    WriteAlways,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoWrite => write!(f, "NoWrite"),
            Self::WriteFirst => write!(f, "WriteFirst"),
            Self::WriteAlways => write!(f, "WriteAlways"),
        }
    }
}

/// Routing descriptor attached to a datasource.
///
/// Fixed for the lifetime of the repository the datasource is registered in.
///
/// # Example
///
/// ```
/// use layered_repository::{DatasourceOptions, WriteMode};
///
/// let opts = DatasourceOptions::new()
///     .with_read_priority(10.0)
///     .with_write_mode(WriteMode::WriteAlways);
///
/// assert_eq!(opts.read_priority, 10.0);
/// assert_eq!(opts.write_priority, f64::NEG_INFINITY);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DatasourceOptions {
    /// Higher is consulted first on reads (default: -inf)
    #[serde(default = "default_priority")]
    pub read_priority: f64,

    /// Write routing mode (default: `WriteFirst`)
    #[serde(default)]
    pub write_mode: WriteMode,

    /// Ordering inside the `WriteFirst` group (default: -inf)
    #[serde(default = "default_priority")]
    pub write_priority: f64,
}

fn default_priority() -> f64 { f64::NEG_INFINITY }

impl Default for DatasourceOptions {
    fn default() -> Self {
        Self {
            read_priority: default_priority(),
            write_mode: WriteMode::default(),
            write_priority: default_priority(),
        }
    }
}

impl DatasourceOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_read_priority(mut self, priority: f64) -> Self {
        self.read_priority = priority;
        self
    }

    #[must_use]
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    #[must_use]
    pub fn with_write_priority(mut self, priority: f64) -> Self {
        self.write_priority = priority;
        self
    }

    /// Check if the datasource participates in writes at all
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.write_mode != WriteMode::NoWrite
    }
}

/// Native operations a datasource implements beyond the required core.
///
/// Read once when the datasource is registered into a stack. Anything
/// reported as `false` is synthesized by the repository from per-key calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub batch_get: bool,
    pub batch_set: bool,
    pub batch_delete: bool,
    pub find: bool,
}

impl Capabilities {
    /// Only the required core (get/set/delete/getall)
    pub const NONE: Self = Self {
        batch_get: false,
        batch_set: false,
        batch_delete: false,
        find: false,
    };

    /// Every optional operation is native
    pub const ALL: Self = Self {
        batch_get: true,
        batch_set: true,
        batch_delete: true,
        find: true,
    };
}

/// A key-value backend that can be stacked behind a repository.
///
/// Only `get`, `set`, `delete` and `getall` are required. The batch
/// methods and `find` have sequential default implementations; a backend
/// that overrides one of them should also advertise it via
/// [`capabilities()`](Self::capabilities) so repositories call it.
///
/// Not-found is never an error: `get` returns `Ok(None)` and `delete`
/// returns `Ok(false)`.
#[async_trait]
pub trait Datasource: Send + Sync {
    /// Routing descriptor for this datasource
    fn options(&self) -> &DatasourceOptions;

    /// Native optional operations (default: none)
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Short backend name used in logs and metric labels
    fn kind(&self) -> &'static str {
        "custom"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, DatasourceError>;

    /// Store a value. Resolves with the key on success.
    async fn set(&self, key: &str, value: Value) -> Result<Option<String>, DatasourceError>;

    /// Remove a value. `true` iff an entry existed and was removed.
    async fn delete(&self, key: &str) -> Result<bool, DatasourceError>;

    /// List every key held by this datasource.
    async fn getall(&self) -> Result<Vec<String>, DatasourceError>;

    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Option<Value>>, DatasourceError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            found.insert(key.clone(), self.get(key).await?);
        }
        Ok(found)
    }

    /// Store many values. Resolves with the keys that were written.
    async fn mset(&self, payload: &IndexMap<String, Value>) -> Result<Vec<String>, DatasourceError> {
        let mut written = Vec::with_capacity(payload.len());
        for (key, value) in payload {
            if let Some(key) = self.set(key, value.clone()).await? {
                written.push(key);
            }
        }
        Ok(written)
    }

    /// Remove many values. Reports per key whether something was removed.
    async fn mdelete(&self, keys: &[String]) -> Result<HashMap<String, bool>, DatasourceError> {
        let mut removed = HashMap::with_capacity(keys.len());
        for key in keys {
            let existed = self.delete(key).await?;
            removed.insert(key.clone(), existed);
        }
        Ok(removed)
    }

    /// Keys matching a regular expression.
    async fn find(&self, pattern: &Regex) -> Result<Vec<String>, DatasourceError> {
        Ok(self
            .getall()
            .await?
            .into_iter()
            .filter(|key| pattern.is_match(key))
            .collect())
    }
}
