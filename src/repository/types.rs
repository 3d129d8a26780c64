// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for repository tiers.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::datasource::DatasourceError;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Datasource error: {0}")]
    Datasource(#[from] DatasourceError),
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("All {attempted} datasources failed during {operation}: {}", .failures.join("; "))]
    AllWritesFailed {
        operation: &'static str,
        attempted: usize,
        failures: Vec<String>,
    },
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Consistency strategy between writes and backing datasources.
///
/// Selects which repository tier [`RepositoryBuilder::build`](super::RepositoryBuilder::build)
/// instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Read-only fan-out; writes are no-ops
    NoSync,
    /// Every write reaches backing storage immediately
    #[default]
    SyncOnUpdate,
    /// Writes are buffered until `sync()` is called
    SyncOnRequest,
    /// Writes are buffered and flushed by a recurring timer
    SyncOnTimeout,
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSync => write!(f, "NoSync"),
            Self::SyncOnUpdate => write!(f, "SyncOnUpdate"),
            Self::SyncOnRequest => write!(f, "SyncOnRequest"),
            Self::SyncOnTimeout => write!(f, "SyncOnTimeout"),
        }
    }
}

/// Post-read mapping applied to every value a repository returns.
pub type EntityFactory = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Outcome of a `sync()` drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Keys whose pending write reached backing storage and left the cache
    pub applied: Vec<String>,
    /// Keys whose tombstone was applied and left the cache
    pub removed: Vec<String>,
    /// Entries still waiting in the cache after the drain
    pub pending: usize,
}

impl SyncReport {
    /// Check if the drain had nothing to do
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.removed.is_empty()
    }
}
