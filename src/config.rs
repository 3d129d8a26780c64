// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for repositories.
//!
//! # Example
//!
//! ```
//! use layered_repository::{RepositoryConfig, SyncStrategy};
//!
//! // Minimal config (uses defaults)
//! let config = RepositoryConfig::default();
//! assert_eq!(config.sync_strategy, SyncStrategy::SyncOnUpdate);
//! assert!(config.datasources.is_empty());
//!
//! // Write-behind with a 5 second sync timer
//! let config = RepositoryConfig {
//!     sync_strategy: SyncStrategy::SyncOnTimeout,
//!     sync_interval_ms: 5_000,
//!     ..Default::default()
//! };
//! assert!(config.sync_interval().is_some());
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::datasource::{
    Datasource, DatasourceError, DatasourceOptions, InMemoryDatasource, JsonFileDatasource, JsonFileOptions,
};
use crate::repository::SyncStrategy;

/// Declarative datasource definition.
///
/// ```
/// use layered_repository::DatasourceConfig;
///
/// let ds: DatasourceConfig = serde_json::from_str(
///     r#"{"kind": "json_file", "path": "users.json", "read_priority": 1}"#
/// ).unwrap();
/// assert!(matches!(ds, DatasourceConfig::JsonFile { .. }));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasourceConfig {
    Memory {
        #[serde(flatten)]
        options: DatasourceOptions,
    },
    JsonFile {
        path: PathBuf,
        #[serde(default)]
        force_empty: bool,
        #[serde(flatten)]
        options: DatasourceOptions,
    },
    JsonReadonly {
        path: PathBuf,
        #[serde(flatten)]
        options: DatasourceOptions,
    },
}

impl DatasourceConfig {
    /// Instantiate the datasource this entry describes.
    ///
    /// JSON files are created (or truncated) here; read-only files are not
    /// touched until first read.
    pub async fn open(&self) -> Result<Arc<dyn Datasource>, DatasourceError> {
        let datasource: Arc<dyn Datasource> = match self {
            Self::Memory { options } => Arc::new(InMemoryDatasource::with_options(*options)),
            Self::JsonFile { path, force_empty, options } => {
                let file_options = JsonFileOptions { force_empty: *force_empty };
                Arc::new(JsonFileDatasource::open_with(path, file_options, *options).await?)
            }
            Self::JsonReadonly { path, options } => Arc::new(JsonFileDatasource::read_only(path, *options)),
        };
        Ok(datasource)
    }
}

/// Configuration for a repository.
///
/// All fields have defaults. Datasources listed here are opened by
/// [`RepositoryBuilder::from_config`](crate::RepositoryBuilder::from_config);
/// an empty list means a single fresh in-memory datasource.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    /// Which repository tier to build (default: `sync_on_update`)
    #[serde(default)]
    pub sync_strategy: SyncStrategy,

    /// Timer period for `sync_on_timeout`, in milliseconds (0 = no timer)
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// Datasource stack, in registration order
    #[serde(default)]
    pub datasources: Vec<DatasourceConfig>,
}

fn default_sync_interval_ms() -> u64 { 0 }

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            sync_strategy: SyncStrategy::default(),
            sync_interval_ms: default_sync_interval_ms(),
            datasources: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    /// Timer period, `None` when disabled
    #[must_use]
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_ms > 0).then(|| Duration::from_millis(self.sync_interval_ms))
    }
}
