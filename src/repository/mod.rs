// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Repository tiers over a datasource stack.
//!
//! Each tier wraps the one below it:
//!
//! ```text
//! TimedSyncRepository      (SyncOnTimeout)  timer calls sync()
//!   └─ WriteBehindRepository   (SyncOnRequest)  writes buffered in a sync cache
//!        └─ WriteThroughRepository (SyncOnUpdate)   writes routed to datasources
//!             └─ ReadThroughRepository  (NoSync)         priority-ordered reads
//!                  └─ DatasourceStack
//! ```
//!
//! [`RepositoryBuilder`] picks the depth from a [`SyncStrategy`].

pub mod types;
pub mod stack;
pub mod read_through;
pub mod write_through;
pub mod write_behind;
pub mod timed;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::info;

use crate::config::RepositoryConfig;
use crate::datasource::{Datasource, InMemoryDatasource};

pub use types::{EntityFactory, RepositoryError, SyncReport, SyncStrategy};
pub use stack::{DatasourceStack, Registration};
pub use read_through::ReadThroughRepository;
pub use write_through::WriteThroughRepository;
pub use write_behind::WriteBehindRepository;
pub use timed::TimedSyncRepository;

/// The operation set shared by every repository tier.
///
/// Reads never fail because a single datasource failed; they fall back to
/// the next one. Values returned by `get` and `mget` have been passed
/// through the entity factory, if one is configured.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Value for `id` from the highest-priority datasource holding it.
    async fn get(&self, id: &str) -> Result<Option<Value>, RepositoryError>;

    /// Store `value` under `id`, returning the id if any datasource took it.
    async fn set(&self, id: &str, value: Value) -> Result<Option<String>, RepositoryError>;

    /// Remove `id`, returning whether anything was removed.
    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;

    /// Batch read; every requested id is present in the result.
    async fn mget(&self, ids: &[String]) -> Result<HashMap<String, Option<Value>>, RepositoryError>;

    /// Batch write; returns the ids that were stored.
    async fn mset(&self, payload: &IndexMap<String, Value>) -> Result<Vec<String>, RepositoryError>;

    /// Batch delete; reports per id whether anything was removed.
    async fn mdelete(&self, ids: &[String]) -> Result<HashMap<String, bool>, RepositoryError>;

    /// Every known key, deduplicated.
    async fn getall(&self) -> Result<Vec<String>, RepositoryError>;

    /// Keys matching a regular expression.
    async fn find(&self, pattern: &str) -> Result<Vec<String>, RepositoryError>;

    /// Flush buffered writes. A no-op below the write-behind tier.
    async fn sync(&self) -> Result<SyncReport, RepositoryError>;
}

/// Assembles a repository tier over a set of datasources.
///
/// # Example
///
/// ```
/// use layered_repository::{InMemoryDatasource, RepositoryBuilder, SyncStrategy};
///
/// # tokio_test_block_on(async {
/// let repo = RepositoryBuilder::new()
///     .datasource(InMemoryDatasource::new())
///     .sync_strategy(SyncStrategy::SyncOnRequest)
///     .build()
///     .unwrap();
///
/// repo.set("user:1", serde_json::json!({"name": "ada"})).await.unwrap();
/// assert_eq!(repo.sync().await.unwrap().applied, vec!["user:1"]);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct RepositoryBuilder {
    datasources: Vec<Arc<dyn Datasource>>,
    entity_factory: Option<EntityFactory>,
    strategy: SyncStrategy,
    interval: Option<Duration>,
}

impl RepositoryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            datasources: Vec::new(),
            entity_factory: None,
            strategy: SyncStrategy::default(),
            interval: None,
        }
    }

    /// Builder seeded from config, with its datasources opened.
    pub async fn from_config(config: &RepositoryConfig) -> Result<Self, RepositoryError> {
        let mut builder = Self::new()
            .sync_strategy(config.sync_strategy)
            .interval(config.sync_interval());
        for entry in &config.datasources {
            builder = builder.shared_datasource(entry.open().await?);
        }
        Ok(builder)
    }

    /// Register a datasource. Registration order breaks priority ties.
    #[must_use]
    pub fn datasource(self, datasource: impl Datasource + 'static) -> Self {
        self.shared_datasource(Arc::new(datasource))
    }

    /// Register a datasource the caller keeps a handle to.
    #[must_use]
    pub fn shared_datasource(mut self, datasource: Arc<dyn Datasource>) -> Self {
        self.datasources.push(datasource);
        self
    }

    #[must_use]
    pub fn entity_factory(mut self, factory: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.entity_factory = Some(Arc::new(factory));
        self
    }

    #[must_use]
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Timer period for [`SyncStrategy::SyncOnTimeout`]
    #[must_use]
    pub fn interval(mut self, interval: Option<Duration>) -> Self {
        self.interval = interval;
        self
    }

    fn stack(datasources: Vec<Arc<dyn Datasource>>) -> DatasourceStack {
        if datasources.is_empty() {
            return DatasourceStack::new(vec![Arc::new(InMemoryDatasource::new())]);
        }
        DatasourceStack::new(datasources)
    }

    #[must_use]
    pub fn build_read_through(self) -> ReadThroughRepository {
        ReadThroughRepository::new(Self::stack(self.datasources), self.entity_factory)
    }

    #[must_use]
    pub fn build_write_through(self) -> WriteThroughRepository {
        WriteThroughRepository::new(self.build_read_through())
    }

    #[must_use]
    pub fn build_write_behind(self) -> WriteBehindRepository {
        WriteBehindRepository::new(self.build_write_through())
    }

    /// Requires a running tokio runtime when an interval is set.
    pub fn build_timed(self) -> Result<TimedSyncRepository, RepositoryError> {
        let interval = self.interval;
        TimedSyncRepository::new(self.build_write_behind(), interval)
    }

    /// Build the tier selected by the sync strategy.
    pub fn build(self) -> Result<Box<dyn Repository>, RepositoryError> {
        let strategy = self.strategy;
        let datasources = self.datasources.len();
        let repo: Box<dyn Repository> = match strategy {
            SyncStrategy::NoSync => Box::new(self.build_read_through()),
            SyncStrategy::SyncOnUpdate => Box::new(self.build_write_through()),
            SyncStrategy::SyncOnRequest => Box::new(self.build_write_behind()),
            SyncStrategy::SyncOnTimeout => Box::new(self.build_timed()?),
        };
        info!(strategy = %strategy, datasources, "Repository built");
        Ok(repo)
    }
}

impl Default for RepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RepositoryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryBuilder")
            .field("datasources", &self.datasources.len())
            .field("entity_factory", &self.entity_factory.is_some())
            .field("strategy", &self.strategy)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Build a repository from config plus extra datasources.
///
/// Datasources declared in `config` are opened first; `datasources` are
/// registered after them. With neither, the stack is one fresh
/// [`InMemoryDatasource`].
pub async fn create_repository(
    config: &RepositoryConfig,
    datasources: Vec<Arc<dyn Datasource>>,
) -> Result<Box<dyn Repository>, RepositoryError> {
    datasources
        .into_iter()
        .fold(RepositoryBuilder::from_config(config).await?, RepositoryBuilder::shared_datasource)
        .build()
}
