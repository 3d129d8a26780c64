//! # Layered Repository
//!
//! A key-value repository that fans reads and writes out over a
//! priority-ordered stack of datasources.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TimedSyncRepository                      │
//! │  • Background timer calls sync() every interval            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   WriteBehindRepository                     │
//! │  • Writes and tombstones buffered in a sync cache          │
//! │  • sync() drains the cache into the tier below             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  WriteThroughRepository                     │
//! │  • WriteFirst: first datasource to acknowledge wins        │
//! │  • WriteAlways: every datasource receives the write        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ReadThroughRepository                     │
//! │  • Reads walk datasources by read priority                 │
//! │  • Misses and failures fall back to the next datasource    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!          InMemoryDatasource / JsonFileDatasource / custom
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use layered_repository::{
//!     DatasourceOptions, InMemoryDatasource, JsonFileDatasource, RepositoryBuilder, SyncStrategy, WriteMode,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let disk = JsonFileDatasource::open("users.json", DatasourceOptions::new().with_read_priority(1.0))
//!         .await
//!         .expect("Failed to open users.json");
//!     let memory = InMemoryDatasource::with_options(
//!         DatasourceOptions::new()
//!             .with_read_priority(10.0)
//!             .with_write_mode(WriteMode::WriteAlways),
//!     );
//!
//!     let repo = RepositoryBuilder::new()
//!         .datasource(memory)
//!         .datasource(disk)
//!         .sync_strategy(SyncStrategy::SyncOnRequest)
//!         .build()
//!         .expect("Failed to build repository");
//!
//!     repo.set("user:1", json!({"name": "Ada"})).await.unwrap();
//!     repo.sync().await.unwrap();
//!
//!     if let Some(user) = repo.get("user:1").await.unwrap() {
//!         println!("Found: {}", user);
//!     }
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`RepositoryConfig`] for the declarative form, and
//! [`RepositoryBuilder`] for datasources and entity factories.
//!
//! ## Modules
//!
//! - [`repository`]: The [`Repository`] trait and its four tiers
//! - [`datasource`]: The [`Datasource`] contract and shipped backends
//! - [`config`]: Serde-loadable repository configuration
//! - [`metrics`]: Counters and latency histograms

pub mod config;
pub mod datasource;
pub mod repository;
pub mod metrics;

pub use config::{DatasourceConfig, RepositoryConfig};
pub use datasource::{
    CacheEntry, Capabilities, Datasource, DatasourceError, DatasourceOptions, InMemoryDatasource,
    JsonFileDatasource, JsonFileOptions, SyncCacheDatasource, WriteMode,
};
pub use repository::{
    create_repository, DatasourceStack, EntityFactory, ReadThroughRepository, Registration, Repository,
    RepositoryBuilder, RepositoryError, SyncReport, SyncStrategy, TimedSyncRepository, WriteBehindRepository,
    WriteThroughRepository,
};
pub use metrics::LatencyTimer;
