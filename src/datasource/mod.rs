// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Datasource backends.
//!
//! - [`InMemoryDatasource`]: plain map, insertion-ordered keys
//! - [`JsonFileDatasource`]: one JSON object per file, serialized writes
//! - [`SyncCacheDatasource`]: tombstone-aware write-behind buffer, held by the
//!   write-behind tier rather than stacked

pub mod traits;
pub mod memory;
pub mod json_file;
pub mod sync_cache;

pub use traits::{Capabilities, Datasource, DatasourceError, DatasourceOptions, WriteMode};
pub use memory::InMemoryDatasource;
pub use json_file::{JsonFileDatasource, JsonFileOptions};
pub use sync_cache::{CacheEntry, SyncCacheDatasource};
