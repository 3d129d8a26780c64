//! Datasource wrappers for failure injection, call recording and pausing.
//!
//! Shared by the integration test binaries; each binary uses a subset.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};

use layered_repository::{Capabilities, Datasource, DatasourceError, DatasourceOptions, InMemoryDatasource};

// =============================================================================
// BrokenDatasource - every call fails
// =============================================================================

/// Rejects every operation, advertises every capability.
pub struct BrokenDatasource {
    options: DatasourceOptions,
    calls: AtomicU64,
}

impl BrokenDatasource {
    pub fn new(options: DatasourceOptions) -> Self {
        Self {
            options,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self, operation: &str) -> Result<T, DatasourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DatasourceError::Backend(format!("broken datasource rejected {}", operation)))
    }
}

#[async_trait]
impl Datasource for BrokenDatasource {
    fn options(&self) -> &DatasourceOptions {
        &self.options
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn kind(&self) -> &'static str {
        "broken"
    }

    async fn get(&self, _key: &str) -> Result<Option<Value>, DatasourceError> {
        self.fail("get")
    }

    async fn set(&self, _key: &str, _value: Value) -> Result<Option<String>, DatasourceError> {
        self.fail("set")
    }

    async fn delete(&self, _key: &str) -> Result<bool, DatasourceError> {
        self.fail("delete")
    }

    async fn getall(&self) -> Result<Vec<String>, DatasourceError> {
        self.fail("getall")
    }

    async fn mget(&self, _keys: &[String]) -> Result<HashMap<String, Option<Value>>, DatasourceError> {
        self.fail("mget")
    }

    async fn mset(&self, _payload: &IndexMap<String, Value>) -> Result<Vec<String>, DatasourceError> {
        self.fail("mset")
    }

    async fn mdelete(&self, _keys: &[String]) -> Result<HashMap<String, bool>, DatasourceError> {
        self.fail("mdelete")
    }

    async fn find(&self, _pattern: &Regex) -> Result<Vec<String>, DatasourceError> {
        self.fail("find")
    }
}

// =============================================================================
// SpyDatasource - records calls, optionally fails
// =============================================================================

/// In-memory datasource that records every call by operation name.
///
/// Capabilities are configurable so tests can force the repository to
/// synthesize batch calls. `fail_batch_get` makes only the native `mget`
/// fail; `set_failing` makes every call fail until switched off.
pub struct SpyDatasource {
    inner: InMemoryDatasource,
    capabilities: Capabilities,
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
    fail_batch_get: AtomicBool,
}

impl SpyDatasource {
    pub fn new(options: DatasourceOptions, capabilities: Capabilities) -> Self {
        Self {
            inner: InMemoryDatasource::with_options(options),
            capabilities,
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            fail_batch_get: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &InMemoryDatasource {
        &self.inner
    }

    pub async fn seed(&self, entries: &[(&str, Value)]) {
        for (key, value) in entries {
            self.inner.set(key, value.clone()).await.unwrap();
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_fail_batch_get(&self, failing: bool) {
        self.fail_batch_get.store(failing, Ordering::SeqCst);
    }

    /// Every recorded call, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|op| op.as_str() == operation).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, operation: &str) -> Result<(), DatasourceError> {
        self.calls.lock().push(operation.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(DatasourceError::Backend(format!("spy injected failure on {}", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl Datasource for SpyDatasource {
    fn options(&self) -> &DatasourceOptions {
        self.inner.options()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn kind(&self) -> &'static str {
        "spy"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, DatasourceError> {
        self.record("get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<Option<String>, DatasourceError> {
        self.record("set")?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, DatasourceError> {
        self.record("delete")?;
        self.inner.delete(key).await
    }

    async fn getall(&self) -> Result<Vec<String>, DatasourceError> {
        self.record("getall")?;
        self.inner.getall().await
    }

    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Option<Value>>, DatasourceError> {
        self.record("mget")?;
        if self.fail_batch_get.load(Ordering::SeqCst) {
            return Err(DatasourceError::Backend("spy injected batch read failure".into()));
        }
        self.inner.mget(keys).await
    }

    async fn mset(&self, payload: &IndexMap<String, Value>) -> Result<Vec<String>, DatasourceError> {
        self.record("mset")?;
        self.inner.mset(payload).await
    }

    async fn mdelete(&self, keys: &[String]) -> Result<HashMap<String, bool>, DatasourceError> {
        self.record("mdelete")?;
        self.inner.mdelete(keys).await
    }

    async fn find(&self, pattern: &Regex) -> Result<Vec<String>, DatasourceError> {
        self.record("find")?;
        self.inner.find(pattern).await
    }
}

// =============================================================================
// GatedDatasource - batch writes wait for the test to release them
// =============================================================================

/// In-memory datasource whose `mset` parks until released.
///
/// Each `mset` signals on entry, then waits for one permit from
/// [`release`](Self::release). Lets a test act while a sync drain is in
/// flight.
pub struct GatedDatasource {
    inner: InMemoryDatasource,
    entered_tx: mpsc::UnboundedSender<()>,
    entered_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<()>>,
    release: Semaphore,
    msets: AtomicU64,
}

impl GatedDatasource {
    pub fn new(options: DatasourceOptions) -> Self {
        let (entered_tx, entered_rx) = mpsc::unbounded_channel();
        Self {
            inner: InMemoryDatasource::with_options(options),
            entered_tx,
            entered_rx: tokio::sync::Mutex::new(entered_rx),
            release: Semaphore::new(0),
            msets: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &InMemoryDatasource {
        &self.inner
    }

    /// Resolves once an `mset` has reached the gate
    pub async fn wait_entered(&self) {
        self.entered_rx.lock().await.recv().await;
    }

    /// Let `n` parked or future `mset` calls through
    pub fn release(&self, n: usize) {
        self.release.add_permits(n);
    }

    pub fn msets(&self) -> u64 {
        self.msets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Datasource for GatedDatasource {
    fn options(&self) -> &DatasourceOptions {
        self.inner.options()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn kind(&self) -> &'static str {
        "gated"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, DatasourceError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<Option<String>, DatasourceError> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, DatasourceError> {
        self.inner.delete(key).await
    }

    async fn getall(&self) -> Result<Vec<String>, DatasourceError> {
        self.inner.getall().await
    }

    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Option<Value>>, DatasourceError> {
        self.inner.mget(keys).await
    }

    async fn mset(&self, payload: &IndexMap<String, Value>) -> Result<Vec<String>, DatasourceError> {
        self.msets.fetch_add(1, Ordering::SeqCst);
        let _ = self.entered_tx.send(());
        self.release
            .acquire()
            .await
            .map_err(|e| DatasourceError::Backend(e.to_string()))?
            .forget();
        self.inner.mset(payload).await
    }

    async fn mdelete(&self, keys: &[String]) -> Result<HashMap<String, bool>, DatasourceError> {
        self.inner.mdelete(keys).await
    }

    async fn find(&self, pattern: &Regex) -> Result<Vec<String>, DatasourceError> {
        self.inner.find(pattern).await
    }
}

pub fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

pub fn payload(entries: &[(&str, Value)]) -> IndexMap<String, Value> {
    entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Options with a read priority and write mode, write priority equal to read
pub fn opts(read_priority: f64, mode: layered_repository::WriteMode) -> DatasourceOptions {
    DatasourceOptions::new()
        .with_read_priority(read_priority)
        .with_write_mode(mode)
        .with_write_priority(read_priority)
}
