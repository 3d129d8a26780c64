// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Timer-driven write-behind tier (`SyncOnTimeout`).
//!
//! Identical to [`WriteBehindRepository`] except that a background task
//! calls `sync()` once per interval. Ticks do not wait for the previous
//! sync to finish, so drains may overlap; the drain protocol tolerates it.
//! The timer stops on [`shutdown()`](TimedSyncRepository::shutdown) or drop;
//! syncs already in flight run to completion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{RepositoryError, SyncReport};
use super::write_behind::WriteBehindRepository;
use super::Repository;

pub struct TimedSyncRepository {
    inner: Arc<WriteBehindRepository>,
    interval: Option<Duration>,
    cancel: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl TimedSyncRepository {
    /// Wrap a write-behind repository and start the sync timer.
    ///
    /// `None` or a zero interval starts no timer. Starting a timer requires
    /// a running tokio runtime.
    pub fn new(inner: WriteBehindRepository, interval: Option<Duration>) -> Result<Self, RepositoryError> {
        let inner = Arc::new(inner);
        let interval = interval.filter(|d| !d.is_zero());
        let cancel = CancellationToken::new();

        let timer = match interval {
            Some(period) => {
                let handle = Handle::try_current().map_err(|e| {
                    RepositoryError::Config(format!("timed sync requires a tokio runtime: {}", e))
                })?;
                info!(interval_ms = period.as_millis() as u64, "Starting sync timer");
                Some(handle.spawn(run_timer(inner.clone(), period, cancel.clone())))
            }
            None => None,
        };

        Ok(Self {
            inner,
            interval,
            cancel,
            timer: Mutex::new(timer),
        })
    }

    /// Timer period, `None` if no timer was started
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Check if the timer task is still scheduled
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of writes and tombstones waiting for the next sync
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending()
    }

    /// Stop the timer and wait for the timer task to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.timer.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sync timer task ended abnormally");
            }
            info!("Sync timer stopped");
        }
    }
}

impl Drop for TimedSyncRepository {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_timer(repo: Arc<WriteBehindRepository>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let repo = repo.clone();
                tokio::spawn(async move {
                    match repo.sync().await {
                        Ok(report) => {
                            debug!(applied = report.applied.len(), removed = report.removed.len(), "Timed sync complete");
                            crate::metrics::record_timed_sync("success");
                        }
                        Err(e) => {
                            warn!(error = %e, "Timed sync failed, will retry on next tick");
                            crate::metrics::record_timed_sync("error");
                        }
                    }
                });
            }
        }
    }
    debug!("Sync timer loop exited");
}

#[async_trait]
impl Repository for TimedSyncRepository {
    async fn get(&self, id: &str) -> Result<Option<Value>, RepositoryError> {
        self.inner.get(id).await
    }

    async fn set(&self, id: &str, value: Value) -> Result<Option<String>, RepositoryError> {
        self.inner.set(id, value).await
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        self.inner.delete(id).await
    }

    async fn mget(&self, ids: &[String]) -> Result<HashMap<String, Option<Value>>, RepositoryError> {
        self.inner.mget(ids).await
    }

    async fn mset(&self, payload: &IndexMap<String, Value>) -> Result<Vec<String>, RepositoryError> {
        self.inner.mset(payload).await
    }

    async fn mdelete(&self, ids: &[String]) -> Result<HashMap<String, bool>, RepositoryError> {
        self.inner.mdelete(ids).await
    }

    async fn getall(&self) -> Result<Vec<String>, RepositoryError> {
        self.inner.getall().await
    }

    async fn find(&self, pattern: &str) -> Result<Vec<String>, RepositoryError> {
        self.inner.find(pattern).await
    }

    async fn sync(&self) -> Result<SyncReport, RepositoryError> {
        self.inner.sync().await
    }
}
