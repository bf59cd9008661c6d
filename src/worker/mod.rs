//! Lifecycle of one feed instance.
//!
//! ```text
//! Uninitialized -> Initializing -> Polling <-> Sleeping
//!                                     |            |
//!                                     v   cancel   v
//!                                  Faulted   PersistingIfEnabled -> Stopped
//! ```
//!
//! A worker polls its feeds, hands new posts to its notifier, then sleeps for
//! the configured interval. Cancellation at any await point ends the loop and
//! moves to persistence. A panic while polling is caught, logged as critical
//! and returned as [`WorkerError::Faulted`], which the caller treats as fatal
//! for the process.

use crate::notify::Notifier;
use crate::observe::CycleReport;
use crate::shutdown::{until_cancelled, Cancelled};
use crate::state::{Baselines, FeedStateEngine};
use crate::storage::{StateStore, StoreError};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    Polling,
    Sleeping,
    PersistingIfEnabled,
    Stopped,
    Faulted,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("instance '{id}' faulted while polling: {reason}")]
    Faulted { id: String, reason: String },

    #[error("instance '{id}' failed to persist its state: {source}")]
    Persist {
        id: String,
        #[source]
        source: StoreError,
    },
}

pub struct FeedWorker {
    id: String,
    engine: FeedStateEngine,
    notifier: Arc<dyn Notifier>,
    /// Present when the instance persists its baselines on shutdown.
    store: Option<StateStore>,
    interval: Duration,
    report: CycleReport,
    phase: Phase,
    initialized: bool,
}

impl std::fmt::Debug for FeedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedWorker")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("interval", &self.interval)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl FeedWorker {
    pub fn new(
        id: impl Into<String>,
        engine: FeedStateEngine,
        notifier: Arc<dyn Notifier>,
        store: Option<StateStore>,
        interval: Duration,
    ) -> Self {
        let id = id.into();
        Self {
            report: CycleReport::new(id.clone()),
            id,
            engine,
            notifier,
            store,
            interval,
            phase: Phase::Uninitialized,
            initialized: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, next: Phase) {
        tracing::trace!(id = %self.id, from = ?self.phase, to = ?next, "Worker phase");
        self.phase = next;
    }

    /// Runs until `cancel` fires or a poll faults.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<(), WorkerError> {
        tracing::info!(id = %self.id, feeds = self.engine.urls().len(), interval_secs = self.interval.as_secs(), "Feed instance started");

        let prior = self.store.as_ref().map(StateStore::load).unwrap_or_default();

        loop {
            self.report.start();
            let cycle = AssertUnwindSafe(self.poll_cycle(&prior, cancel)).catch_unwind().await;
            match cycle {
                Ok(Ok(())) => {}
                Ok(Err(Cancelled)) => break,
                Err(panic) => return Err(self.fault(panic)),
            }
            self.report.flush();

            self.transition(Phase::Sleeping);
            if until_cancelled(cancel, tokio::time::sleep(self.interval)).await.is_err() {
                break;
            }
        }

        self.shutdown().await
    }

    async fn poll_cycle(&mut self, prior: &Baselines, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if !self.initialized {
            self.transition(Phase::Initializing);
            self.engine.initialize(prior, cancel).await?;
            self.initialized = true;
        }

        self.transition(Phase::Polling);
        let posts = self.engine.check_for_new_posts(&mut self.report, cancel).await?;
        if !posts.is_empty() {
            tracing::info!(id = %self.id, count = posts.len(), "New posts found");
            self.notifier.send_all(&posts, cancel).await?;
        }
        Ok(())
    }

    fn fault(&mut self, panic: Box<dyn Any + Send>) -> WorkerError {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());

        self.transition(Phase::Faulted);
        tracing::error!(critical = true, id = %self.id, reason = %reason, "Feed instance faulted, shutting down");
        WorkerError::Faulted {
            id: self.id.clone(),
            reason,
        }
    }

    async fn shutdown(&mut self) -> Result<(), WorkerError> {
        self.transition(Phase::PersistingIfEnabled);

        match &self.store {
            Some(store) if self.initialized => {
                store
                    .save_async(self.engine.snapshot())
                    .await
                    .map_err(|source| WorkerError::Persist {
                        id: self.id.clone(),
                        source,
                    })?;
                tracing::info!(id = %self.id, path = %store.path().display(), "Baselines saved");
            }
            Some(_) => tracing::debug!(id = %self.id, "Stopped before initializing, nothing to save"),
            None => {}
        }

        self.transition(Phase::Stopped);
        tracing::info!(id = %self.id, "Feed instance stopped");
        Ok(())
    }
}
