//! Refresh workers
//!
//! A worker claims a queue entry, evaluates the observation, replaces its
//! cache rows and completes the entry. Any evaluation error fails the entry
//! with the error text; the cache is left untouched in that case.
//!
//! `WorkerPool` runs several workers plus a stale-claim reaper as tokio tasks
//! and stops them cooperatively between claims.

use crate::cache::AssociationCache;
use crate::config::WorkerSettings;
use crate::error::EvalResult;
use crate::evaluator::Evaluator;
use crate::queue::RefreshQueue;
use crate::store::MetadataStore;
use calassoc_common::db::QueueEntry;
use calassoc_common::{ObservationId, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared handles every worker needs
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn MetadataStore>,
    pub evaluator: Arc<Evaluator>,
    pub cache: AssociationCache,
    pub queue: RefreshQueue,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("cache", &self.cache)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// What processing one entry did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Cache rows replaced
    Refreshed {
        observation_id: ObservationId,
        categories: usize,
        rows: usize,
    },
    /// Observation gone or no longer canonical; its rows were removed
    Cleared { observation_id: ObservationId },
    /// Evaluation failed; the entry was kept with this error
    Failed {
        observation_id: ObservationId,
        error: String,
    },
}

/// Totals from a synchronous drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub refreshed: usize,
    pub cleared: usize,
    pub failed: usize,
}

impl DrainStats {
    pub fn processed(&self) -> usize {
        self.refreshed + self.cleared + self.failed
    }

    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Refreshed { .. } => self.refreshed += 1,
            Outcome::Cleared { .. } => self.cleared += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshWorker {
    id: String,
    ctx: EngineContext,
}

impl RefreshWorker {
    pub fn new(ctx: EngineContext) -> Self {
        Self::with_id(ctx, format!("worker-{}", Uuid::new_v4()))
    }

    pub fn with_id(ctx: EngineContext, id: impl Into<String>) -> Self {
        Self { id: id.into(), ctx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claim and process one entry; `None` when nothing is claimable
    ///
    /// Errors are queue bookkeeping failures only. Evaluation errors are
    /// recorded on the entry and reported as `Outcome::Failed`.
    pub async fn process_one(&self) -> Result<Option<Outcome>> {
        let Some(entry) = self.ctx.queue.claim_next(&self.id).await? else {
            return Ok(None);
        };

        debug!(
            worker = %self.id,
            entry_id = entry.id,
            observation_id = %entry.observation_id,
            "Claimed queue entry"
        );

        match self.refresh(&entry).await {
            Ok(outcome) => {
                if !self.ctx.queue.complete(entry.id, &self.id).await? {
                    warn!(
                        worker = %self.id,
                        entry_id = entry.id,
                        observation_id = %entry.observation_id,
                        "Claim lost before completion"
                    );
                }
                Ok(Some(outcome))
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    worker = %self.id,
                    entry_id = entry.id,
                    observation_id = %entry.observation_id,
                    error = %message,
                    "Refresh failed"
                );
                if !self.ctx.queue.fail(entry.id, &self.id, &message).await? {
                    warn!(
                        worker = %self.id,
                        entry_id = entry.id,
                        observation_id = %entry.observation_id,
                        "Claim lost before failure was recorded"
                    );
                }
                Ok(Some(Outcome::Failed {
                    observation_id: entry.observation_id,
                    error: message,
                }))
            }
        }
    }

    async fn refresh(&self, entry: &QueueEntry) -> EvalResult<Outcome> {
        let observation_id = entry.observation_id;
        let observation = match self.ctx.store.get_observation(observation_id).await? {
            Some(observation) if observation.canonical => observation,
            _ => {
                let removed = self.ctx.cache.invalidate(observation_id).await?;
                debug!(
                    observation_id = %observation_id,
                    removed,
                    "Observation missing or not canonical, rows cleared"
                );
                return Ok(Outcome::Cleared { observation_id });
            }
        };

        let associations = self
            .ctx
            .evaluator
            .evaluate(self.ctx.store.as_ref(), &observation)
            .await?;
        self.ctx
            .cache
            .replace_associations(observation_id, &associations)
            .await?;

        Ok(Outcome::Refreshed {
            observation_id,
            categories: associations.len(),
            rows: associations.values().map(Vec::len).sum(),
        })
    }

    /// Process entries until nothing is claimable
    pub async fn drain(&self) -> Result<DrainStats> {
        let mut stats = DrainStats::default();
        while let Some(outcome) = self.process_one().await? {
            stats.record(&outcome);
        }
        info!(
            worker = %self.id,
            refreshed = stats.refreshed,
            cleared = stats.cleared,
            failed = stats.failed,
            "Queue drained"
        );
        Ok(stats)
    }
}

/// Background workers and the stale-claim reaper
#[derive(Debug)]
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers and one reaper
    pub fn start(ctx: EngineContext, settings: &WorkerSettings) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(settings.worker_count + 1);

        for _ in 0..settings.worker_count {
            let worker = RefreshWorker::new(ctx.clone());
            let cancel = cancel.clone();
            let poll_interval = settings.poll_interval;
            handles.push(tokio::spawn(async move {
                run_worker(worker, poll_interval, cancel).await;
            }));
        }

        let queue = ctx.queue.clone();
        let reaper_cancel = cancel.clone();
        let claim_timeout = settings.claim_timeout;
        let reap_interval = settings.reap_interval;
        handles.push(tokio::spawn(async move {
            run_reaper(queue, claim_timeout, reap_interval, reaper_cancel).await;
        }));

        info!(workers = settings.worker_count, "Worker pool started");
        Self { cancel, handles }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop all tasks after their current claim and wait for them
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                error!("Worker task ended abnormally: {}", e);
            }
        }
        info!("Worker pool stopped");
    }
}

async fn run_worker(
    worker: RefreshWorker,
    poll_interval: std::time::Duration,
    cancel: CancellationToken,
) {
    debug!(worker = %worker.id(), "Worker started");
    while !cancel.is_cancelled() {
        let idle = match worker.process_one().await {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                error!(worker = %worker.id(), "Queue error: {}", e);
                true
            }
        };
        if idle {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
    debug!(worker = %worker.id(), "Worker stopped");
}

async fn run_reaper(
    queue: RefreshQueue,
    claim_timeout: chrono::Duration,
    reap_interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(reap_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = queue.reap_stale(claim_timeout).await {
                    error!("Stale claim reaping failed: {}", e);
                }
            }
        }
    }
}
