// src/pipeline/scheduler.rs

//! Source scheduling.
//!
//! Periodically walks the active sources and triggers orchestrator runs
//! for the ones that are due, bounding total in-flight syncs with a
//! fixed pool. A source whose previous run is still in flight is
//! skipped for the tick, never queued twice. Per-source jitter spreads
//! same-frequency sources so their syncs do not land on the same tick.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::models::{ExternalSource, SyncOutcome, SyncStatus};
use crate::pipeline::sync::{run_sync, SyncContext};

/// Stable per-source jitter in `[0, max_secs]`.
pub fn jitter_secs(source_id: &str, max_secs: u64) -> u64 {
    if max_secs == 0 {
        return 0;
    }
    let digest = Sha256::digest(source_id.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(buf) % (max_secs + 1)
}

/// Whether a source is due for a scheduled run.
///
/// Manual-frequency sources are never due; a never-synced source is due
/// immediately; otherwise the configured interval plus the source's
/// jitter must have elapsed since the last recorded run.
pub fn is_due(source: &ExternalSource, now: DateTime<Utc>, jitter_max_secs: u64) -> bool {
    let Some(interval) = source.frequency.interval() else {
        return false;
    };
    match source.last_sync_at {
        None => true,
        Some(last) => {
            let jitter = Duration::seconds(jitter_secs(&source.id, jitter_max_secs) as i64);
            now >= last + interval + jitter
        }
    }
}

/// Drives scheduled sync runs across all active sources.
pub struct Scheduler {
    ctx: SyncContext,
    pool: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Scheduler {
    pub fn new(ctx: SyncContext) -> Self {
        let pool = Arc::new(Semaphore::new(ctx.config.scheduler.pool_size));
        Self {
            ctx,
            pool,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run the scheduling loop until the shutdown signal flips to true.
    ///
    /// On shutdown, in-flight runs are allowed to finish; no new runs
    /// are started.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let tick = std::time::Duration::from_secs(self.ctx.config.scheduler.tick_secs);
        let mut tasks: JoinSet<SyncOutcome> = JoinSet::new();

        log::info!(
            "scheduler: tick {}s, pool {}",
            self.ctx.config.scheduler.tick_secs,
            self.ctx.config.scheduler.pool_size
        );

        loop {
            while let Some(joined) = tasks.try_join_next() {
                Self::log_finished(joined);
            }

            match self.ctx.store.load_active_sources().await {
                Ok(sources) => {
                    let now = Utc::now();
                    let jitter_max = self.ctx.config.scheduler.jitter_max_secs;
                    for source in sources {
                        if is_due(&source, now, jitter_max) {
                            self.spawn_run(&mut tasks, source).await;
                        }
                    }
                }
                Err(e) => log::error!("scheduler: failed to load sources: {e}"),
            }

            tokio::select! {
                _ = tokio::time::sleep(tick) => {}
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown too
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if !tasks.is_empty() {
            log::info!("scheduler: draining {} in-flight sync(s)", tasks.len());
        }
        while let Some(joined) = tasks.join_next().await {
            Self::log_finished(joined);
        }
    }

    async fn spawn_run(&self, tasks: &mut JoinSet<SyncOutcome>, source: ExternalSource) {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(source.id.clone()) {
                log::debug!("scheduler: {} still in flight, skipping tick", source.id);
                return;
            }
        }

        let ctx = self.ctx.clone();
        let pool = Arc::clone(&self.pool);
        let in_flight = Arc::clone(&self.in_flight);
        tasks.spawn(async move {
            // Sources beyond the pool wait here rather than being skipped
            let outcome = match pool.acquire_owned().await {
                Ok(_permit) => run_sync(&ctx, &source).await,
                Err(_) => SyncOutcome::error(&source.id, "scheduler pool closed"),
            };
            in_flight.lock().await.remove(&source.id);
            outcome
        });
    }

    fn log_finished(joined: Result<SyncOutcome, tokio::task::JoinError>) {
        match joined {
            Ok(outcome) if outcome.status == SyncStatus::Success => {
                log::debug!("scheduler: {} finished ok", outcome.source_id);
            }
            Ok(outcome) => {
                log::debug!(
                    "scheduler: {} finished with error: {}",
                    outcome.source_id,
                    outcome.error.as_deref().unwrap_or("unknown")
                );
            }
            Err(e) => log::error!("scheduler: sync task failed: {e}"),
        }
    }
}
