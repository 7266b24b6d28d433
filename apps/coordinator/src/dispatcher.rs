// [apps/coordinator/src/dispatcher.rs]
/*!
 * APARATO: FLEET DISPATCHER (ESTRATO L2-DISPATCH)
 * RESPONSABILIDAD: REPARTO DE LOTES Y CONTENCION ANTE FALLO DEL ALMACEN
 *
 * The Dispatcher (C9): drives a pool of per-GPU worker runners against a
 * shared supply of pending batches, honoring the stop broadcaster and a
 * per-run launch cap.
 *
 * The claim performed by [`WorkerRunner`]'s first step (`mark_status`
 * into `InProgress`) is itself this run's resume point: a crash leaves
 * every dequeued-but-unfinished batch visibly `in_progress`, which the
 * backing store's orphan recovery resets to `pending` on the next
 * startup. A separate dispatcher-level checkpoint file would duplicate
 * that guarantee without adding anything.
 *
 * A `StoreUnavailable` dequeue failure backs off exponentially instead of
 * aborting the run or sleeping a flat interval, capped so the fleet always
 * retries the backing store within a bounded window.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use xiebo_domain_models::{Batch, BatchStatus, Found};
use xiebo_infra_store::BackingStore;
use xiebo_shared_errors::CoordinatorError;
use xiebo_shared_presenter::Presenter;

use crate::stop::StopBroadcaster;
use crate::worker::{found_for, WorkerRunner};

const DEQUEUE_WINDOW: u64 = 32;
const STORE_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Exponential backoff delay for the `attempt`-th consecutive
/// `StoreUnavailable` failure, doubling each time and capped at `cap`.
fn store_backoff_delay(attempt: u32, cap: Duration) -> Duration {
    let factor = 1u32 << attempt.min(16);
    STORE_BACKOFF_BASE.saturating_mul(factor).min(cap)
}

#[derive(Debug, Clone, Copy)]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchSummary {
    pub launched: u64,
    pub found_yes: u64,
    pub failed: u64,
    pub interrupted: u64,
}

/// Pulls pending batches off a shared cursor, claiming each atomically via
/// `BackingStore::mark_status`. Several dequeuers may race on the same
/// fetch window; only the caller that wins the conditional claim gets the
/// batch back.
struct PendingSupply {
    store: Arc<BackingStore>,
    next_from_id: AsyncMutex<u64>,
}

impl PendingSupply {
    fn new(store: Arc<BackingStore>, start_from_id: u64) -> Self {
        Self {
            store,
            next_from_id: AsyncMutex::new(start_from_id),
        }
    }

    async fn dequeue(&self) -> Result<Option<Batch>, CoordinatorError> {
        loop {
            let mut cursor = self.next_from_id.lock().await;
            let window = self.store.fetch_pending(*cursor, DEQUEUE_WINDOW).await?;
            if window.is_empty() {
                return Ok(None);
            }
            if let Some(last) = window.last() {
                *cursor = last.id + 1;
            }
            drop(cursor);

            for batch in window {
                let claimed = self
                    .store
                    .mark_status(batch.id, BatchStatus::InProgress, Found::Unknown, "")
                    .await?;
                if claimed {
                    return Ok(Some(batch));
                }
            }
        }
    }
}

pub struct Dispatcher {
    store: Arc<BackingStore>,
    runner: Arc<WorkerRunner>,
    gpu_ids: Vec<u32>,
    address: String,
    max_batches_per_run: u64,
    sequential_delay: Duration,
    store_backoff_cap: Duration,
    start_from_id: u64,
}

impl Dispatcher {
    pub fn new(
        store: Arc<BackingStore>,
        runner: WorkerRunner,
        gpu_ids: Vec<u32>,
        address: String,
        max_batches_per_run: u64,
        sequential_delay: Duration,
        store_backoff_cap: Duration,
    ) -> Self {
        Self {
            store,
            runner: Arc::new(runner),
            gpu_ids,
            address,
            max_batches_per_run,
            sequential_delay,
            store_backoff_cap,
            start_from_id: 0,
        }
    }

    /// Overrides the initial dequeue cursor, used by the `batch-db-*` verbs'
    /// explicit `START_ID` argument.
    pub fn starting_from(mut self, start_from_id: u64) -> Self {
        self.start_from_id = start_from_id;
        self
    }

    pub async fn run(
        &self,
        mode: ExecutionMode,
        stop: &StopBroadcaster,
        presenter: &Arc<Presenter>,
    ) -> Result<DispatchSummary, CoordinatorError> {
        match mode {
            ExecutionMode::Sequential => self.run_sequential(stop, presenter).await,
            ExecutionMode::Parallel => self.run_parallel(stop, presenter).await,
        }
    }

    async fn run_sequential(&self, stop: &StopBroadcaster, presenter: &Presenter) -> Result<DispatchSummary, CoordinatorError> {
        let supply = PendingSupply::new(Arc::clone(&self.store), self.start_from_id);
        let mut summary = DispatchSummary::default();
        let mut gpu_index = 0usize;
        let mut backoff_attempt = 0u32;

        loop {
            if stop.is_set() || summary.launched >= self.max_batches_per_run {
                break;
            }
            let batch = match supply.dequeue().await {
                Ok(Some(batch)) => {
                    backoff_attempt = 0;
                    batch
                }
                Ok(None) => break,
                Err(err @ CoordinatorError::StoreUnavailable(_)) => {
                    let delay = store_backoff_delay(backoff_attempt, self.store_backoff_cap);
                    tracing::error!(error = %err, attempt = backoff_attempt, delay_secs = delay.as_secs(), "dispatcher failed to dequeue, backing off");
                    tokio::time::sleep(delay).await;
                    backoff_attempt += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };
            let gpu_id = self.gpu_ids[gpu_index % self.gpu_ids.len()];
            gpu_index += 1;

            self.execute_one(gpu_id, batch, stop, presenter, &mut summary).await?;
            tokio::time::sleep(self.sequential_delay).await;
        }

        Ok(summary)
    }

    async fn run_parallel(&self, stop: &StopBroadcaster, presenter: &Arc<Presenter>) -> Result<DispatchSummary, CoordinatorError> {
        let supply = Arc::new(PendingSupply::new(Arc::clone(&self.store), self.start_from_id));
        let launched = Arc::new(AtomicU64::new(0));
        let found_yes = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));
        let interrupted = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::with_capacity(self.gpu_ids.len());
        for &gpu_id in &self.gpu_ids {
            let supply = Arc::clone(&supply);
            let store = Arc::clone(&self.store);
            let runner = Arc::clone(&self.runner);
            let stop = stop.clone();
            let address = self.address.clone();
            let cap = self.max_batches_per_run;
            let launched = Arc::clone(&launched);
            let found_yes = Arc::clone(&found_yes);
            let failed = Arc::clone(&failed);
            let interrupted = Arc::clone(&interrupted);
            let presenter = Arc::clone(presenter);
            let store_backoff_cap = self.store_backoff_cap;

            handles.push(tokio::spawn(async move {
                let mut backoff_attempt = 0u32;
                loop {
                    if stop.is_set() {
                        break;
                    }
                    let reserved = launched
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| if n < cap { Some(n + 1) } else { None })
                        .is_ok();
                    if !reserved {
                        break;
                    }

                    let batch = match supply.dequeue().await {
                        Ok(Some(batch)) => {
                            backoff_attempt = 0;
                            batch
                        }
                        Ok(None) => break,
                        Err(err) => {
                            let delay = store_backoff_delay(backoff_attempt, store_backoff_cap);
                            tracing::error!(gpu_id, error = %err, attempt = backoff_attempt, delay_secs = delay.as_secs(), "dispatcher failed to dequeue, backing off");
                            tokio::time::sleep(delay).await;
                            backoff_attempt += 1;
                            continue;
                        }
                    };

                    let notify_hit = stop.notify_hit_capability();
                    let outcome = runner.run_batch(gpu_id, &batch, &address, &stop, &presenter, notify_hit).await;

                    match outcome {
                        Ok(outcome) => {
                            let found = found_for(&outcome.parsed, outcome.resulting_status);
                            let wif = outcome.parsed.wif_short.clone();
                            if let Err(err) = store.mark_status(batch.id, outcome.resulting_status, found, &wif).await {
                                tracing::error!(batch_id = batch.id, error = %err, "failed to persist batch outcome");
                            }
                            match outcome.resulting_status {
                                BatchStatus::Done if found == Found::Yes => {
                                    found_yes.fetch_add(1, Ordering::SeqCst);
                                }
                                BatchStatus::Failed => {
                                    failed.fetch_add(1, Ordering::SeqCst);
                                }
                                BatchStatus::Interrupted => {
                                    interrupted.fetch_add(1, Ordering::SeqCst);
                                }
                                _ => {}
                            }
                        }
                        Err(err) => {
                            tracing::error!(gpu_id, batch_id = batch.id, error = %err, "worker runner failed");
                            let _ = store.mark_status(batch.id, BatchStatus::Failed, Found::Unknown, "").await;
                            failed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        Ok(DispatchSummary {
            launched: launched.load(Ordering::SeqCst),
            found_yes: found_yes.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
            interrupted: interrupted.load(Ordering::SeqCst),
        })
    }

    async fn execute_one(
        &self,
        gpu_id: u32,
        batch: Batch,
        stop: &StopBroadcaster,
        presenter: &Presenter,
        summary: &mut DispatchSummary,
    ) -> Result<(), CoordinatorError> {
        let notify_hit = stop.notify_hit_capability();
        let outcome = self.runner.run_batch(gpu_id, &batch, &self.address, stop, presenter, notify_hit).await?;

        let found = found_for(&outcome.parsed, outcome.resulting_status);
        self.store
            .mark_status(batch.id, outcome.resulting_status, found, &outcome.parsed.wif_short)
            .await?;

        summary.launched += 1;
        match outcome.resulting_status {
            BatchStatus::Done if found == Found::Yes => summary.found_yes += 1,
            BatchStatus::Failed => summary.failed += 1,
            BatchStatus::Interrupted => summary.interrupted += 1,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xiebo_infra_store::{BackingStore, SqlBackingStore};

    async fn dispatcher_over_seeded_store(batch_count: u64) -> (Dispatcher, Arc<BackingStore>) {
        // `:memory:` cannot be used here: `SqlBackingStore` opens a fresh
        // connection per call, and libsql's in-memory backend hands out an
        // unrelated empty database to every new connection. A temp file
        // gives each call the same on-disk database, matching what real
        // (file/remote) deployments see.
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        std::mem::forget(file);
        let sql = SqlBackingStore::connect(&path, None).await.unwrap();
        for id in 0..batch_count {
            sql.insert_pending(&Batch::new_pending(id, format!("{:x}", id * 4), format!("{:x}", id * 4 + 3)))
                .await
                .unwrap();
        }
        let store = Arc::new(BackingStore::Sql(sql));
        let runner = WorkerRunner::new("true");
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            runner,
            vec![0, 1],
            "1AddressPlaceholder".to_string(),
            batch_count,
            Duration::from_millis(1),
            Duration::from_secs(30),
        );
        (dispatcher, store)
    }

    #[tokio::test]
    async fn pending_supply_never_hands_out_the_same_batch_twice() {
        let (_, store) = dispatcher_over_seeded_store(5).await;
        let supply = PendingSupply::new(store, 0);
        let mut seen = std::collections::HashSet::new();
        while let Some(batch) = supply.dequeue().await.unwrap() {
            assert!(seen.insert(batch.id), "batch {} dequeued twice", batch.id);
        }
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn stop_before_any_dequeue_launches_nothing() {
        let (dispatcher, _store) = dispatcher_over_seeded_store(5).await;
        let stop = StopBroadcaster::new();
        stop.set();
        let presenter = Arc::new(Presenter::unbounded());
        let summary = dispatcher.run(ExecutionMode::Sequential, &stop, &presenter).await.unwrap();
        assert_eq!(summary.launched, 0);
    }
}
