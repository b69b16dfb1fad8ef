//! Asynchronous durability worker.
//!
//! Callers hand snapshots to a `PersistenceHandle` and move on; a single tokio
//! task performs the sled writes in order. A failed write is logged and kept
//! in the pending set, and the next `retry_failed` (sent by the autosave sweep)
//! tries again. In-memory state is never rolled back because of a failed write.
//!
//! The pending set also lets a reconnecting account pick up a snapshot that is
//! queued but not yet written, so a quick disconnect/reconnect never reads a
//! stale durable copy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::economy::errors::EconomyError;
use crate::economy::storage::EconomyStore;
use crate::economy::types::{AccountRecord, BoothRecord};

#[derive(Debug, Clone)]
struct PendingWrite {
    generation: u64,
    record: AccountRecord,
    failed: bool,
}

#[derive(Debug, Clone)]
enum BoothOp {
    Put(BoothRecord),
    Remove(String),
}

enum PersistCommand {
    SaveAccount(String),
    Booth(BoothOp),
    RetryFailed,
    Flush(oneshot::Sender<PersistStats>),
    Shutdown(oneshot::Sender<PersistStats>),
}

/// Counters reported by `flush` and `shutdown`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub accounts_written: u64,
    pub booth_ops_written: u64,
    pub write_failures: u64,
    /// Writes still failing after the latest attempt.
    pub outstanding: usize,
}

/// Write side of the durable store as used by the worker.
pub trait RecordWriter: Send + Sync + 'static {
    fn put_account(&self, record: AccountRecord) -> Result<(), EconomyError>;
    fn put_booth(&self, record: BoothRecord) -> Result<(), EconomyError>;
    /// Returns whether a booth record existed.
    fn remove_booth(&self, id: &str) -> Result<bool, EconomyError>;
}

impl RecordWriter for EconomyStore {
    fn put_account(&self, record: AccountRecord) -> Result<(), EconomyError> {
        EconomyStore::put_account(self, record)
    }

    fn put_booth(&self, record: BoothRecord) -> Result<(), EconomyError> {
        EconomyStore::put_booth(self, record)
    }

    fn remove_booth(&self, id: &str) -> Result<bool, EconomyError> {
        EconomyStore::remove_booth(self, id)
    }
}

type PendingMap = Arc<Mutex<HashMap<String, PendingWrite>>>;

fn lock_pending(pending: &PendingMap) -> MutexGuard<'_, HashMap<String, PendingWrite>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<PersistCommand>,
    pending: PendingMap,
    next_generation: Arc<AtomicU64>,
}

impl PersistenceHandle {
    /// Queue an account snapshot. Newer snapshots replace older unwritten ones.
    pub fn save_account(&self, record: AccountRecord) {
        let id = record.id.clone();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        lock_pending(&self.pending).insert(
            id.clone(),
            PendingWrite {
                generation,
                record,
                failed: false,
            },
        );
        if self.tx.send(PersistCommand::SaveAccount(id.clone())).is_err() {
            warn!("persistence worker stopped; snapshot of {} kept pending", id);
        }
    }

    pub fn put_booth(&self, record: BoothRecord) {
        let _ = self.tx.send(PersistCommand::Booth(BoothOp::Put(record)));
    }

    pub fn remove_booth(&self, id: &str) {
        let _ = self
            .tx
            .send(PersistCommand::Booth(BoothOp::Remove(id.to_string())));
    }

    /// Latest queued snapshot of an account that has not reached the store yet.
    pub fn pending_account(&self, id: &str) -> Option<AccountRecord> {
        lock_pending(&self.pending)
            .get(id)
            .map(|write| write.record.clone())
    }

    /// Number of snapshots queued or failed.
    pub fn pending_count(&self) -> usize {
        lock_pending(&self.pending).len()
    }

    /// Ask the worker to retry every write that failed so far.
    pub fn retry_failed(&self) {
        let _ = self.tx.send(PersistCommand::RetryFailed);
    }

    /// Wait until everything queued before this call has been attempted.
    pub async fn flush(&self) -> Result<PersistStats, EconomyError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(PersistCommand::Flush(tx))
            .map_err(|_| EconomyError::PersistenceFailure("worker stopped".to_string()))?;
        rx.await
            .map_err(|_| EconomyError::PersistenceFailure("worker dropped flush".to_string()))
    }

    /// Drain the queue, retry failures once more, and stop the worker.
    pub async fn shutdown(&self) -> Result<PersistStats, EconomyError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(PersistCommand::Shutdown(tx))
            .map_err(|_| EconomyError::PersistenceFailure("worker stopped".to_string()))?;
        rx.await
            .map_err(|_| EconomyError::PersistenceFailure("worker dropped shutdown".to_string()))
    }
}

/// Spawn the worker on the current tokio runtime.
pub fn start_persistence_worker<S: RecordWriter>(store: Arc<S>) -> PersistenceHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<PersistCommand>();
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let handle = PersistenceHandle {
        tx,
        pending: pending.clone(),
        next_generation: Arc::new(AtomicU64::new(0)),
    };

    tokio::spawn(async move {
        let mut worker = Worker {
            store,
            pending,
            failed_booth_ops: Vec::new(),
            stats: PersistStats::default(),
        };
        while let Some(cmd) = rx.recv().await {
            match cmd {
                PersistCommand::SaveAccount(id) => worker.write_account(&id).await,
                PersistCommand::Booth(op) => worker.write_booth(op).await,
                PersistCommand::RetryFailed => worker.retry_failed().await,
                PersistCommand::Flush(reply) => {
                    let _ = reply.send(worker.snapshot_stats());
                }
                PersistCommand::Shutdown(reply) => {
                    worker.retry_failed().await;
                    let stats = worker.snapshot_stats();
                    info!(
                        "persistence worker stopping: {} accounts written, {} outstanding",
                        stats.accounts_written, stats.outstanding
                    );
                    let _ = reply.send(stats);
                    break;
                }
            }
        }
        debug!("persistence worker exited");
    });

    handle
}

struct Worker<S> {
    store: Arc<S>,
    pending: PendingMap,
    failed_booth_ops: Vec<BoothOp>,
    stats: PersistStats,
}

impl<S: RecordWriter> Worker<S> {
    fn snapshot_stats(&self) -> PersistStats {
        let failed_accounts = lock_pending(&self.pending)
            .values()
            .filter(|w| w.failed)
            .count();
        PersistStats {
            outstanding: failed_accounts + self.failed_booth_ops.len(),
            ..self.stats.clone()
        }
    }

    async fn write_account(&mut self, id: &str) {
        let Some(write) = lock_pending(&self.pending).get(id).cloned() else {
            // already written by an earlier command carrying the same snapshot
            return;
        };
        let store = self.store.clone();
        let record = write.record;
        let result = tokio::task::spawn_blocking(move || store.put_account(record))
            .await
            .map_err(|e| EconomyError::Internal(format!("persistence task failed: {}", e)))
            .and_then(|inner| inner);

        let mut pending = lock_pending(&self.pending);
        match result {
            Ok(()) => {
                self.stats.accounts_written += 1;
                if pending
                    .get(id)
                    .map(|current| current.generation == write.generation)
                    .unwrap_or(false)
                {
                    pending.remove(id);
                }
            }
            Err(e) => {
                self.stats.write_failures += 1;
                error!("failed to persist account {}: {} (will retry)", id, e);
                if let Some(current) = pending.get_mut(id) {
                    if current.generation == write.generation {
                        current.failed = true;
                    }
                }
            }
        }
    }

    async fn write_booth(&mut self, op: BoothOp) {
        let store = self.store.clone();
        let attempt = op.clone();
        let result = tokio::task::spawn_blocking(move || match attempt {
            BoothOp::Put(record) => store.put_booth(record),
            BoothOp::Remove(id) => store.remove_booth(&id).map(|_| ()),
        })
        .await
        .map_err(|e| EconomyError::Internal(format!("persistence task failed: {}", e)))
        .and_then(|inner| inner);

        match result {
            Ok(()) => self.stats.booth_ops_written += 1,
            Err(e) => {
                self.stats.write_failures += 1;
                error!("failed to persist booth change {:?}: {} (will retry)", op, e);
                self.failed_booth_ops.push(op);
            }
        }
    }

    async fn retry_failed(&mut self) {
        let ids: Vec<String> = lock_pending(&self.pending)
            .iter()
            .filter(|(_, w)| w.failed)
            .map(|(id, _)| id.clone())
            .collect();
        let booth_ops = std::mem::take(&mut self.failed_booth_ops);
        if ids.is_empty() && booth_ops.is_empty() {
            return;
        }
        info!(
            "retrying {} account and {} booth writes",
            ids.len(),
            booth_ops.len()
        );
        for id in ids {
            self.write_account(&id).await;
        }
        for op in booth_ops {
            self.write_booth(op).await;
        }
    }
}
