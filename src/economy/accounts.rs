//! Live account records.
//!
//! Each connected account has its own `Mutex`, so operations on one account are
//! serialized while different accounts proceed in parallel. The outer `RwLock`
//! only guards membership of the map and is never held while an account lock
//! is being acquired.
//!
//! Disconnect queues the final snapshot and marks the entry evicted while it
//! holds the account lock. An operation that looked the entry up before the
//! eviction finds the mark once it gets the lock and fails with
//! `AccountNotLoaded`, so no acknowledged change can land on a dropped record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::{debug, info, warn};

use crate::economy::errors::EconomyError;
use crate::economy::persistence::{PersistStats, PersistenceHandle};
use crate::economy::storage::EconomyStore;
use crate::economy::types::AccountRecord;

#[derive(Debug)]
struct LiveEntry {
    record: AccountRecord,
    /// Set once the final snapshot is queued; the entry is dead from then on.
    evicted: bool,
}

type LiveAccount = Arc<Mutex<LiveEntry>>;

fn lock_entry(account: &LiveAccount) -> MutexGuard<'_, LiveEntry> {
    account.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct AccountStore {
    live: RwLock<HashMap<String, LiveAccount>>,
    store: Arc<EconomyStore>,
    persistence: PersistenceHandle,
}

impl AccountStore {
    pub fn new(store: Arc<EconomyStore>, persistence: PersistenceHandle) -> Self {
        Self {
            live: RwLock::new(HashMap::new()),
            store,
            persistence,
        }
    }

    pub fn persistence(&self) -> &PersistenceHandle {
        &self.persistence
    }

    pub fn durable_store(&self) -> &Arc<EconomyStore> {
        &self.store
    }

    fn live_account(&self, id: &str) -> Option<LiveAccount> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.live_account(id).is_some()
    }

    /// Load (or create) the live record. Connecting twice keeps the live copy.
    pub fn on_connect(&self, id: &str) -> Result<AccountRecord, EconomyError> {
        loop {
            if let Some(existing) = self.live_account(id) {
                let entry = lock_entry(&existing);
                if !entry.evicted {
                    return Ok(entry.record.clone());
                }
                // a disconnect is finishing; its snapshot is already queued
                continue;
            }

            let record = match self.persistence.pending_account(id) {
                Some(queued) => {
                    debug!("{} reconnected before its last snapshot was written", id);
                    queued
                }
                None => match self.store.find_account(id)? {
                    Some(stored) => stored,
                    None => {
                        info!("creating account {}", id);
                        AccountRecord::new(id)
                    }
                },
            };

            let (account, live_count) = {
                let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
                let account = live
                    .entry(id.to_string())
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(LiveEntry {
                            record,
                            evicted: false,
                        }))
                    })
                    .clone();
                (account, live.len())
            };
            let entry = lock_entry(&account);
            if entry.evicted {
                continue;
            }
            info!("account {} loaded ({} live)", id, live_count);
            return Ok(entry.record.clone());
        }
    }

    /// Persist and evict. Returns the final snapshot, or `None` if the account was not live.
    ///
    /// The snapshot is queued before the map entry goes away, so a reconnect
    /// that misses the live entry always finds it in the pending set or the store.
    pub fn on_disconnect(&self, id: &str) -> Option<AccountRecord> {
        let account = self.live_account(id)?;
        let mut entry = lock_entry(&account);
        if entry.evicted {
            return None;
        }
        let snapshot = entry.record.clone();
        self.persistence.save_account(snapshot.clone());
        entry.evicted = true;
        {
            let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
            if live
                .get(id)
                .map(|current| Arc::ptr_eq(current, &account))
                .unwrap_or(false)
            {
                live.remove(id);
            }
        }
        drop(entry);
        info!("account {} saved and evicted", id);
        Some(snapshot)
    }

    /// Run `f` with exclusive access to one live record.
    pub fn with_account<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut AccountRecord) -> Result<T, EconomyError>,
    ) -> Result<T, EconomyError> {
        let account = self
            .live_account(id)
            .ok_or_else(|| EconomyError::AccountNotLoaded(id.to_string()))?;
        let mut entry = lock_entry(&account);
        if entry.evicted {
            return Err(EconomyError::AccountNotLoaded(id.to_string()));
        }
        f(&mut entry.record)
    }

    /// Read-only copy of one live record.
    pub fn snapshot(&self, id: &str) -> Result<AccountRecord, EconomyError> {
        self.with_account(id, |record| Ok(record.clone()))
    }

    /// Copy every live record, each under its own lock.
    pub fn snapshot_all(&self) -> Vec<AccountRecord> {
        let accounts: Vec<LiveAccount> = self
            .live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        accounts
            .iter()
            .filter_map(|account| {
                let entry = lock_entry(account);
                (!entry.evicted).then(|| entry.record.clone())
            })
            .collect()
    }

    /// Queue a snapshot of every live account and retry earlier failures.
    pub fn autosave(&self) -> usize {
        self.persistence.retry_failed();
        let snapshots = self.snapshot_all();
        let count = snapshots.len();
        for record in snapshots {
            self.persistence.save_account(record);
        }
        if count > 0 {
            debug!("autosave queued {} accounts", count);
        }
        count
    }

    /// Persist everything and stop the worker.
    pub async fn shutdown(&self) -> Result<PersistStats, EconomyError> {
        let queued = self.autosave();
        let stats = self.persistence.shutdown().await?;
        if stats.outstanding > 0 {
            warn!(
                "{} writes still failing at shutdown ({} accounts queued)",
                stats.outstanding, queued
            );
        } else {
            info!("all {} live accounts persisted", queued);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::ledger;
    use crate::economy::persistence::{start_persistence_worker, RecordWriter};
    use crate::economy::types::{BoothRecord, Money, Pocket};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use tempfile::TempDir;

    /// Writes through to a real store unless `failing` is set.
    struct FlakyWriter {
        inner: Arc<EconomyStore>,
        failing: AtomicBool,
    }

    impl FlakyWriter {
        fn check(&self) -> Result<(), EconomyError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(EconomyError::PersistenceFailure("disk unavailable".to_string()));
            }
            Ok(())
        }
    }

    impl RecordWriter for FlakyWriter {
        fn put_account(&self, record: AccountRecord) -> Result<(), EconomyError> {
            self.check()?;
            self.inner.put_account(record)
        }

        fn put_booth(&self, record: BoothRecord) -> Result<(), EconomyError> {
            self.check()?;
            self.inner.put_booth(record)
        }

        fn remove_booth(&self, id: &str) -> Result<bool, EconomyError> {
            self.check()?;
            self.inner.remove_booth(id)
        }
    }

    fn open(dir: &TempDir) -> AccountStore {
        let store = Arc::new(EconomyStore::open(dir.path()).unwrap());
        let handle = start_persistence_worker(store.clone());
        AccountStore::new(store, handle)
    }

    #[tokio::test]
    async fn disconnect_persists_and_reconnect_restores() {
        let dir = TempDir::new().unwrap();
        let accounts = open(&dir);

        accounts.on_connect("alice").unwrap();
        accounts
            .with_account("alice", |record| {
                ledger::credit(record, "gold", Money::from_major(9), Pocket::Bank)
            })
            .unwrap();
        accounts.on_disconnect("alice").unwrap();
        assert!(!accounts.is_loaded("alice"));
        assert!(matches!(
            accounts.with_account("alice", |_| Ok(())),
            Err(EconomyError::AccountNotLoaded(_))
        ));

        let record = accounts.on_connect("alice").unwrap();
        assert_eq!(
            ledger::get_balance(&record, "gold", Pocket::Bank),
            Money::from_major(9)
        );

        accounts.persistence().flush().await.unwrap();
        let stored = accounts.durable_store().find_account("alice").unwrap().unwrap();
        assert_eq!(
            ledger::get_balance(&stored, "gold", Pocket::Bank),
            Money::from_major(9)
        );
    }

    #[tokio::test]
    async fn shutdown_writes_every_live_account() {
        let dir = TempDir::new().unwrap();
        let accounts = open(&dir);
        for id in ["a", "b", "c"] {
            accounts.on_connect(id).unwrap();
        }
        assert_eq!(accounts.snapshot_all().len(), 3);

        let stats = accounts.shutdown().await.unwrap();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(accounts.durable_store().account_count(), 3);
    }

    #[tokio::test]
    async fn failed_writes_stay_pending_until_a_later_autosave() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(EconomyStore::open(dir.path()).unwrap());
        let writer = Arc::new(FlakyWriter {
            inner: store.clone(),
            failing: AtomicBool::new(true),
        });
        let accounts = AccountStore::new(store.clone(), start_persistence_worker(writer.clone()));

        accounts.on_connect("alice").unwrap();
        accounts
            .with_account("alice", |record| {
                ledger::credit(record, "gold", Money::from_major(12), Pocket::Bank)
            })
            .unwrap();
        assert_eq!(accounts.autosave(), 1);
        let stats = accounts.persistence().flush().await.unwrap();
        assert!(stats.write_failures >= 1);
        assert_eq!(stats.outstanding, 1);

        let live = accounts.snapshot("alice").unwrap();
        assert_eq!(
            ledger::get_balance(&live, "gold", Pocket::Bank),
            Money::from_major(12)
        );
        assert!(accounts.persistence().pending_account("alice").is_some());
        assert!(store.find_account("alice").unwrap().is_none());

        writer.failing.store(false, Ordering::SeqCst);
        accounts.autosave();
        let stats = accounts.persistence().flush().await.unwrap();
        assert_eq!(stats.outstanding, 0);
        assert!(accounts.persistence().pending_account("alice").is_none());
        let stored = store.find_account("alice").unwrap().unwrap();
        assert_eq!(
            ledger::get_balance(&stored, "gold", Pocket::Bank),
            Money::from_major(12)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn credits_racing_reconnects_are_never_lost() {
        let dir = TempDir::new().unwrap();
        let accounts = open(&dir);
        accounts.on_connect("alice").unwrap();

        let stop = AtomicBool::new(false);
        let acknowledged = AtomicU64::new(0);
        std::thread::scope(|scope| {
            for _ in 0..3 {
                scope.spawn(|| {
                    while !stop.load(Ordering::SeqCst) {
                        let result = accounts.with_account("alice", |record| {
                            ledger::credit(record, "gold", Money::from_minor(1), Pocket::Bank)
                        });
                        match result {
                            Ok(()) => {
                                acknowledged.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(EconomyError::AccountNotLoaded(_)) => {}
                            Err(other) => panic!("unexpected error: {}", other),
                        }
                    }
                });
            }
            for _ in 0..200 {
                accounts.on_disconnect("alice");
                accounts.on_connect("alice").unwrap();
            }
            stop.store(true, Ordering::SeqCst);
        });

        let record = accounts.snapshot("alice").unwrap();
        assert_eq!(
            ledger::get_balance(&record, "gold", Pocket::Bank),
            Money::from_minor(acknowledged.load(Ordering::SeqCst) as i64)
        );

        accounts.on_disconnect("alice");
        accounts.persistence().flush().await.unwrap();
        let stored = accounts.durable_store().find_account("alice").unwrap().unwrap();
        assert_eq!(stored.bank_balances, record.bank_balances);
    }
}
