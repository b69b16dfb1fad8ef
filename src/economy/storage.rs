use std::path::Path;

use log::debug;
use sled::IVec;

use crate::economy::errors::EconomyError;
use crate::economy::types::{
    AccountRecord, BoothRecord, ACCOUNT_SCHEMA_VERSION, BOOTH_SCHEMA_VERSION,
};

const TREE_PRIMARY: &str = "economy_primary";
const ACCOUNT_PREFIX: &str = "accounts:";
const BOOTH_PREFIX: &str = "booths:";

/// Sled-backed persistence for account records and the booth registry.
pub struct EconomyStore {
    _db: sled::Db,
    primary: sled::Tree,
}

impl EconomyStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EconomyError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let primary = db.open_tree(TREE_PRIMARY)?;
        debug!("economy store opened at {}", path_ref.display());
        Ok(Self {
            _db: db,
            primary,
        })
    }

    fn account_key(id: &str) -> Vec<u8> {
        format!("{}{}", ACCOUNT_PREFIX, id).into_bytes()
    }

    fn booth_key(id: &str) -> Vec<u8> {
        format!("{}{}", BOOTH_PREFIX, id).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, EconomyError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, EconomyError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    fn flush(&self) -> Result<(), EconomyError> {
        self.primary.flush()?;
        Ok(())
    }

    /// Insert or replace an account record.
    pub fn put_account(&self, mut record: AccountRecord) -> Result<(), EconomyError> {
        record.schema_version = ACCOUNT_SCHEMA_VERSION;
        let bytes = Self::serialize(&record)?;
        self.primary.insert(Self::account_key(&record.id), bytes)?;
        self.flush()
    }

    /// Fetch the durable copy of an account, if one was ever saved.
    pub fn find_account(&self, id: &str) -> Result<Option<AccountRecord>, EconomyError> {
        let Some(bytes) = self.primary.get(Self::account_key(id))? else {
            return Ok(None);
        };
        let record: AccountRecord = Self::deserialize(bytes)?;
        if record.schema_version != ACCOUNT_SCHEMA_VERSION {
            return Err(EconomyError::SchemaMismatch {
                entity: "account",
                expected: ACCOUNT_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(Some(record))
    }

    /// List all stored account ids.
    pub fn list_account_ids(&self) -> Result<Vec<String>, EconomyError> {
        let mut ids = Vec::new();
        for entry in self.primary.scan_prefix(ACCOUNT_PREFIX.as_bytes()) {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(id) = text.strip_prefix(ACCOUNT_PREFIX) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    pub fn account_count(&self) -> usize {
        self.primary.scan_prefix(ACCOUNT_PREFIX.as_bytes()).count()
    }

    pub fn put_booth(&self, mut record: BoothRecord) -> Result<(), EconomyError> {
        record.schema_version = BOOTH_SCHEMA_VERSION;
        let bytes = Self::serialize(&record)?;
        self.primary.insert(Self::booth_key(&record.id), bytes)?;
        self.flush()
    }

    /// Remove a booth record; returns whether one existed.
    pub fn remove_booth(&self, id: &str) -> Result<bool, EconomyError> {
        let existed = self.primary.remove(Self::booth_key(id))?.is_some();
        self.flush()?;
        Ok(existed)
    }

    /// All booth records in registration order.
    pub fn list_booths(&self) -> Result<Vec<BoothRecord>, EconomyError> {
        let mut booths = Vec::new();
        for entry in self.primary.scan_prefix(BOOTH_PREFIX.as_bytes()) {
            let (_, bytes) = entry?;
            let record: BoothRecord = Self::deserialize(bytes)?;
            if record.schema_version != BOOTH_SCHEMA_VERSION {
                return Err(EconomyError::SchemaMismatch {
                    entity: "booth",
                    expected: BOOTH_SCHEMA_VERSION,
                    found: record.schema_version,
                });
            }
            booths.push(record);
        }
        booths.sort_by_key(|b| b.sequence);
        Ok(booths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::ledger;
    use crate::economy::types::{Money, Pocket};
    use tempfile::TempDir;

    #[test]
    fn account_round_trip_and_listing() {
        let dir = TempDir::new().unwrap();
        let store = EconomyStore::open(dir.path()).unwrap();
        assert!(store.find_account("alice").unwrap().is_none());

        let mut record = AccountRecord::new("alice");
        ledger::credit(&mut record, "gold", Money::from_major(5), Pocket::Bank).unwrap();
        store.put_account(record.clone()).unwrap();
        store.put_account(AccountRecord::new("bob")).unwrap();

        assert_eq!(store.find_account("alice").unwrap(), Some(record));
        let mut ids = store.list_account_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["alice", "bob"]);
        assert_eq!(store.account_count(), 2);
    }

    #[test]
    fn booths_list_in_sequence_order() {
        let dir = TempDir::new().unwrap();
        let store = EconomyStore::open(dir.path()).unwrap();
        store.put_booth(BoothRecord::new("zeta", "z", 0)).unwrap();
        store.put_booth(BoothRecord::new("alpha", "a", 1)).unwrap();

        let ids: Vec<_> = store.list_booths().unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["zeta", "alpha"]);
        assert!(store.remove_booth("zeta").unwrap());
        assert!(!store.remove_booth("zeta").unwrap());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = EconomyStore::open(dir.path()).unwrap();
            store.put_account(AccountRecord::new("carol")).unwrap();
        }
        let store = EconomyStore::open(dir.path()).unwrap();
        assert!(store.find_account("carol").unwrap().is_some());
    }
}
