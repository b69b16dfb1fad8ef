//! Finite booth pool with first-fit assignment.
//!
//! One pool-wide mutex guards both the registry and the assignment map, so a
//! first-fit scan always sees a consistent picture. An account keeps its booth
//! for the whole connection; only `release_booth` (disconnect) or
//! `unregister_booth` frees it.

use crate::economy::capabilities::{Position, RegionPredicate};
use crate::economy::errors::EconomyError;
use crate::economy::types::{Booth, BoothRecord};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct BoothPool {
    /// Registered booths in registration order.
    booths: Vec<Booth>,
    /// account id -> booth id
    assignments: HashMap<String, String>,
    next_sequence: u64,
}

impl BoothPool {
    fn position(&self, booth_id: &str) -> Option<usize> {
        self.booths.iter().position(|b| b.id == booth_id)
    }
}

#[derive(Debug, Default)]
pub struct BoothAllocator {
    pool: Mutex<BoothPool>,
}

impl BoothAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the registry from stored records (sorted by sequence). Nobody is seated.
    pub fn load(records: Vec<BoothRecord>) -> Self {
        let mut records = records;
        records.sort_by_key(|r| r.sequence);
        let next_sequence = records.last().map(|r| r.sequence + 1).unwrap_or(0);
        let booths = records
            .into_iter()
            .map(|r| Booth {
                id: r.id,
                location: r.location,
                occupant: None,
            })
            .collect();
        Self {
            pool: Mutex::new(BoothPool {
                booths,
                assignments: HashMap::new(),
                next_sequence,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoothPool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a booth at the end of the first-fit order; returns its durable record.
    pub fn register_booth(&self, id: &str, location: &str) -> Result<BoothRecord, EconomyError> {
        let mut pool = self.lock();
        if pool.position(id).is_some() {
            return Err(EconomyError::BoothIdConflict(id.to_string()));
        }
        let record = BoothRecord::new(id, location, pool.next_sequence);
        pool.next_sequence += 1;
        pool.booths.push(Booth {
            id: id.to_string(),
            location: location.to_string(),
            occupant: None,
        });
        info!("booth {} registered at {}", id, location);
        Ok(record)
    }

    /// Remove a booth; returns the account that was evicted from it, if any.
    pub fn unregister_booth(&self, id: &str) -> Result<Option<String>, EconomyError> {
        let mut pool = self.lock();
        let index = pool
            .position(id)
            .ok_or_else(|| EconomyError::BoothNotFound(id.to_string()))?;
        let booth = pool.booths.remove(index);
        if let Some(occupant) = &booth.occupant {
            pool.assignments.remove(occupant);
            info!("booth {} unregistered, evicting {}", id, occupant);
        } else {
            info!("booth {} unregistered", id);
        }
        Ok(booth.occupant)
    }

    /// Seat the account at the first free booth, or return the one it already holds.
    pub fn assign_booth(&self, account_id: &str) -> Result<Booth, EconomyError> {
        let mut pool = self.lock();
        if let Some(booth_id) = pool.assignments.get(account_id) {
            if let Some(index) = pool.position(booth_id) {
                return Ok(pool.booths[index].clone());
            }
        }

        let index = pool
            .booths
            .iter()
            .position(|b| b.occupant.is_none())
            .ok_or(EconomyError::AllBoothsOccupied)?;
        pool.booths[index].occupant = Some(account_id.to_string());
        let booth = pool.booths[index].clone();
        pool.assignments
            .insert(account_id.to_string(), booth.id.clone());
        info!("booth {} assigned to {}", booth.id, account_id);
        Ok(booth)
    }

    /// Free the account's booth; returns the booth id it held.
    pub fn release_booth(&self, account_id: &str) -> Option<String> {
        let mut pool = self.lock();
        let booth_id = pool.assignments.remove(account_id)?;
        if let Some(index) = pool.position(&booth_id) {
            pool.booths[index].occupant = None;
        }
        info!("booth {} released by {}", booth_id, account_id);
        Some(booth_id)
    }

    pub fn booth_of(&self, account_id: &str) -> Option<Booth> {
        let pool = self.lock();
        let booth_id = pool.assignments.get(account_id)?;
        pool.position(booth_id).map(|i| pool.booths[i].clone())
    }

    /// Snapshot of every registered booth in first-fit order.
    pub fn list_booths(&self) -> Vec<Booth> {
        self.lock().booths.clone()
    }

    /// Movement hook: entering a bank region seats the account; leaving never releases.
    pub fn on_player_moved(
        &self,
        account_id: &str,
        position: &Position,
        region: &dyn RegionPredicate,
    ) -> Result<Option<Booth>, EconomyError> {
        if !region.in_bank_region(position) {
            return Ok(None);
        }
        if self.booth_of(account_id).is_some() {
            return Ok(None);
        }
        debug!("{} entered bank region in {}", account_id, position.world);
        self.assign_booth(account_id).map(Some)
    }
}
