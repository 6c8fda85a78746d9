//! In-memory implementation of [`LockStore`].
//!
//! [`InMemoryLockStore`] is a first-class backend for tests and for
//! deployments where every competing instance lives in one process. It has
//! the same semantics as the SQLite backend; since there is no database, the
//! injected [`Clock`] is the store clock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::{Clock, SystemClock};
use crate::error::StorageError;
use crate::traits::LockStore;
use crate::types::LockRecord;

/// In-memory implementation of [`LockStore`].
///
/// One mutex guards the whole table, which makes every operation (including
/// the confirmed acquire) atomic with respect to every other.
pub struct InMemoryLockStore {
    records: Mutex<HashMap<String, LockRecord>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLockStore {
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemoryLockStore {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn records(
        &self,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, HashMap<String, LockRecord>>, StorageError> {
        self.records
            .lock()
            .map_err(|_| StorageError::Poisoned(operation))
    }
}

impl Default for InMemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

fn upsert(
    records: &mut HashMap<String, LockRecord>,
    now: i64,
    name: &str,
    holder: &str,
    ttl_secs: u32,
) {
    let expires_at = now + i64::from(ttl_secs) * 1_000;
    match records.get_mut(name) {
        None => {
            records.insert(
                name.to_string(),
                LockRecord {
                    name: name.to_string(),
                    holder: holder.to_string(),
                    acquired_at: now,
                    expires_at,
                },
            );
        }
        Some(rec) if rec.holder == holder || rec.is_expired_at(now) => {
            rec.holder = holder.to_string();
            rec.acquired_at = now;
            rec.expires_at = expires_at;
        }
        Some(_) => {}
    }
}

fn holds(records: &HashMap<String, LockRecord>, now: i64, name: &str, holder: &str) -> bool {
    records
        .get(name)
        .is_some_and(|rec| rec.is_held_by(holder, now))
}

impl LockStore for InMemoryLockStore {
    fn acquire_or_renew(
        &self,
        name: &str,
        holder: &str,
        ttl_secs: u32,
    ) -> Result<(), StorageError> {
        let mut records = self.records("acquire_or_renew")?;
        upsert(&mut records, self.clock.now_ms(), name, holder, ttl_secs);
        Ok(())
    }

    fn has_lock(&self, name: &str, holder: &str) -> Result<bool, StorageError> {
        let records = self.records("has_lock")?;
        Ok(holds(&records, self.clock.now_ms(), name, holder))
    }

    fn acquire(&self, name: &str, holder: &str, ttl_secs: u32) -> Result<bool, StorageError> {
        let mut records = self.records("acquire")?;
        let now = self.clock.now_ms();
        upsert(&mut records, now, name, holder, ttl_secs);
        Ok(holds(&records, now, name, holder))
    }

    fn release(&self, name: &str, holder: &str) -> Result<bool, StorageError> {
        let mut records = self.records("release")?;
        match records.get(name) {
            Some(rec) if rec.holder == holder => {
                records.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn clear_expired(&self, grace_secs: u32) -> Result<usize, StorageError> {
        let mut records = self.records("clear_expired")?;
        let cutoff = self.clock.now_ms() - i64::from(grace_secs) * 1_000;
        let before = records.len();
        records.retain(|_, rec| rec.expires_at >= cutoff);
        Ok(before - records.len())
    }

    fn get(&self, name: &str) -> Result<Option<LockRecord>, StorageError> {
        let records = self.records("get")?;
        Ok(records.get(name).cloned())
    }

    fn list(&self) -> Result<Vec<LockRecord>, StorageError> {
        let records = self.records("list")?;
        let mut all: Vec<LockRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}
