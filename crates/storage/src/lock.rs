//! Row lock management for Cinder.
//!
//! Locks are keyed by (table name, row slot). A slot is free when it has no
//! entry, shared while it has readers only and exclusive while a writer owns
//! it. Deleted markers live in the same registry so that lock release and
//! marker cleanup happen atomically.
//!
//! Removing or inserting a row moves every later row of its table by one
//! slot. The table owner reports each move through
//! [`ConcurrencyControl::shift_after_remove`] and
//! [`ConcurrencyControl::shift_after_insert`] while it still holds the table
//! write guard, so locks and markers keep following their rows.

use crate::transaction::TransactionId;
use cinder_core::{EngineConfig, Error, Result};
use hashbrown::{HashMap, HashSet};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Lock type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockType {
    /// Shared lock (read).
    Shared,
    /// Exclusive lock (write).
    Exclusive,
}

type SlotKey = (String, usize);

/// Lock state for one row slot.
#[derive(Clone, Debug, Default)]
struct SlotLock {
    /// Transaction holding the write lock, if any.
    writer: Option<TransactionId>,
    /// Transactions holding read locks.
    readers: HashSet<TransactionId>,
    /// Transaction holding the upgradeable read lock, if any.
    upgradeable: Option<TransactionId>,
}

impl SlotLock {
    fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty() && self.upgradeable.is_none()
    }

    fn can_grant_shared(&self, tx: TransactionId) -> bool {
        self.writer.is_none() || self.writer == Some(tx)
    }

    fn can_grant_upgradeable(&self, tx: TransactionId) -> bool {
        self.can_grant_shared(tx) && (self.upgradeable.is_none() || self.upgradeable == Some(tx))
    }

    fn can_grant_exclusive(&self, tx: TransactionId) -> bool {
        // Any reader other than `tx` blocks the upgrade.
        self.can_grant_shared(tx) && self.readers.iter().all(|&r| r == tx)
    }

    fn release(&mut self, tx: TransactionId) {
        if self.writer == Some(tx) {
            self.writer = None;
        }
        if self.upgradeable == Some(tx) {
            self.upgradeable = None;
        }
        self.readers.remove(&tx);
    }
}

#[derive(Debug, Default)]
struct LockRegistry {
    slots: HashMap<SlotKey, SlotLock>,
    /// (table, slot) -> transaction that logically deleted the row.
    deleted: HashMap<SlotKey, TransactionId>,
}

impl LockRegistry {
    fn slot(&mut self, table: &str, slot: usize) -> &mut SlotLock {
        self.slots.entry((table.to_string(), slot)).or_default()
    }

    fn get(&self, table: &str, slot: usize) -> Option<&SlotLock> {
        self.slots.get(&(table.to_string(), slot))
    }
}

/// Re-keys the entries of `table` at or after `from`. Entries `map` sends to
/// `None` are dropped.
fn renumber<T>(
    entries: &mut HashMap<SlotKey, T>,
    table: &str,
    from: usize,
    map: &dyn Fn(usize) -> Option<usize>,
) {
    let keys: Vec<SlotKey> = entries
        .keys()
        .filter(|(name, slot)| name == table && *slot >= from)
        .cloned()
        .collect();
    let moved: Vec<(usize, T)> = keys
        .into_iter()
        .filter_map(|key| entries.remove(&key).map(|entry| (key.1, entry)))
        .collect();
    for (slot, entry) in moved {
        if let Some(slot) = map(slot) {
            entries.insert((table.to_string(), slot), entry);
        }
    }
}

/// Registry of row locks and deleted markers shared by all transactions.
///
/// Every wait happens on a single condition variable that is notified
/// whenever a lock is released.
pub struct ConcurrencyControl {
    state: Mutex<LockRegistry>,
    released: Condvar,
    retry_interval: Duration,
}

impl ConcurrencyControl {
    /// Creates a registry with the default retry interval.
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Creates a registry using the configured retry interval.
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            state: Mutex::new(LockRegistry::default()),
            released: Condvar::new(),
            retry_interval: config.get_lock_retry_interval(),
        }
    }

    /// Returns the interval between write-lock attempts.
    #[inline]
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Acquires a read lock, blocking while another transaction writes the
    /// slot. A no-op when `tx` already owns the write lock.
    pub fn acquire_read_lock(&self, table: &str, slot: usize, tx: TransactionId) {
        let mut state = self.state.lock();
        loop {
            let lock = state.slot(table, slot);
            if lock.writer == Some(tx) {
                return;
            }
            if lock.can_grant_shared(tx) {
                lock.readers.insert(tx);
                tracing::trace!(tx, table, slot, "read lock granted");
                return;
            }
            tracing::trace!(tx, table, slot, "waiting for read lock");
            self.released.wait(&mut state);
        }
    }

    /// Acquires a read lock, giving up after `timeout`.
    pub fn acquire_read_lock_timeout(
        &self,
        table: &str,
        slot: usize,
        tx: TransactionId,
        timeout: Duration,
    ) -> Result<()> {
        let start = Instant::now();
        let mut state = self.state.lock();
        loop {
            let lock = state.slot(table, slot);
            if lock.writer == Some(tx) {
                return Ok(());
            }
            if lock.can_grant_shared(tx) {
                lock.readers.insert(tx);
                tracing::trace!(tx, table, slot, "read lock granted");
                return Ok(());
            }
            let waited = start.elapsed();
            if waited >= timeout {
                tracing::debug!(tx, table, slot, ?waited, "read lock wait timed out");
                return Err(Error::lock_timeout(table, slot, waited));
            }
            self.released.wait_for(&mut state, timeout - waited);
        }
    }

    /// Acquires an upgradeable read lock. At most one transaction holds it
    /// per slot; it coexists with plain readers but not with a foreign writer.
    pub fn acquire_upgradeable_read_lock(&self, table: &str, slot: usize, tx: TransactionId) {
        let mut state = self.state.lock();
        loop {
            let lock = state.slot(table, slot);
            if lock.can_grant_upgradeable(tx) {
                lock.upgradeable = Some(tx);
                lock.readers.insert(tx);
                tracing::trace!(tx, table, slot, "upgradeable read lock granted");
                return;
            }
            tracing::trace!(tx, table, slot, "waiting for upgradeable read lock");
            self.released.wait(&mut state);
        }
    }

    /// Acquires the write lock, retrying until it is granted.
    ///
    /// The lock is granted once no other transaction writes the slot and
    /// `tx` is the only reader, if there is one.
    pub fn acquire_write_lock(&self, table: &str, slot: usize, tx: TransactionId) {
        let mut state = self.state.lock();
        while !self.try_grant_write(&mut state, table, slot, tx) {
            self.released.wait_for(&mut state, self.retry_interval);
        }
    }

    /// Acquires the write lock, giving up after `timeout`.
    pub fn acquire_write_lock_timeout(
        &self,
        table: &str,
        slot: usize,
        tx: TransactionId,
        timeout: Duration,
    ) -> Result<()> {
        let start = Instant::now();
        let mut state = self.state.lock();
        while !self.try_grant_write(&mut state, table, slot, tx) {
            let waited = start.elapsed();
            if waited >= timeout {
                // Drop the entry created for the attempt if nobody holds it.
                if state.get(table, slot).map_or(false, SlotLock::is_free) {
                    state.slots.remove(&(table.to_string(), slot));
                }
                tracing::debug!(tx, table, slot, ?waited, "write lock wait timed out");
                return Err(Error::lock_timeout(table, slot, waited));
            }
            let wait = self.retry_interval.min(timeout - waited);
            self.released.wait_for(&mut state, wait);
        }
        Ok(())
    }

    fn try_grant_write(
        &self,
        state: &mut LockRegistry,
        table: &str,
        slot: usize,
        tx: TransactionId,
    ) -> bool {
        let lock = state.slot(table, slot);
        if lock.can_grant_exclusive(tx) {
            if lock.writer != Some(tx) {
                lock.writer = Some(tx);
                tracing::trace!(tx, table, slot, "write lock granted");
            }
            true
        } else {
            tracing::trace!(tx, table, slot, owner = ?lock.writer, "write lock busy");
            false
        }
    }

    /// Releases `tx`'s write lock on one slot.
    pub fn release_write_lock(&self, table: &str, slot: usize, tx: TransactionId) {
        let mut state = self.state.lock();
        let key = (table.to_string(), slot);
        let emptied = match state.slots.get_mut(&key) {
            Some(lock) if lock.writer == Some(tx) => {
                lock.writer = None;
                lock.is_free()
            }
            _ => return,
        };
        if emptied {
            state.slots.remove(&key);
        }
        self.released.notify_all();
    }

    /// Marks a row as logically deleted by `tx`.
    pub fn mark_row_as_deleted(&self, table: &str, slot: usize, tx: TransactionId) {
        let mut state = self.state.lock();
        state.deleted.insert((table.to_string(), slot), tx);
    }

    /// Returns true if the row is marked deleted by a transaction other than
    /// `checking_tx`.
    pub fn is_row_deleted(&self, table: &str, slot: usize, checking_tx: TransactionId) -> bool {
        self.deleted_by(table, slot)
            .map_or(false, |owner| owner != checking_tx)
    }

    /// Returns the transaction holding the deleted marker on a row.
    pub fn deleted_by(&self, table: &str, slot: usize) -> Option<TransactionId> {
        let state = self.state.lock();
        state.deleted.get(&(table.to_string(), slot)).copied()
    }

    /// Renumbers after the row at `slot` of `table` was removed. Locks and
    /// markers of that slot are dropped and later slots move down by one.
    pub fn shift_after_remove(&self, table: &str, slot: usize) {
        let mut state = self.state.lock();
        let map = |s: usize| if s == slot { None } else { Some(s - 1) };
        renumber(&mut state.slots, table, slot, &map);
        renumber(&mut state.deleted, table, slot, &map);
        tracing::trace!(table, slot, "slots shifted down");
        self.released.notify_all();
    }

    /// Renumbers after a row was inserted at `slot` of `table`. Locks and
    /// markers at or after `slot` move up by one.
    pub fn shift_after_insert(&self, table: &str, slot: usize) {
        let mut state = self.state.lock();
        let map = |s: usize| Some(s + 1);
        renumber(&mut state.slots, table, slot, &map);
        renumber(&mut state.deleted, table, slot, &map);
        tracing::trace!(table, slot, "slots shifted up");
        self.released.notify_all();
    }

    /// Releases every lock held by `tx`, clears its deleted markers and wakes
    /// all waiters.
    pub fn release_locks(&self, tx: TransactionId) {
        let mut state = self.state.lock();
        let before = state.slots.len();
        for lock in state.slots.values_mut() {
            lock.release(tx);
        }
        state.slots.retain(|_, lock| !lock.is_free());
        state.deleted.retain(|_, owner| *owner != tx);
        tracing::trace!(tx, freed = before - state.slots.len(), "released locks");
        self.released.notify_all();
    }

    /// Checks if `tx` holds the write lock on a slot.
    pub fn holds_write_lock(&self, table: &str, slot: usize, tx: TransactionId) -> bool {
        let state = self.state.lock();
        state
            .get(table, slot)
            .map_or(false, |lock| lock.writer == Some(tx))
    }

    /// Checks if `tx` holds a read lock on a slot.
    pub fn holds_read_lock(&self, table: &str, slot: usize, tx: TransactionId) -> bool {
        let state = self.state.lock();
        state
            .get(table, slot)
            .map_or(false, |lock| lock.readers.contains(&tx))
    }

    /// Returns all slots locked by `tx`, sorted by table then slot.
    pub fn locked_slots(&self, tx: TransactionId) -> Vec<(String, usize)> {
        let state = self.state.lock();
        let mut slots: Vec<(String, usize)> = state
            .slots
            .iter()
            .filter(|(_, lock)| {
                lock.writer == Some(tx)
                    || lock.upgradeable == Some(tx)
                    || lock.readers.contains(&tx)
            })
            .map(|(key, _)| key.clone())
            .collect();
        slots.sort();
        slots
    }

    /// Returns the strongest lock currently held on a slot.
    pub fn lock_type(&self, table: &str, slot: usize) -> Option<LockType> {
        let state = self.state.lock();
        let lock = state.get(table, slot)?;
        if lock.writer.is_some() {
            Some(LockType::Exclusive)
        } else if !lock.readers.is_empty() {
            Some(LockType::Shared)
        } else {
            None
        }
    }
}

impl Default for ConcurrencyControl {
    fn default() -> Self {
        Self::new()
    }
}
