//! Transaction management for Cinder.
//!
//! A transaction records an ordered operation log. Inserts reach the table
//! immediately; updates and deletes are deferred and applied when the log is
//! replayed at commit. Rollback replays the log in reverse. Write locks on
//! row slots are held from the moment an operation is logged until the
//! transaction ends.

use crate::database::Database;
use crate::journal::{OperationKind, OperationLog};
use crate::lock::ConcurrencyControl;
use crate::table::Table;
use cinder_core::{EngineConfig, Error, Result, Row, Value};
use core::sync::atomic::{AtomicU64, Ordering};
use hashbrown::{HashMap, HashSet};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Transaction ID type.
pub type TransactionId = u64;

/// An active transaction.
#[derive(Clone, Debug, Default)]
struct Transaction {
    operations: Vec<OperationLog>,
    /// Rows physically inserted by this transaction, by table.
    inserted_rows: Vec<(String, Row)>,
}

/// Registry of active transactions.
pub struct TransactionManager {
    concurrency: Arc<ConcurrencyControl>,
    config: EngineConfig,
    next_id: AtomicU64,
    active: Mutex<HashMap<TransactionId, Transaction>>,
}

impl TransactionManager {
    /// Creates a manager coordinating through `concurrency`.
    pub fn new(concurrency: Arc<ConcurrencyControl>, config: EngineConfig) -> Self {
        Self {
            concurrency,
            config,
            next_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the shared lock registry.
    #[inline]
    pub fn concurrency(&self) -> &Arc<ConcurrencyControl> {
        &self.concurrency
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts a transaction.
    pub fn begin_transaction(&self) -> TransactionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.active.lock().insert(id, Transaction::default());
        tracing::debug!(tx = id, "transaction started");
        id
    }

    /// Returns true while `tx` has neither committed nor rolled back.
    pub fn is_active(&self, tx: TransactionId) -> bool {
        self.active.lock().contains_key(&tx)
    }

    /// Returns the active transaction IDs in ascending order.
    pub fn active_transactions(&self) -> Vec<TransactionId> {
        let mut ids: Vec<TransactionId> = self.active.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns a copy of the operation log of `tx`.
    pub fn operations(&self, tx: TransactionId) -> Result<Vec<OperationLog>> {
        self.active
            .lock()
            .get(&tx)
            .map(|t| t.operations.clone())
            .ok_or_else(|| Error::transaction_not_active(tx))
    }

    fn ensure_active(&self, tx: TransactionId) -> Result<()> {
        if self.is_active(tx) {
            Ok(())
        } else {
            Err(Error::transaction_not_active(tx))
        }
    }

    /// Records a row physically inserted by `tx`, so rollback can remove it
    /// even if logging the insert fails.
    pub fn register_inserted_row(&self, tx: TransactionId, table: &str, row: Row) -> Result<()> {
        let mut active = self.active.lock();
        let transaction = active
            .get_mut(&tx)
            .ok_or_else(|| Error::transaction_not_active(tx))?;
        transaction.inserted_rows.push((table.to_string(), row));
        Ok(())
    }

    /// Acquires the write lock on a row slot for `tx`, honouring the
    /// configured lock timeout.
    pub fn lock_row(&self, tx: TransactionId, table: &str, slot: usize) -> Result<()> {
        match self.config.get_lock_timeout() {
            Some(timeout) => self
                .concurrency
                .acquire_write_lock_timeout(table, slot, tx, timeout),
            None => {
                self.concurrency.acquire_write_lock(table, slot, tx);
                Ok(())
            }
        }
    }

    fn lock_row_shared(&self, tx: TransactionId, table: &str, slot: usize) -> Result<()> {
        match self.config.get_lock_timeout() {
            Some(timeout) => self
                .concurrency
                .acquire_read_lock_timeout(table, slot, tx, timeout),
            None => {
                self.concurrency.acquire_read_lock(table, slot, tx);
                Ok(())
            }
        }
    }

    /// Read-locks the row of `table` whose `column` holds exactly `value`,
    /// so it cannot be deleted before `tx` ends.
    ///
    /// Fails with `Conflict` when another transaction has already marked the
    /// row deleted. A missing row is left to the foreign-key check.
    pub(crate) fn lock_referenced_row(
        &self,
        tx: TransactionId,
        table: &str,
        handle: &RwLock<Table>,
        column: &str,
        value: &Value,
    ) -> Result<()> {
        loop {
            let slot = match handle.read().find_slot(column, value) {
                Some(slot) => slot,
                None => return Ok(()),
            };
            if let Some(owner) = self.concurrency.deleted_by(table, slot) {
                if owner != tx {
                    return Err(Error::conflict(table, value.clone(), owner));
                }
            }
            self.lock_row_shared(tx, table, slot)?;

            let still_there = handle
                .read()
                .row(slot)
                .map_or(false, |row| row.get(column) == Some(value));
            if still_there {
                return Ok(());
            }
            tracing::trace!(tx, table, slot, "referenced row moved while waiting, retrying");
        }
    }

    /// Logs an operation for `tx`, taking the row locks it needs.
    ///
    /// Before-rows are located by primary key. Update and delete lock their
    /// before-rows and a delete also marks them deleted; every after-row is
    /// locked at the slot it occupies or will occupy.
    pub fn log_operation(
        &self,
        tx: TransactionId,
        kind: OperationKind,
        table: &str,
        before: Vec<Row>,
        after: Vec<Row>,
        db: &Database,
    ) -> Result<()> {
        self.ensure_active(tx)?;
        let handle = db.table(table)?;

        if kind == OperationKind::Create {
            let schema = handle.read().schema().clone();
            self.push_operation(tx, OperationLog::create(schema))?;
            tracing::debug!(tx, table, "logged table creation");
            return Ok(());
        }

        let pk = handle.read().primary_key_column().to_string();
        let mut locked = HashSet::new();
        let target = LockTarget {
            table,
            handle: &handle,
            pk: &pk,
        };

        let mut before_images = Vec::with_capacity(before.len());
        for row in &before {
            let key = row.get_or_null(&pk);
            let claim = match kind {
                OperationKind::Delete => Claim::Delete,
                _ if kind.locks_before_images() => Claim::Write,
                _ => Claim::None,
            };
            before_images.push(self.lock_current(tx, &target, key, claim, &mut locked)?);
        }

        let mut after_images = Vec::with_capacity(after.len());
        for (i, row) in after.into_iter().enumerate() {
            if let (OperationKind::Update, Some((slot, current)), Some(given)) =
                (kind, before_images.get(i), before.get(i))
            {
                after_images.push((*slot, rebase(given, current, &row)));
                continue;
            }
            let key = row.get_or_null(&pk);
            let stored = handle.read().find_slot_by_pk(key).is_some();
            let slot = if stored {
                self.lock_current(tx, &target, key, Claim::Write, &mut locked)?.0
            } else {
                let slot = handle.read().len();
                if locked.insert(slot) {
                    self.lock_row(tx, table, slot)?;
                }
                slot
            };
            after_images.push((slot, row));
        }

        tracing::debug!(
            tx,
            table,
            kind = ?kind,
            before = before_images.len(),
            after = after_images.len(),
            "logged operation"
        );
        self.push_operation(
            tx,
            OperationLog::new(kind, table, before_images, after_images),
        )
    }

    /// Resolves the current slot of the row with primary key `key`, applies
    /// `claim` to it, and returns the row as stored once the claim holds.
    /// Retries if the row moves while the lock is awaited.
    ///
    /// The row is verified and marked under the table read guard, so no
    /// slot shift can run in between.
    fn lock_current(
        &self,
        tx: TransactionId,
        target: &LockTarget<'_>,
        key: &Value,
        claim: Claim,
        locked: &mut HashSet<usize>,
    ) -> Result<(usize, Row)> {
        let LockTarget { table, handle, pk } = *target;
        loop {
            let slot = handle
                .read()
                .find_slot_by_pk(key)
                .ok_or_else(|| Error::row_not_found(table, pk, key.clone()))?;
            self.check_not_claimed(tx, table, slot, key)?;

            let lock = claim != Claim::None;
            let held_before = !lock || self.concurrency.holds_write_lock(table, slot, tx);
            if !held_before {
                self.lock_row(tx, table, slot)?;
            }

            let t = handle.read();
            let verified = t.row(slot).filter(|row| row.get(pk) == Some(key)).cloned();
            let outcome = match verified {
                Some(row) => self.check_not_claimed(tx, table, slot, key).map(|()| {
                    if claim == Claim::Delete {
                        self.concurrency.mark_row_as_deleted(table, slot, tx);
                    }
                    Some(row)
                }),
                None => Ok(None),
            };
            drop(t);

            match outcome {
                Ok(Some(row)) => {
                    if lock {
                        locked.insert(slot);
                    }
                    return Ok((slot, row));
                }
                Ok(None) => {
                    tracing::trace!(tx, table, slot, "row moved while waiting, retrying");
                    if !held_before {
                        self.concurrency.release_write_lock(table, slot, tx);
                    }
                }
                Err(err) => {
                    if !held_before {
                        self.concurrency.release_write_lock(table, slot, tx);
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Fails with `Conflict` when another transaction marked the slot deleted.
    fn check_not_claimed(
        &self,
        tx: TransactionId,
        table: &str,
        slot: usize,
        key: &Value,
    ) -> Result<()> {
        match self.concurrency.deleted_by(table, slot) {
            Some(owner) if owner != tx => Err(Error::conflict(table, key.clone(), owner)),
            _ => Ok(()),
        }
    }

    fn push_operation(&self, tx: TransactionId, operation: OperationLog) -> Result<()> {
        let mut active = self.active.lock();
        match active.get_mut(&tx) {
            Some(transaction) => {
                transaction.operations.push(operation);
                Ok(())
            }
            None => {
                drop(active);
                // Ended while this call waited; drop what it acquired.
                self.concurrency.release_locks(tx);
                Err(Error::transaction_not_active(tx))
            }
        }
    }

    /// Returns the rows of `table` visible to `tx`.
    ///
    /// Rows another active transaction inserted, deleted or updated are
    /// hidden, matched by primary key. The caller's own pending updates are
    /// shown with their new values and its own pending deletes are hidden.
    pub fn get_visible_rows(
        &self,
        tx: TransactionId,
        table: &str,
        db: &Database,
    ) -> Result<Vec<Row>> {
        self.ensure_active(tx)?;
        let handle = db.table(table)?;
        let (pk, rows) = {
            let t = handle.read();
            (t.primary_key_column().to_string(), t.rows().to_vec())
        };

        let mut hidden: HashSet<Value> = HashSet::new();
        let mut own_deletes: HashSet<Value> = HashSet::new();
        let mut own_updates: HashMap<Value, Row> = HashMap::new();
        {
            let active = self.active.lock();
            for (&id, transaction) in active.iter() {
                let own = id == tx;
                for op in transaction.operations.iter().filter(|op| op.table() == table) {
                    match op.kind() {
                        OperationKind::Insert if !own => {
                            hidden.extend(keys_of(op.after(), &pk));
                        }
                        OperationKind::Delete if own => {
                            own_deletes.extend(keys_of(op.before(), &pk));
                        }
                        OperationKind::Delete => {
                            hidden.extend(keys_of(op.before(), &pk));
                        }
                        OperationKind::Update if !own => {
                            hidden.extend(keys_of(op.after(), &pk));
                        }
                        OperationKind::Update => {
                            for ((_, old), (_, new)) in op.before().iter().zip(op.after()) {
                                own_updates.insert(old.get_or_null(&pk).clone(), new.clone());
                            }
                        }
                        _ => {}
                    }
                }
                if !own {
                    hidden.extend(
                        transaction
                            .inserted_rows
                            .iter()
                            .filter(|(name, _)| name == table)
                            .map(|(_, r)| r.get_or_null(&pk).clone()),
                    );
                }
            }
        }

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let key = row.get_or_null(&pk);
                if hidden.contains(key) || own_deletes.contains(key) {
                    return None;
                }
                Some(own_updates.get(key).cloned().unwrap_or(row))
            })
            .collect())
    }

    /// Commits `tx`: replays its log in order, then releases its locks.
    ///
    /// Replay is best effort. A step that cannot be applied is logged and
    /// skipped.
    pub fn commit_transaction(&self, tx: TransactionId, db: &Database) -> Result<()> {
        let transaction = self
            .active
            .lock()
            .remove(&tx)
            .ok_or_else(|| Error::transaction_not_active(tx))?;

        for op in &transaction.operations {
            if let Err(err) = self.apply_commit(tx, op, db) {
                tracing::warn!(tx, table = op.table(), error = %err, "skipped commit step");
            }
        }

        self.concurrency.release_locks(tx);
        tracing::info!(tx, operations = transaction.operations.len(), "transaction committed");
        Ok(())
    }

    fn apply_commit(&self, tx: TransactionId, op: &OperationLog, db: &Database) -> Result<()> {
        if op.kind() == OperationKind::Create {
            return Ok(());
        }
        let handle = db.table(op.table())?;
        let mut t = handle.write();

        match op.kind() {
            OperationKind::Delete => {
                for (_, row) in op.before() {
                    let key = t.primary_key_of(row).clone();
                    match t.remove_by_pk(&key) {
                        Some((slot, _)) => self.concurrency.shift_after_remove(op.table(), slot),
                        None => {
                            let table = op.table();
                            tracing::warn!(tx, table, pk = %key, "deleted row already gone");
                        }
                    }
                }
            }
            OperationKind::Update => {
                for ((_, old), (_, new)) in op.before().iter().zip(op.after()) {
                    let key = t.primary_key_of(old).clone();
                    match t.find_slot_by_pk(&key) {
                        Some(slot) => {
                            let merged = t.rows()[slot].merged(new);
                            t.apply_update(slot, merged);
                        }
                        None => {
                            let table = op.table();
                            tracing::warn!(tx, table, pk = %key, "updated row not found");
                        }
                    }
                }
            }
            OperationKind::Insert => {
                for (_, row) in op.after() {
                    let key = t.primary_key_of(row).clone();
                    if t.find_slot_by_pk(&key).is_none() {
                        t.append_row(row.clone());
                    }
                }
            }
            OperationKind::Create => {}
        }
        Ok(())
    }

    /// Rolls back `tx`: releases its locks, undoes its log in reverse and
    /// removes any row it inserted that is still stored.
    pub fn rollback_transaction(&self, tx: TransactionId, db: &Database) -> Result<()> {
        let transaction = self
            .active
            .lock()
            .remove(&tx)
            .ok_or_else(|| Error::transaction_not_active(tx))?;

        self.concurrency.release_locks(tx);

        for op in transaction.operations.iter().rev() {
            if let Err(err) = self.apply_rollback(tx, op, db) {
                tracing::warn!(tx, table = op.table(), error = %err, "skipped rollback step");
            }
        }

        for (table, row) in &transaction.inserted_rows {
            let handle = match db.table(table) {
                Ok(handle) => handle,
                Err(_) => continue,
            };
            let mut t = handle.write();
            if let Some(slot) = t.rows().iter().position(|r| r == row) {
                t.remove_row_at(slot);
                self.concurrency.shift_after_remove(table, slot);
                tracing::debug!(tx, table = table.as_str(), slot, "removed unlogged insert");
            }
        }

        tracing::info!(tx, operations = transaction.operations.len(), "transaction rolled back");
        Ok(())
    }

    fn apply_rollback(&self, tx: TransactionId, op: &OperationLog, db: &Database) -> Result<()> {
        if op.kind() == OperationKind::Create {
            db.remove_table(op.table());
            tracing::debug!(tx, table = op.table(), "dropped table created by transaction");
            return Ok(());
        }
        let handle = db.table(op.table())?;
        let mut t = handle.write();

        match op.kind() {
            OperationKind::Insert => {
                for (_, row) in op.after() {
                    let key = t.primary_key_of(row).clone();
                    if let Some((slot, _)) = t.remove_by_pk(&key) {
                        self.concurrency.shift_after_remove(op.table(), slot);
                    }
                }
            }
            OperationKind::Delete => {
                for (slot, row) in op.before() {
                    let key = t.primary_key_of(row).clone();
                    if t.find_slot_by_pk(&key).is_none() {
                        let slot = t.insert_row_at(*slot, row.clone());
                        self.concurrency.shift_after_insert(op.table(), slot);
                    }
                }
            }
            OperationKind::Update => {
                for ((_, old), (_, new)) in op.before().iter().zip(op.after()) {
                    let slot = t
                        .find_slot_by_pk(t.primary_key_of(new))
                        .or_else(|| t.find_slot_by_pk(t.primary_key_of(old)));
                    if let Some(slot) = slot {
                        let reverted = t.rows()[slot].merged(old);
                        t.apply_update(slot, reverted);
                    }
                }
            }
            OperationKind::Create => {}
        }
        Ok(())
    }
}

/// Table a row claim applies to.
#[derive(Clone, Copy)]
struct LockTarget<'a> {
    table: &'a str,
    handle: &'a RwLock<Table>,
    pk: &'a str,
}

/// What `lock_current` takes on the row it resolves.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Claim {
    None,
    Write,
    Delete,
}

fn keys_of<'a>(images: &'a [(usize, Row)], pk: &'a str) -> impl Iterator<Item = Value> + 'a {
    images.iter().map(move |(_, row)| row.get_or_null(pk).clone())
}

/// Re-applies the changes `given -> after` on top of `current`, the row as
/// stored once the lock is held.
fn rebase(given: &Row, current: &Row, after: &Row) -> Row {
    if given == current {
        return after.clone();
    }
    let changes: Row = after
        .iter()
        .filter(|(column, value)| given.get(column) != Some(*value))
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect();
    current.merged(&changes)
}
