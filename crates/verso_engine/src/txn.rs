//! Transactions: owned handles with explicit commit and abort.
//!
//! A [`Transaction`] holds its database's lock for its whole lifetime, so
//! write transactions are serialized per database and version-change
//! transactions are exclusive. Write modes snapshot the database state up
//! front; `abort` (or dropping an uncommitted transaction) restores the
//! snapshot, making every transaction all-or-nothing.

use crate::cursor::{Cursor, Direction};
use crate::engine::DatabaseState;
use crate::error::{EngineError, EngineResult};
use crate::key::{Key, KeyPath};
use crate::range::KeyRange;
use crate::store::ObjectStore;
use parking_lot::MutexGuard;
use serde_json::Value;
use std::collections::HashMap;

/// The mode a transaction runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and record writes.
    ReadWrite,
    /// Reads, record writes, and schema changes. Only the engine itself
    /// starts version-change transactions, during [`Engine::open`].
    ///
    /// [`Engine::open`]: crate::Engine::open
    VersionChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionStatus {
    Active,
    Committed,
    Aborted,
}

struct UndoState {
    version: u64,
    stores: HashMap<String, ObjectStore>,
}

/// An active transaction against one database.
///
/// All record and schema requests go through a transaction. Dropping a
/// transaction without committing aborts it.
pub struct Transaction<'conn> {
    guard: MutexGuard<'conn, DatabaseState>,
    mode: TransactionMode,
    undo: Option<UndoState>,
    status: TransactionStatus,
}

impl<'conn> Transaction<'conn> {
    pub(crate) fn new(guard: MutexGuard<'conn, DatabaseState>, mode: TransactionMode) -> Self {
        let undo = match mode {
            TransactionMode::ReadOnly => None,
            _ => Some(UndoState {
                version: guard.version,
                stores: guard.stores.clone(),
            }),
        };
        Self {
            guard,
            mode,
            undo,
            status: TransactionStatus::Active,
        }
    }

    pub(crate) fn version_change(
        mut guard: MutexGuard<'conn, DatabaseState>,
        new_version: u64,
    ) -> Self {
        let undo = UndoState {
            version: guard.version,
            stores: guard.stores.clone(),
        };
        guard.version = new_version;
        Self {
            guard,
            mode: TransactionMode::VersionChange,
            undo: Some(undo),
            status: TransactionStatus::Active,
        }
    }

    /// Returns the transaction mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Whether the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    fn ensure_active(&self) -> EngineResult<()> {
        match self.status {
            TransactionStatus::Active => Ok(()),
            TransactionStatus::Committed => Err(EngineError::invalid_state(
                "transaction already committed",
            )),
            TransactionStatus::Aborted => {
                Err(EngineError::invalid_state("transaction already aborted"))
            }
        }
    }

    fn ensure_writable(&self) -> EngineResult<()> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(EngineError::invalid_state(
                "write request in a read-only transaction",
            ));
        }
        Ok(())
    }

    fn ensure_version_change(&self) -> EngineResult<()> {
        if self.mode != TransactionMode::VersionChange {
            return Err(EngineError::invalid_state(
                "schema changes are only legal in a version-change transaction",
            ));
        }
        Ok(())
    }

    fn store_ref(&self, name: &str) -> EngineResult<&ObjectStore> {
        self.guard
            .stores
            .get(name)
            .ok_or_else(|| EngineError::store_not_found(name))
    }

    fn store_mut(&mut self, name: &str) -> EngineResult<&mut ObjectStore> {
        self.guard
            .stores
            .get_mut(name)
            .ok_or_else(|| EngineError::store_not_found(name))
    }

    // ------------------------------------------------------------------
    // Record requests
    // ------------------------------------------------------------------

    /// Returns the first record in the range, via the primary key space or
    /// the named index.
    pub fn get(
        &self,
        store: &str,
        index: Option<&str>,
        range: &KeyRange,
    ) -> EngineResult<Option<Value>> {
        self.ensure_active()?;
        self.store_ref(store)?.get(index, range)
    }

    /// Returns every record in the range in ascending order, up to `limit`.
    pub fn get_all(
        &self,
        store: &str,
        index: Option<&str>,
        range: &KeyRange,
        limit: Option<usize>,
    ) -> EngineResult<Vec<Value>> {
        self.ensure_active()?;
        self.store_ref(store)?.get_all(index, range, limit)
    }

    /// Counts records in the range.
    pub fn count(
        &self,
        store: &str,
        index: Option<&str>,
        range: &KeyRange,
    ) -> EngineResult<usize> {
        self.ensure_active()?;
        self.store_ref(store)?.count(index, range)
    }

    /// Opens a cursor over the range in the given direction.
    ///
    /// `unique_keys` collapses duplicate index keys; it has no effect on
    /// the primary key space.
    pub fn open_cursor(
        &self,
        store: &str,
        index: Option<&str>,
        range: &KeyRange,
        direction: Direction,
        unique_keys: bool,
    ) -> EngineResult<Cursor> {
        self.ensure_active()?;
        let entries = self
            .store_ref(store)?
            .scan(index, range, direction, unique_keys)?;
        Ok(Cursor::new(entries))
    }

    /// Adds a new record, returning it as stored (with any generated key).
    pub fn add(&mut self, store: &str, doc: Value) -> EngineResult<Value> {
        self.ensure_active()?;
        self.ensure_writable()?;
        self.store_mut(store)?.add(doc)
    }

    /// Puts a record unconditionally, returning it as stored.
    pub fn put(&mut self, store: &str, doc: Value) -> EngineResult<Value> {
        self.ensure_active()?;
        self.ensure_writable()?;
        self.store_mut(store)?.put(doc)
    }

    /// Deletes the record at a key, returning it. Deleting a missing key
    /// returns `None` and is not an error.
    pub fn delete(&mut self, store: &str, key: &Key) -> EngineResult<Option<Value>> {
        self.ensure_active()?;
        self.ensure_writable()?;
        Ok(self.store_mut(store)?.delete(key))
    }

    /// Removes every record from the store.
    pub fn clear(&mut self, store: &str) -> EngineResult<()> {
        self.ensure_active()?;
        self.ensure_writable()?;
        self.store_mut(store)?.clear();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Schema introspection
    // ------------------------------------------------------------------

    /// Names of all object stores, sorted.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.guard.stores.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether the named store exists.
    #[must_use]
    pub fn contains_store(&self, name: &str) -> bool {
        self.guard.stores.contains_key(name)
    }

    /// The store's primary key path.
    pub fn key_path(&self, store: &str) -> EngineResult<String> {
        Ok(self.store_ref(store)?.key_path().to_string())
    }

    /// Whether the store auto-increments its primary key.
    pub fn auto_increment(&self, store: &str) -> EngineResult<bool> {
        Ok(self.store_ref(store)?.auto_increment())
    }

    /// Names of the store's indexes, sorted.
    pub fn index_names(&self, store: &str) -> EngineResult<Vec<String>> {
        Ok(self.store_ref(store)?.index_names())
    }

    /// Whether the store has an index of the given name.
    pub fn has_index(&self, store: &str, name: &str) -> EngineResult<bool> {
        Ok(self.store_ref(store)?.has_index(name))
    }

    // ------------------------------------------------------------------
    // Schema changes (version-change mode only)
    // ------------------------------------------------------------------

    /// Creates an object store.
    pub fn create_store(
        &mut self,
        name: &str,
        key_path: &str,
        auto_increment: bool,
    ) -> EngineResult<()> {
        self.ensure_active()?;
        self.ensure_version_change()?;
        if self.guard.stores.contains_key(name) {
            return Err(EngineError::constraint(format!(
                "object store {name} already exists"
            )));
        }
        self.guard
            .stores
            .insert(name.to_string(), ObjectStore::new(name, key_path, auto_increment));
        Ok(())
    }

    /// Deletes an object store and all its records.
    pub fn delete_store(&mut self, name: &str) -> EngineResult<()> {
        self.ensure_active()?;
        self.ensure_version_change()?;
        self.guard
            .stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::store_not_found(name))
    }

    /// Creates an index on a store and builds it over existing records.
    pub fn create_index(
        &mut self,
        store: &str,
        name: &str,
        key_path: KeyPath,
        unique: bool,
        multi_entry: bool,
    ) -> EngineResult<()> {
        self.ensure_active()?;
        self.ensure_version_change()?;
        self.store_mut(store)?
            .create_index(name, key_path, unique, multi_entry)
    }

    /// Deletes an index from a store.
    pub fn delete_index(&mut self, store: &str, name: &str) -> EngineResult<()> {
        self.ensure_active()?;
        self.ensure_version_change()?;
        self.store_mut(store)?.delete_index(name)
    }

    // ------------------------------------------------------------------
    // Terminal calls
    // ------------------------------------------------------------------

    /// Commits the transaction, making its effects durable.
    pub fn commit(mut self) -> EngineResult<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Committed;
        self.undo = None;
        Ok(())
    }

    /// Aborts the transaction, rolling back every effect.
    pub fn abort(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        if let Some(undo) = self.undo.take() {
            self.guard.version = undo.version;
            self.guard.stores = undo.stores;
        }
        self.status = TransactionStatus::Aborted;
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.status == TransactionStatus::Active {
            self.rollback();
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("mode", &self.mode)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
