//! The engine registry: named, versioned databases and their connections.

use crate::error::{EngineError, EngineResult};
use crate::store::ObjectStore;
use crate::txn::{Transaction, TransactionMode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared state of one named database.
pub(crate) struct DatabaseState {
    pub(crate) version: u64,
    pub(crate) stores: HashMap<String, ObjectStore>,
    pub(crate) connections: usize,
}

impl DatabaseState {
    fn new() -> Self {
        Self {
            version: 0,
            stores: HashMap::new(),
            connections: 0,
        }
    }
}

#[derive(Default)]
struct EngineInner {
    databases: Mutex<HashMap<String, Arc<Mutex<DatabaseState>>>>,
}

/// The raw object-store engine.
///
/// An `Engine` owns a registry of named databases. Databases are created on
/// first open at version 0 and upgraded through a version-change
/// transaction whenever a higher version is requested. The engine is cheap
/// to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Creates an engine with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a connection to a database at the requested version.
    ///
    /// When the requested version exceeds the stored version, `on_upgrade`
    /// is called once with `(old_version, new_version)` and the live
    /// version-change transaction before any connection is handed out. An
    /// error from the hook aborts the transaction and fails the open,
    /// leaving the database at its previous version.
    ///
    /// # Errors
    ///
    /// - [`EngineError::VersionMismatch`] when the requested version is
    ///   lower than the stored version.
    /// - [`EngineError::Blocked`] when a version change is needed while
    ///   other connections are open. The open fails rather than waiting;
    ///   callers decide whether to retry once the blockers close.
    pub fn open<F, E>(&self, name: &str, version: u64, on_upgrade: F) -> Result<Connection, E>
    where
        F: FnOnce(u64, u64, &mut Transaction<'_>) -> Result<(), E>,
        E: From<EngineError>,
    {
        if version == 0 {
            return Err(EngineError::data("database version must be at least 1").into());
        }
        let db = {
            let mut databases = self.inner.databases.lock();
            Arc::clone(
                databases
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(DatabaseState::new()))),
            )
        };

        let mut state = db.lock();
        if version < state.version {
            let current = state.version;
            return Err(EngineError::version_mismatch(version, current).into());
        }
        if version > state.version {
            if state.connections > 0 {
                return Err(EngineError::blocked(name).into());
            }
            let old = state.version;
            debug!("upgrading database {} from version {} to {}", name, old, version);
            let mut txn = Transaction::version_change(state, version);
            on_upgrade(old, version, &mut txn)?;
            txn.commit().map_err(E::from)?;
            state = db.lock();
        }
        state.connections += 1;
        drop(state);

        debug!("opened connection to database {} at version {}", name, version);
        Ok(Connection {
            name: name.to_string(),
            db,
            closed: AtomicBool::new(false),
        })
    }

    /// Deletes a database and every store in it.
    ///
    /// Deleting a database that does not exist is a no-op. Deletion is
    /// blocked while any connection is open.
    pub fn delete_database(&self, name: &str) -> EngineResult<()> {
        let mut databases = self.inner.databases.lock();
        if let Some(db) = databases.get(name) {
            if db.lock().connections > 0 {
                return Err(EngineError::blocked(name));
            }
            databases.remove(name);
            debug!("deleted database {}", name);
        }
        Ok(())
    }

    /// The stored version of a database, if it exists.
    #[must_use]
    pub fn database_version(&self, name: &str) -> Option<u64> {
        self.inner
            .databases
            .lock()
            .get(name)
            .map(|db| db.lock().version)
    }

    /// Names of all databases in the registry, sorted.
    #[must_use]
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("databases", &self.database_names())
            .finish()
    }
}

/// A live connection to one database.
///
/// Connections hand out transactions and count toward the database's
/// open-connection total, which gates version changes and deletion.
/// Dropping a connection closes it.
pub struct Connection {
    name: String,
    db: Arc<Mutex<DatabaseState>>,
    closed: AtomicBool,
}

impl Connection {
    /// The database name this connection is bound to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// The database version as of this connection.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.db.lock().version
    }

    /// Begins a transaction. One transaction runs at a time per database;
    /// beginning a second one from the same thread deadlocks, so finish
    /// (commit, abort, or drop) each transaction before starting the next.
    pub fn begin(&self, mode: TransactionMode) -> EngineResult<Transaction<'_>> {
        if !self.is_open() {
            return Err(EngineError::Closed);
        }
        if mode == TransactionMode::VersionChange {
            return Err(EngineError::invalid_state(
                "version-change transactions are driven by Engine::open",
            ));
        }
        Ok(Transaction::new(self.db.lock(), mode))
    }

    /// Closes the connection. Closing twice is a no-op.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.db.lock().connections -= 1;
            debug!("closed connection to database {}", self.name);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}
