//! The database facade: lifecycle, readiness, backup and restore.

use crate::error::{DbError, DbResult};
use crate::migrate::Migrator;
use crate::schema::{CollectionDefinition, CollectionSchema};
use crate::snapshot::{CollectionDump, Snapshot};
use crate::store::Store;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use verso_engine::{Connection, Engine, Transaction, TransactionMode};

/// Lifecycle state of a [`Database`].
///
/// The state advances `Closed → Opening → (Upgrading) → Open`; a failed
/// open lands in `Failed`. Each open resolves exactly once, to `Open` or
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenState {
    /// No connection; the initial state, and the state after `close`.
    Closed,
    /// An open is in progress.
    Opening,
    /// An open is running its version-change transaction.
    Upgrading,
    /// The database is ready.
    Open,
    /// The last open failed; see the error it returned.
    Failed,
}

struct LiveState {
    conn: Arc<Connection>,
    stores: HashMap<String, Store>,
}

/// A named, versioned database with a declared schema.
///
/// Construction normalizes the schema declarations; [`open`](Self::open)
/// connects to the engine, runs any pending version upgrade through the
/// schema migrator, verifies the declared schema exists, and hands out
/// one [`Store`] facade per collection.
///
/// Opening the same `Database` concurrently from several threads is not
/// supported; call `open` once and share the stores it returns.
///
/// # Example
///
/// ```rust,ignore
/// let engine = Engine::new();
/// let db = Database::new(engine, "app", 1, vec![
///     CollectionDefinition::new("users", "id").index(IndexSpec::field("email").unique()),
/// ])?;
/// let stores = db.open()?;
/// stores["users"].insert(json!({"id": 1, "email": "a@x.com"}))?;
/// ```
pub struct Database {
    engine: Engine,
    name: String,
    version: u64,
    collections: Vec<Arc<CollectionSchema>>,
    state: RwLock<OpenState>,
    live: RwLock<Option<LiveState>>,
}

impl Database {
    /// Declares a database. The schema is normalized here, once; the
    /// engine is not touched until [`open`](Self::open).
    ///
    /// # Errors
    ///
    /// Returns a [`DbError::Validation`] for a version below 1, duplicate
    /// collection names, or an invalid index declaration.
    pub fn new(
        engine: Engine,
        name: impl Into<String>,
        version: u64,
        definitions: Vec<CollectionDefinition>,
    ) -> DbResult<Self> {
        if version == 0 {
            return Err(DbError::validation("database version must be at least 1"));
        }
        let mut collections = Vec::with_capacity(definitions.len());
        let mut seen = std::collections::HashSet::new();
        for definition in definitions {
            let schema = CollectionSchema::normalize(definition)?;
            if !seen.insert(schema.name.clone()) {
                return Err(DbError::validation(format!(
                    "duplicate collection name {}",
                    schema.name
                )));
            }
            collections.push(Arc::new(schema));
        }
        Ok(Self {
            engine,
            name: name.into(),
            version,
            collections,
            state: RwLock::new(OpenState::Closed),
            live: RwLock::new(None),
        })
    }

    /// The database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> OpenState {
        *self.state.read()
    }

    /// Opens the database without a custom upgrade callback.
    pub fn open(&self) -> DbResult<HashMap<String, Store>> {
        self.open_with(|_, _, _| Ok(()))
    }

    /// Opens the database, migrating through every pending version step.
    ///
    /// `on_upgrade` runs once per unit version increment with the step's
    /// `(old_version, new_version)` pair and the live version-change
    /// transaction, after the declared schema has been reconciled.
    ///
    /// Returns one [`Store`] per declared collection, keyed by name.
    ///
    /// # Errors
    ///
    /// - [`DbError::Blocked`] when another connection holds the database
    ///   at a lower version.
    /// - [`DbError::Migration`] when a declared collection or index is
    ///   missing after the upgrade; the database lands in
    ///   [`OpenState::Failed`] and no store is handed out.
    pub fn open_with<F>(&self, mut on_upgrade: F) -> DbResult<HashMap<String, Store>>
    where
        F: FnMut(u64, u64, &mut Transaction<'_>) -> DbResult<()>,
    {
        {
            let mut state = self.state.write();
            match *state {
                OpenState::Closed => *state = OpenState::Opening,
                OpenState::Opening | OpenState::Upgrading => {
                    return Err(DbError::connection("open already in progress"))
                }
                OpenState::Open => return Err(DbError::connection("database is already open")),
                OpenState::Failed => {
                    return Err(DbError::connection(
                        "a previous open failed; create a new Database to retry",
                    ))
                }
            }
        }

        let schemas: Vec<CollectionSchema> =
            self.collections.iter().map(|s| (**s).clone()).collect();
        let migrator = Migrator::new(&schemas);

        let opened = self.engine.open::<_, DbError>(&self.name, self.version, |old, new, txn| {
            *self.state.write() = OpenState::Upgrading;
            migrator.run(txn, old, new, &mut on_upgrade)
        });
        let conn = match opened {
            Ok(conn) => Arc::new(conn),
            Err(err) => {
                warn!("opening database {} failed: {}", self.name, err);
                *self.state.write() = OpenState::Failed;
                return Err(err);
            }
        };

        // Post-condition: everything declared must now exist.
        let verified = conn
            .begin(TransactionMode::ReadOnly)
            .map_err(DbError::from)
            .and_then(|txn| migrator.verify(&txn));
        if let Err(err) = verified {
            warn!("schema verification for {} failed: {}", self.name, err);
            conn.close();
            *self.state.write() = OpenState::Failed;
            return Err(err);
        }

        let stores: HashMap<String, Store> = self
            .collections
            .iter()
            .map(|schema| {
                (
                    schema.name.clone(),
                    Store::new(Arc::clone(&conn), Arc::clone(schema)),
                )
            })
            .collect();

        *self.live.write() = Some(LiveState {
            conn,
            stores: stores.clone(),
        });
        *self.state.write() = OpenState::Open;
        info!("database {} open at version {}", self.name, self.version);
        Ok(stores)
    }

    /// Closes the connection. Closing a closed database is a no-op.
    pub fn close(&self) {
        if let Some(live) = self.live.write().take() {
            live.conn.close();
            debug!("database {} closed", self.name);
        }
        *self.state.write() = OpenState::Closed;
    }

    /// Closes the connection and deletes the database with every
    /// collection in it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Blocked`] while another connection (for example
    /// from a second `Database` over the same name) is still open.
    pub fn delete(&self) -> DbResult<()> {
        self.close();
        self.engine.delete_database(&self.name)?;
        Ok(())
    }

    /// The store facade for a collection, if the database is open and the
    /// collection is declared.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<Store> {
        self.live.read().as_ref().and_then(|live| live.stores.get(name).cloned())
    }

    /// Detaches a collection: clears its documents in one transaction and
    /// drops its store facade. The underlying store definition persists
    /// until a version upgrade stops declaring it.
    pub fn remove_collection(&self, name: &str) -> DbResult<()> {
        let store = {
            let mut live = self.live.write();
            let live = live.as_mut().ok_or(DbError::Closed)?;
            live.stores
                .remove(name)
                .ok_or_else(|| DbError::collection_not_found(name))?
        };
        store.remove_all()
    }

    /// Dumps every collection into a [`Snapshot`].
    ///
    /// The dump is taken in one read transaction, so it is a consistent
    /// point-in-time view.
    pub fn backup(&self) -> DbResult<Snapshot> {
        let live = self.live.read();
        let live = live.as_ref().ok_or(DbError::Closed)?;

        let txn = live.conn.begin(TransactionMode::ReadOnly)?;
        let mut collections = Vec::with_capacity(self.collections.len());
        for schema in &self.collections {
            if !live.stores.contains_key(&schema.name) {
                continue;
            }
            let docs = txn.get_all(
                &schema.name,
                None,
                &verso_engine::KeyRange::unbounded(),
                None,
            )?;
            collections.push(CollectionDump {
                name: schema.name.clone(),
                docs,
            });
        }
        txn.commit()?;

        Ok(Snapshot {
            name: self.name.clone(),
            version: self.version,
            date: chrono::Utc::now().to_rfc3339(),
            collections,
        })
    }

    /// Re-inserts a snapshot's documents, one transaction per collection.
    ///
    /// The snapshot is not checked against the declared schema. Each
    /// collection restores atomically on its own; there is no atomicity
    /// across collections, so a failure leaves earlier collections
    /// restored. A snapshot naming an unknown collection fails with
    /// [`DbError::CollectionNotFound`] when that collection is reached.
    pub fn restore(&self, snapshot: &Snapshot) -> DbResult<()> {
        info!(
            "restoring {} documents into database {}",
            snapshot.doc_count(),
            self.name
        );
        for dump in &snapshot.collections {
            let store = self
                .collection(&dump.name)
                .ok_or_else(|| DbError::collection_not_found(&dump.name))?;
            store.insert_many(dump.docs.clone())?;
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
