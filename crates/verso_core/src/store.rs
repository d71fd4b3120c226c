//! The per-collection store facade.

use crate::batch;
use crate::constraint::Constraint;
use crate::error::DbResult;
use crate::query::{run_find, FindOptions};
use crate::schema::CollectionSchema;
use crate::translate::translate;
use serde_json::Value;
use std::sync::Arc;
use verso_engine::{Connection, Key, TransactionMode};

/// Typed access to one collection.
///
/// A `Store` is handed out by [`Database::open`](crate::Database::open) and
/// delegates to the query engine and batch executor. It is cheap to clone;
/// clones share the database connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Connection>,
    schema: Arc<CollectionSchema>,
}

impl Store {
    pub(crate) fn new(conn: Arc<Connection>, schema: Arc<CollectionSchema>) -> Self {
        Self { conn, schema }
    }

    /// The collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// The normalized collection schema.
    #[must_use]
    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// Returns the first record matching the constraints, if any.
    pub fn get(&self, constraints: &[Constraint]) -> DbResult<Option<Value>> {
        let translated = translate(constraints, &self.schema)?;
        let txn = self.conn.begin(TransactionMode::ReadOnly)?;
        let result = txn.get(&self.schema.name, translated.index.as_deref(), &translated.range)?;
        txn.commit()?;
        Ok(result)
    }

    /// Returns every record matching the constraints, in ascending order,
    /// up to `limit`.
    pub fn get_all(
        &self,
        constraints: &[Constraint],
        limit: Option<usize>,
    ) -> DbResult<Vec<Value>> {
        let translated = translate(constraints, &self.schema)?;
        let txn = self.conn.begin(TransactionMode::ReadOnly)?;
        let result = txn.get_all(
            &self.schema.name,
            translated.index.as_deref(),
            &translated.range,
            limit,
        )?;
        txn.commit()?;
        Ok(result)
    }

    /// Counts records matching the constraints.
    pub fn count(&self, constraints: &[Constraint]) -> DbResult<usize> {
        let translated = translate(constraints, &self.schema)?;
        let txn = self.conn.begin(TransactionMode::ReadOnly)?;
        let result = txn.count(
            &self.schema.name,
            translated.index.as_deref(),
            &translated.range,
        )?;
        txn.commit()?;
        Ok(result)
    }

    /// Runs a paginated, filtered, mapped query over one fresh cursor.
    pub fn find(&self, options: &FindOptions) -> DbResult<Vec<Value>> {
        let txn = self.conn.begin(TransactionMode::ReadOnly)?;
        let result = run_find(&txn, &self.schema, options)?;
        txn.commit()?;
        Ok(result)
    }

    /// Inserts one document. Fails with a constraint violation if the
    /// primary key or a unique index key is taken.
    pub fn insert(&self, doc: Value) -> DbResult<Value> {
        Ok(batch::insert_many(&self.conn, &self.schema, vec![doc])?
            .pop()
            .unwrap_or(Value::Null))
    }

    /// Inserts documents atomically: if any one fails, none persist.
    pub fn insert_many(&self, docs: Vec<Value>) -> DbResult<Vec<Value>> {
        batch::insert_many(&self.conn, &self.schema, docs)
    }

    /// Puts one document unconditionally (overwrite or create).
    pub fn update(&self, doc: Value) -> DbResult<Value> {
        Ok(batch::update_many(&self.conn, &self.schema, vec![doc], false)?
            .pop()
            .unwrap_or(Value::Null))
    }

    /// Puts documents atomically.
    pub fn update_many(&self, docs: Vec<Value>) -> DbResult<Vec<Value>> {
        batch::update_many(&self.conn, &self.schema, docs, false)
    }

    /// Shallow-merges one document over the existing record before the put.
    pub fn update_merge(&self, doc: Value) -> DbResult<Value> {
        Ok(batch::update_many(&self.conn, &self.schema, vec![doc], true)?
            .pop()
            .unwrap_or(Value::Null))
    }

    /// Shallow-merges documents atomically.
    pub fn update_merge_many(&self, docs: Vec<Value>) -> DbResult<Vec<Value>> {
        batch::update_many(&self.conn, &self.schema, docs, true)
    }

    /// Inserts or overwrites one document depending on existence.
    pub fn upsert(&self, doc: Value) -> DbResult<Value> {
        Ok(batch::upsert_many(&self.conn, &self.schema, vec![doc])?
            .pop()
            .unwrap_or(Value::Null))
    }

    /// Upserts documents atomically.
    pub fn upsert_many(&self, docs: Vec<Value>) -> DbResult<Vec<Value>> {
        batch::upsert_many(&self.conn, &self.schema, docs)
    }

    /// Removes the record at a primary key, returning it. Removing a
    /// missing key resolves to `None`, not an error.
    pub fn remove(&self, key: impl Into<Key>) -> DbResult<Option<Value>> {
        Ok(
            batch::remove_many(&self.conn, &self.schema, vec![key.into()], None)?
                .pop(),
        )
    }

    /// Removes records by primary key in one transaction. Missing keys
    /// contribute no entry to the result.
    pub fn remove_many<I, K>(&self, keys: I) -> DbResult<Vec<Value>>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        batch::remove_many(&self.conn, &self.schema, keys, None)
    }

    /// Removes every record matching the constraints, returning the
    /// removed records.
    pub fn remove_where(&self, constraints: &[Constraint]) -> DbResult<Vec<Value>> {
        batch::remove_many(&self.conn, &self.schema, Vec::new(), Some(constraints))
    }

    /// Removes every record in the collection.
    pub fn remove_all(&self) -> DbResult<()> {
        batch::remove_all(&self.conn, &self.schema)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.schema.name)
            .finish_non_exhaustive()
    }
}
