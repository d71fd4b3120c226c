//! The transactional batch executor.
//!
//! Every batch call runs inside one engine transaction scoped to its
//! collection: either every operation's effect commits or none does.
//! Validation that needs no store state (primary key presence, document
//! shape) happens before any write is attempted. A failing operation
//! propagates its error after the transaction rolls back, so the
//! collection is left exactly as it was before the call.

use crate::error::{DbError, DbResult};
use crate::schema::CollectionSchema;
use crate::translate::translate;
use crate::constraint::Constraint;
use serde_json::Value;
use tracing::debug;
use verso_engine::{extract_key, Connection, Direction, Key, KeyRange, TransactionMode};

/// Inserts documents, failing on any duplicate primary key or unique
/// index violation. Returns the documents as stored.
pub(crate) fn insert_many(
    conn: &Connection,
    schema: &CollectionSchema,
    docs: Vec<Value>,
) -> DbResult<Vec<Value>> {
    validate_docs(schema, &docs, !schema.auto_increment)?;
    debug!("inserting {} documents into {}", docs.len(), schema.name);

    let mut txn = conn.begin(TransactionMode::ReadWrite)?;
    let mut results = Vec::with_capacity(docs.len());
    for doc in docs {
        results.push(txn.add(&schema.name, doc)?);
    }
    txn.commit()?;
    Ok(results)
}

/// Puts documents unconditionally. With `merge`, each document is
/// shallow-merged over the existing record at its key before the put.
pub(crate) fn update_many(
    conn: &Connection,
    schema: &CollectionSchema,
    docs: Vec<Value>,
    merge: bool,
) -> DbResult<Vec<Value>> {
    // Put requires the key even on auto-increment collections; an update
    // without identity would silently become an insert of a new record.
    validate_docs(schema, &docs, true)?;
    debug!("updating {} documents in {}", docs.len(), schema.name);

    let mut txn = conn.begin(TransactionMode::ReadWrite)?;
    let mut results = Vec::with_capacity(docs.len());
    for doc in docs {
        let doc = if merge {
            match primary_key(schema, &doc) {
                Some(key) => match txn.get(&schema.name, None, &KeyRange::only(key))? {
                    Some(existing) => shallow_merge(existing, doc),
                    None => doc,
                },
                None => doc,
            }
        } else {
            doc
        };
        results.push(txn.put(&schema.name, doc)?);
    }
    txn.commit()?;
    Ok(results)
}

/// Inserts or overwrites each document depending on whether a record
/// already exists at its primary key.
pub(crate) fn upsert_many(
    conn: &Connection,
    schema: &CollectionSchema,
    docs: Vec<Value>,
) -> DbResult<Vec<Value>> {
    validate_docs(schema, &docs, !schema.auto_increment)?;
    debug!("upserting {} documents into {}", docs.len(), schema.name);

    let mut txn = conn.begin(TransactionMode::ReadWrite)?;
    let mut results = Vec::with_capacity(docs.len());
    for doc in docs {
        let stored = match primary_key(schema, &doc) {
            Some(key) => {
                let exists = txn
                    .get(&schema.name, None, &KeyRange::only(key))?
                    .is_some();
                if exists {
                    txn.put(&schema.name, doc)?
                } else {
                    txn.add(&schema.name, doc)?
                }
            }
            // No key: the collection auto-increments (validated above).
            None => txn.add(&schema.name, doc)?,
        };
        results.push(stored);
    }
    txn.commit()?;
    Ok(results)
}

/// Removes records by explicit keys and/or one constraint set, in one
/// transaction. Each removed record is read first and returned; keys that
/// match nothing contribute no entry.
pub(crate) fn remove_many(
    conn: &Connection,
    schema: &CollectionSchema,
    keys: Vec<Key>,
    constraints: Option<&[Constraint]>,
) -> DbResult<Vec<Value>> {
    let mut txn = conn.begin(TransactionMode::ReadWrite)?;

    let mut targets = keys;
    if let Some(constraints) = constraints {
        let translated = translate(constraints, schema)?;
        let cursor = txn.open_cursor(
            &schema.name,
            translated.index.as_deref(),
            &translated.range,
            Direction::Ascending,
            false,
        )?;
        for (_key, doc) in cursor {
            if let Some(primary) = primary_key(schema, &doc) {
                targets.push(primary);
            }
        }
    }
    debug!("removing {} keys from {}", targets.len(), schema.name);

    let mut results = Vec::new();
    for key in &targets {
        if let Some(doc) = txn.delete(&schema.name, key)? {
            results.push(doc);
        }
    }
    txn.commit()?;
    Ok(results)
}

/// Removes every record in the collection.
pub(crate) fn remove_all(conn: &Connection, schema: &CollectionSchema) -> DbResult<()> {
    let mut txn = conn.begin(TransactionMode::ReadWrite)?;
    txn.clear(&schema.name)?;
    txn.commit()?;
    Ok(())
}

fn primary_key(schema: &CollectionSchema, doc: &Value) -> Option<Key> {
    extract_key(doc, &schema.primary_key_path)
}

/// Checks document shape (and key presence when required) before any
/// write is attempted.
fn validate_docs(schema: &CollectionSchema, docs: &[Value], require_key: bool) -> DbResult<()> {
    for doc in docs {
        if !doc.is_object() {
            return Err(DbError::validation(format!(
                "documents for collection {} must be JSON objects",
                schema.name
            )));
        }
        if require_key && primary_key(schema, doc).is_none() {
            return Err(DbError::validation(format!(
                "document is missing primary key {} required by collection {}",
                schema.primary_key_path, schema.name
            )));
        }
    }
    Ok(())
}

/// Shallow merge: top-level fields of `patch` win over `base`.
fn shallow_merge(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            for (field, value) in patch {
                base.insert(field, value);
            }
            Value::Object(base)
        }
        (_, patch) => patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionDefinition, IndexSpec};
    use crate::migrate::Migrator;
    use serde_json::json;

    fn users_schema() -> CollectionSchema {
        CollectionSchema::normalize(
            CollectionDefinition::new("users", "id").index(IndexSpec::field("email").unique()),
        )
        .unwrap()
    }

    fn open(schema: &CollectionSchema) -> (verso_engine::Engine, Connection) {
        let engine = verso_engine::Engine::new();
        let collections = std::slice::from_ref(schema);
        let conn = engine
            .open::<_, DbError>("batch", 1, |old, new, txn| {
                Migrator::new(collections).run(txn, old, new, |_, _, _| Ok(()))
            })
            .unwrap();
        (engine, conn)
    }

    fn count(conn: &Connection, schema: &CollectionSchema) -> usize {
        let txn = conn.begin(TransactionMode::ReadOnly).unwrap();
        txn.count(&schema.name, None, &KeyRange::unbounded()).unwrap()
    }

    #[test]
    fn insert_many_is_atomic_on_duplicate_primary_key() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        let err = insert_many(
            &conn,
            &schema,
            vec![
                json!({"id": 1, "email": "a@x.com"}),
                json!({"id": 2, "email": "b@x.com"}),
                json!({"id": 1, "email": "c@x.com"}),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Constraint { .. }));
        assert_eq!(count(&conn, &schema), 0);
    }

    #[test]
    fn insert_many_is_atomic_on_unique_index_violation() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        insert_many(&conn, &schema, vec![json!({"id": 1, "email": "a@x.com"})]).unwrap();
        let err = insert_many(
            &conn,
            &schema,
            vec![
                json!({"id": 2, "email": "b@x.com"}),
                json!({"id": 3, "email": "a@x.com"}),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Constraint { .. }));
        assert_eq!(count(&conn, &schema), 1);
    }

    #[test]
    fn insert_requires_primary_key_before_any_write() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        let err = insert_many(
            &conn,
            &schema,
            vec![
                json!({"id": 1, "email": "a@x.com"}),
                json!({"email": "keyless@x.com"}),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
        // Validation happens before the transaction touches the store.
        assert_eq!(count(&conn, &schema), 0);
    }

    #[test]
    fn update_puts_unconditionally() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        // No prior record required.
        update_many(&conn, &schema, vec![json!({"id": 1, "email": "a@x.com"})], false).unwrap();
        // And an existing record is overwritten.
        update_many(&conn, &schema, vec![json!({"id": 1, "email": "b@x.com"})], false).unwrap();

        let txn = conn.begin(TransactionMode::ReadOnly).unwrap();
        let doc = txn
            .get("users", None, &KeyRange::only(Key::from(1)))
            .unwrap()
            .unwrap();
        assert_eq!(doc, json!({"id": 1, "email": "b@x.com"}));
    }

    #[test]
    fn update_requires_primary_key() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        let err =
            update_many(&conn, &schema, vec![json!({"email": "a@x.com"})], false).unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
    }

    #[test]
    fn merge_update_keeps_unmentioned_fields() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        insert_many(
            &conn,
            &schema,
            vec![json!({"id": 1, "email": "a@x.com", "name": "Ada"})],
        )
        .unwrap();
        let merged = update_many(
            &conn,
            &schema,
            vec![json!({"id": 1, "email": "new@x.com"})],
            true,
        )
        .unwrap();
        assert_eq!(
            merged[0],
            json!({"id": 1, "email": "new@x.com", "name": "Ada"})
        );
    }

    #[test]
    fn merge_update_without_existing_record_is_a_plain_put() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        let merged = update_many(
            &conn,
            &schema,
            vec![json!({"id": 9, "email": "solo@x.com"})],
            true,
        )
        .unwrap();
        assert_eq!(merged[0], json!({"id": 9, "email": "solo@x.com"}));
    }

    #[test]
    fn upsert_branches_on_existence() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        upsert_many(&conn, &schema, vec![json!({"id": 1, "email": "a@x.com"})]).unwrap();
        upsert_many(&conn, &schema, vec![json!({"id": 1, "email": "b@x.com"})]).unwrap();
        assert_eq!(count(&conn, &schema), 1);

        let txn = conn.begin(TransactionMode::ReadOnly).unwrap();
        let doc = txn
            .get("users", None, &KeyRange::only(Key::from(1)))
            .unwrap()
            .unwrap();
        assert_eq!(doc["email"], json!("b@x.com"));
    }

    #[test]
    fn upsert_failure_aborts_the_whole_call() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        insert_many(&conn, &schema, vec![json!({"id": 1, "email": "a@x.com"})]).unwrap();

        // Second doc collides on the unique email of record 1.
        let err = upsert_many(
            &conn,
            &schema,
            vec![
                json!({"id": 2, "email": "b@x.com"}),
                json!({"id": 3, "email": "a@x.com"}),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Constraint { .. }));
        assert_eq!(count(&conn, &schema), 1);
    }

    #[test]
    fn upsert_without_key_requires_auto_increment() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);
        let err = upsert_many(&conn, &schema, vec![json!({"email": "a@x.com"})]).unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));

        let logs = CollectionSchema::normalize(
            CollectionDefinition::new("logs", "seq").auto_increment(),
        )
        .unwrap();
        let (_engine, conn) = open(&logs);
        let stored = upsert_many(&conn, &logs, vec![json!({"message": "hi"})]).unwrap();
        assert_eq!(stored[0]["seq"], json!(1));
    }

    #[test]
    fn remove_returns_removed_docs_and_skips_missing_keys() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        insert_many(
            &conn,
            &schema,
            vec![
                json!({"id": 1, "email": "a@x.com"}),
                json!({"id": 2, "email": "b@x.com"}),
            ],
        )
        .unwrap();

        let removed = remove_many(
            &conn,
            &schema,
            vec![Key::from(1), Key::from(99)],
            None,
        )
        .unwrap();
        assert_eq!(removed, vec![json!({"id": 1, "email": "a@x.com"})]);
        assert_eq!(count(&conn, &schema), 1);
    }

    #[test]
    fn remove_by_constraint_resolves_through_the_translator() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        insert_many(
            &conn,
            &schema,
            vec![
                json!({"id": 1, "email": "a@x.com"}),
                json!({"id": 2, "email": "b@x.com"}),
                json!({"id": 3, "email": "c@x.com"}),
            ],
        )
        .unwrap();

        let removed = remove_many(
            &conn,
            &schema,
            Vec::new(),
            Some(&[Constraint::gte("id", 2)]),
        )
        .unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(count(&conn, &schema), 1);
    }

    #[test]
    fn remove_all_clears_the_collection() {
        let schema = users_schema();
        let (_engine, conn) = open(&schema);

        insert_many(&conn, &schema, vec![json!({"id": 1, "email": "a@x.com"})]).unwrap();
        remove_all(&conn, &schema).unwrap();
        assert_eq!(count(&conn, &schema), 0);
    }
}
