//! End-to-end tests against the public façade.

use serde_json::{json, Value};
use verso_core::{
    CollectionDefinition, Constraint, Database, DbError, Engine, FindOptions, IndexSpec, Key,
    KeyRange, OpenState, Snapshot,
};

fn users_db(engine: &Engine, name: &str, version: u64) -> Database {
    Database::new(
        engine.clone(),
        name,
        version,
        vec![CollectionDefinition::new("users", "id")
            .index(IndexSpec::field("email").unique())],
    )
    .unwrap()
}

fn ids(docs: &[Value]) -> Vec<i64> {
    docs.iter().map(|d| d["id"].as_i64().unwrap()).collect()
}

#[test]
fn users_scenario() {
    let engine = Engine::new();
    let db = users_db(&engine, "scenario", 1);
    let stores = db.open().unwrap();
    let users = &stores["users"];

    // Insert resolves to the stored document.
    let stored = users.insert(json!({"id": 1, "email": "a@x.com"})).unwrap();
    assert_eq!(stored, json!({"id": 1, "email": "a@x.com"}));

    // A second document reusing the unique email fails and changes nothing.
    let err = users.insert(json!({"id": 2, "email": "a@x.com"})).unwrap_err();
    assert!(matches!(err, DbError::Constraint { .. }));
    assert_eq!(users.count(&[]).unwrap(), 1);

    // Constraint get through the email index.
    let found = users
        .get(&[Constraint::eq("email", "a@x.com")])
        .unwrap()
        .unwrap();
    assert_eq!(found, json!({"id": 1, "email": "a@x.com"}));

    // Bounded find over the primary key space.
    let found = users
        .find(&FindOptions::new().constraint(Constraint::gte("id", 1)).limit(10))
        .unwrap();
    assert_eq!(found, vec![json!({"id": 1, "email": "a@x.com"})]);

    // Remove returns the removed document; the key is then gone.
    let removed = users.remove_many(vec![1i64]).unwrap();
    assert_eq!(removed, vec![json!({"id": 1, "email": "a@x.com"})]);
    assert!(users.get(&[Constraint::eq("id", 1)]).unwrap().is_none());
}

#[test]
fn open_produces_exactly_the_declared_stores() {
    let engine = Engine::new();
    let db = Database::new(
        engine,
        "decl",
        1,
        vec![
            CollectionDefinition::new("users", "id").index("email"),
            CollectionDefinition::new("events", "id")
                .index(IndexSpec::composite(["kind", "at"])),
        ],
    )
    .unwrap();

    let stores = db.open().unwrap();
    let mut names: Vec<&str> = stores.keys().map(String::as_str).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["events", "users"]);
    assert_eq!(db.state(), OpenState::Open);
    assert_eq!(db.name(), "decl");
    assert_eq!(db.version(), 1);

    let users = &stores["users"];
    assert_eq!(users.name(), "users");
    assert_eq!(users.schema().primary_key_path, "id");
}

#[test]
fn reopening_at_same_version_is_idempotent() {
    let engine = Engine::new();
    users_db(&engine, "idem", 1).open().unwrap();

    // A fresh facade over the same engine database, same declaration.
    let db = users_db(&engine, "idem", 1);
    let stores = db.open().unwrap();
    stores["users"]
        .insert(json!({"id": 1, "email": "a@x.com"}))
        .unwrap();
    assert_eq!(stores["users"].count(&[]).unwrap(), 1);
}

#[test]
fn upgrade_invokes_one_step_per_version_increment() {
    let engine = Engine::new();
    users_db(&engine, "steps", 2).open().unwrap();

    let db = users_db(&engine, "steps", 5);
    let mut steps = Vec::new();
    db.open_with(|old, new, _txn| {
        steps.push((old, new));
        Ok(())
    })
    .unwrap();
    assert_eq!(steps, vec![(2, 3), (3, 4), (4, 5)]);
}

#[test]
fn upgrade_callback_writes_through_the_live_transaction() {
    let engine = Engine::new();
    let db = users_db(&engine, "backfill", 1);
    let stores = db.open().unwrap();
    stores["users"]
        .insert(json!({"id": 1, "email": "a@x.com"}))
        .unwrap();
    db.close();

    // A data backfill running inside the upgrade transaction itself.
    let db = users_db(&engine, "backfill", 2);
    db.open_with(|_, _, txn| {
        let docs = txn.get_all("users", None, &KeyRange::unbounded(), None)?;
        for mut doc in docs {
            doc["migrated"] = json!(true);
            txn.put("users", doc)?;
        }
        Ok(())
    })
    .unwrap();

    let doc = db
        .collection("users")
        .unwrap()
        .get(&[Constraint::eq("id", 1)])
        .unwrap()
        .unwrap();
    assert_eq!(doc["migrated"], json!(true));
}

#[test]
fn batch_failure_leaves_collection_untouched() {
    let engine = Engine::new();
    let db = users_db(&engine, "atomic", 1);
    let stores = db.open().unwrap();
    let users = &stores["users"];

    users.insert(json!({"id": 1, "email": "a@x.com"})).unwrap();

    let err = users
        .insert_many(vec![
            json!({"id": 2, "email": "b@x.com"}),
            json!({"id": 3, "email": "c@x.com"}),
            json!({"id": 4, "email": "a@x.com"}),
        ])
        .unwrap_err();
    assert!(matches!(err, DbError::Constraint { .. }));

    // Re-query: only the original document survived.
    assert_eq!(users.count(&[]).unwrap(), 1);
    assert_eq!(ids(&users.get_all(&[], None).unwrap()), vec![1]);
}

#[test]
fn find_skip_limit_equals_slicing_the_ordered_scan() {
    let engine = Engine::new();
    let db = users_db(&engine, "slice", 1);
    let stores = db.open().unwrap();
    let users = &stores["users"];

    let total = 12i64;
    users
        .insert_many(
            (1..=total)
                .map(|id| json!({"id": id, "email": format!("u{id}@x.com")}))
                .collect(),
        )
        .unwrap();

    let full = ids(&users.find(&FindOptions::new()).unwrap());
    for skip in [0usize, 1, 5, 11, 12, 20] {
        for limit in [0usize, 1, 3, 12, 50] {
            let page = ids(
                &users
                    .find(&FindOptions::new().skip(skip).limit(limit))
                    .unwrap(),
            );
            let expected: Vec<i64> = full
                .iter()
                .copied()
                .skip(skip)
                .take(limit)
                .collect();
            assert_eq!(page, expected, "skip {skip} limit {limit}");
            assert_eq!(
                page.len(),
                limit.min((total as usize).saturating_sub(skip))
            );
        }
    }
}

#[test]
fn find_with_predicate_counts_only_accepted_records() {
    let engine = Engine::new();
    let db = users_db(&engine, "pred", 1);
    let stores = db.open().unwrap();
    let users = &stores["users"];

    users
        .insert_many(
            (1..=10i64)
                .map(|id| json!({"id": id, "email": format!("u{id}@x.com")}))
                .collect(),
        )
        .unwrap();

    let odd = users
        .find(
            &FindOptions::new()
                .predicate(|doc| doc["id"].as_i64().unwrap() % 2 == 1)
                .skip(1)
                .limit(3),
        )
        .unwrap();
    assert_eq!(ids(&odd), vec![3, 5, 7]);
}

#[test]
fn descending_unique_index_scan() {
    let engine = Engine::new();
    let db = Database::new(
        engine,
        "dirs",
        1,
        vec![CollectionDefinition::new("users", "id").index("team")],
    )
    .unwrap();
    let stores = db.open().unwrap();
    let users = &stores["users"];

    users
        .insert_many(vec![
            json!({"id": 1, "team": "red"}),
            json!({"id": 2, "team": "blue"}),
            json!({"id": 3, "team": "red"}),
        ])
        .unwrap();

    // Non-unique index, duplicate keys collapsed, reverse key order.
    let teams = users
        .find(
            &FindOptions::new()
                .constraint(Constraint::gte("team", ""))
                .descending()
                .unique()
                .transform(|doc| doc["team"].clone()),
        )
        .unwrap();
    assert_eq!(teams, vec![json!("red"), json!("blue")]);
}

#[test]
fn composite_index_is_addressed_by_derived_name() {
    let engine = Engine::new();
    let db = Database::new(
        engine,
        "composite",
        1,
        vec![CollectionDefinition::new("events", "id")
            .index(IndexSpec::composite(["kind", "at"]))],
    )
    .unwrap();
    let stores = db.open().unwrap();
    let events = &stores["events"];

    events
        .insert_many(vec![
            json!({"id": 1, "kind": "click", "at": 5}),
            json!({"id": 2, "kind": "click", "at": 3}),
            json!({"id": 3, "kind": "view", "at": 1}),
        ])
        .unwrap();

    let clicks = events
        .get_all(
            &[Constraint::eq(
                "kind-at",
                Key::Array(vec![Key::from("click"), Key::from(3)]),
            )],
            None,
        )
        .unwrap();
    assert_eq!(ids(&clicks), vec![2]);

    // Constraints on an unknown field name the missing index.
    let err = events.get(&[Constraint::eq("kind", "click")]).unwrap_err();
    assert!(matches!(err, DbError::IndexNotFound { .. }));
}

#[test]
fn backup_then_restore_reproduces_documents() {
    let engine = Engine::new();
    let db = users_db(&engine, "source", 2);
    let stores = db.open().unwrap();
    stores["users"]
        .insert_many(vec![
            json!({"id": 1, "email": "a@x.com"}),
            json!({"id": 2, "email": "b@x.com"}),
        ])
        .unwrap();

    let snapshot = db.backup().unwrap();
    assert_eq!(snapshot.name, "source");
    assert_eq!(snapshot.version, 2);
    assert_eq!(snapshot.doc_count(), 2);
    // RFC 3339 / ISO-8601 timestamp.
    assert!(chrono::DateTime::parse_from_rfc3339(&snapshot.date).is_ok());

    let target = users_db(&engine, "target", 2);
    let target_stores = target.open().unwrap();
    target.restore(&snapshot).unwrap();

    let mut restored = ids(&target_stores["users"].get_all(&[], None).unwrap());
    restored.sort_unstable();
    assert_eq!(restored, vec![1, 2]);
}

#[test]
fn snapshot_survives_a_file_round_trip() {
    let engine = Engine::new();
    let db = users_db(&engine, "file", 1);
    let stores = db.open().unwrap();
    stores["users"]
        .insert(json!({"id": 1, "email": "a@x.com"}))
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.backup.json");
    db.backup().unwrap().write_to_file(&path).unwrap();

    let snapshot = Snapshot::read_from_file(&path).unwrap();
    assert_eq!(snapshot.doc_count(), 1);

    let target = users_db(&engine, "file_target", 1);
    target.open().unwrap();
    target.restore(&snapshot).unwrap();
    assert_eq!(
        target.collection("users").unwrap().count(&[]).unwrap(),
        1
    );
}

#[test]
fn restore_naming_unknown_collection_fails() {
    let engine = Engine::new();
    let db = users_db(&engine, "unknown", 1);
    db.open().unwrap();

    let mut snapshot = db.backup().unwrap();
    snapshot.collections[0].name = "ghosts".to_string();
    let err = db.restore(&snapshot).unwrap_err();
    assert!(matches!(err, DbError::CollectionNotFound { .. }));
}

#[test]
fn upgrade_blocked_by_open_connection_fails() {
    let engine = Engine::new();
    let held = users_db(&engine, "blocked", 1);
    held.open().unwrap();

    let upgrading = users_db(&engine, "blocked", 2);
    let err = upgrading.open().unwrap_err();
    assert!(matches!(err, DbError::Blocked));
    assert_eq!(upgrading.state(), OpenState::Failed);

    // Once the blocker closes, a fresh facade can upgrade.
    held.close();
    let retry = users_db(&engine, "blocked", 2);
    retry.open().unwrap();
    assert_eq!(retry.state(), OpenState::Open);
}

#[test]
fn migration_failure_prevents_reaching_open() {
    let engine = Engine::new();
    let db = users_db(&engine, "failing", 1);
    let err = db
        .open_with(|_, _, _| Err(DbError::migration("refused")))
        .unwrap_err();
    assert!(matches!(err, DbError::Migration { .. }));
    assert_eq!(db.state(), OpenState::Failed);
    assert!(db.collection("users").is_none());

    // Readiness resolved once, to Failed; a second open does not retry.
    assert!(db.open().is_err());
}

#[test]
fn missing_declared_index_fails_verification() {
    let engine = Engine::new();

    // Version 1 creates only the collection.
    Database::new(
        engine.clone(),
        "drift",
        1,
        vec![CollectionDefinition::new("users", "id")],
    )
    .unwrap()
    .open()
    .unwrap();

    // The declaration now expects an index, but the version was not
    // raised, so no upgrade transaction runs to create it.
    let db = users_db(&engine, "drift", 1);
    let err = db.open().unwrap_err();
    assert!(matches!(err, DbError::Migration { .. }));
    assert_eq!(db.state(), OpenState::Failed);

    // Raising the version lets reconciliation create the index.
    let db = users_db(&engine, "drift", 2);
    db.open().unwrap();
    assert_eq!(db.state(), OpenState::Open);
}

#[test]
fn remove_on_missing_key_resolves_empty() {
    let engine = Engine::new();
    let db = users_db(&engine, "missing", 1);
    let stores = db.open().unwrap();

    assert!(stores["users"].remove(42i64).unwrap().is_none());
    assert!(stores["users"].remove_many(vec![1i64, 2, 3]).unwrap().is_empty());
}

#[test]
fn remove_where_deletes_through_the_translator() {
    let engine = Engine::new();
    let db = users_db(&engine, "where", 1);
    let stores = db.open().unwrap();
    let users = &stores["users"];

    users
        .insert_many(
            (1..=5i64)
                .map(|id| json!({"id": id, "email": format!("u{id}@x.com")}))
                .collect(),
        )
        .unwrap();

    let removed = users
        .remove_where(&[Constraint::gt("id", 2), Constraint::lte("id", 4)])
        .unwrap();
    assert_eq!(ids(&removed), vec![3, 4]);
    assert_eq!(ids(&users.get_all(&[], None).unwrap()), vec![1, 2, 5]);
}

#[test]
fn remove_collection_detaches_and_clears() {
    let engine = Engine::new();
    let db = users_db(&engine, "detach", 1);
    let stores = db.open().unwrap();
    stores["users"]
        .insert(json!({"id": 1, "email": "a@x.com"}))
        .unwrap();

    db.remove_collection("users").unwrap();
    assert!(db.collection("users").is_none());

    let err = db.remove_collection("users").unwrap_err();
    assert!(matches!(err, DbError::CollectionNotFound { .. }));
}

#[test]
fn delete_database_destroys_everything() {
    let engine = Engine::new();
    let db = users_db(&engine, "doomed", 1);
    let stores = db.open().unwrap();
    stores["users"]
        .insert(json!({"id": 1, "email": "a@x.com"}))
        .unwrap();

    db.delete().unwrap();

    // Reopening starts from scratch.
    let db = users_db(&engine, "doomed", 1);
    let stores = db.open().unwrap();
    assert_eq!(stores["users"].count(&[]).unwrap(), 0);
}

#[test]
fn auto_increment_collection_assigns_keys_through_the_facade() {
    let engine = Engine::new();
    let db = Database::new(
        engine,
        "logs",
        1,
        vec![CollectionDefinition::new("entries", "seq").auto_increment()],
    )
    .unwrap();
    let stores = db.open().unwrap();
    let entries = &stores["entries"];

    let first = entries.insert(json!({"message": "hello"})).unwrap();
    let second = entries.insert(json!({"message": "world"})).unwrap();
    assert_eq!(first["seq"], json!(1));
    assert_eq!(second["seq"], json!(2));

    // Upsert without a key also relies on the generator.
    let third = entries.upsert(json!({"message": "again"})).unwrap();
    assert_eq!(third["seq"], json!(3));
}

mod find_slicing_property {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn find_page_equals_scan_slice(
            total in 0i64..25,
            skip in 0usize..30,
            limit in 0usize..30,
        ) {
            let engine = Engine::new();
            let db = users_db(&engine, "prop", 1);
            let stores = db.open().unwrap();
            let users = &stores["users"];
            users
                .insert_many(
                    (1..=total)
                        .map(|id| json!({"id": id, "email": format!("u{id}@x.com")}))
                        .collect(),
                )
                .unwrap();

            let full = ids(&users.find(&FindOptions::new()).unwrap());
            let page = ids(&users.find(&FindOptions::new().skip(skip).limit(limit)).unwrap());
            let expected: Vec<i64> = full.iter().copied().skip(skip).take(limit).collect();
            prop_assert_eq!(&page, &expected);
            prop_assert_eq!(page.len(), limit.min((total as usize).saturating_sub(skip)));
        }
    }
}
