//! # Verso Core
//!
//! A schema-driven façade over the Verso object-store engine.
//!
//! The raw engine exposes low-level cursors and single-record requests;
//! this crate layers on top of it:
//!
//! - **Schema migration** — declared collections and indexes are
//!   reconciled against the live schema across version upgrades, stepping
//!   through every unit version increment.
//! - **Declarative queries** — field/operator/value constraints compile
//!   into one key range over the primary key space or a single index,
//!   driven by an ordered, paginated, filtered cursor.
//! - **Atomic batches** — insert/update/upsert/remove run inside one
//!   transaction per call; either every document's effect commits or
//!   none does.
//! - **Backup and restore** — full point-in-time snapshots of every
//!   collection.
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use verso_core::{CollectionDefinition, Constraint, Database, Engine, IndexSpec};
//!
//! let engine = Engine::new();
//! let db = Database::new(
//!     engine,
//!     "app",
//!     1,
//!     vec![CollectionDefinition::new("users", "id")
//!         .index(IndexSpec::field("email").unique())],
//! )
//! .unwrap();
//! let stores = db.open().unwrap();
//!
//! let users = &stores["users"];
//! users.insert(json!({"id": 1, "email": "ada@example.com"})).unwrap();
//!
//! let found = users
//!     .get(&[Constraint::eq("email", "ada@example.com")])
//!     .unwrap();
//! assert_eq!(found.unwrap()["id"], json!(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod constraint;
mod database;
mod error;
mod migrate;
mod query;
mod schema;
mod snapshot;
mod store;
mod translate;

pub use constraint::{Constraint, Operator};
pub use database::{Database, OpenState};
pub use error::{DbError, DbResult};
pub use query::{FindOptions, Predicate, Transform};
pub use schema::{CollectionDefinition, CollectionSchema, IndexDefinition, IndexSpec};
pub use snapshot::{CollectionDump, Snapshot};
pub use store::Store;
pub use translate::{translate, TranslatedQuery};

// Engine types callers interact with directly: the engine itself, keys and
// ranges, and the transaction handle upgrade callbacks receive.
pub use verso_engine::{
    Direction, Engine, Key, KeyPath, KeyRange, Transaction, TransactionMode,
};
