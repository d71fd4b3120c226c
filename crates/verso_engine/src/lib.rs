//! # Verso Engine
//!
//! The raw object-store engine underneath VersoDB.
//!
//! This crate provides the lowest-level surface the façade builds on:
//! named, versioned databases holding object stores with secondary
//! indexes, addressed through low-level cursors and single-record
//! requests. It knows nothing about schema declarations, declarative
//! queries, or batch semantics — that is `verso_core`'s job.
//!
//! ## Design Principles
//!
//! - Every request runs inside an explicit [`Transaction`] handle with
//!   `commit`/`abort` as terminal calls; dropping an uncommitted
//!   transaction aborts it.
//! - Write transactions are serialized per database; version-change
//!   transactions are exclusive and are the only place schema changes are
//!   legal.
//! - Opening a database at a higher version while other connections are
//!   open fails with [`EngineError::Blocked`] instead of silently
//!   overriding them.
//!
//! ## Example
//!
//! ```rust
//! use verso_engine::{Engine, EngineError, KeyRange, TransactionMode};
//! use serde_json::json;
//!
//! let engine = Engine::new();
//! let conn = engine
//!     .open::<_, EngineError>("inventory", 1, |_old, _new, txn| {
//!         txn.create_store("items", "sku", false)
//!     })
//!     .unwrap();
//!
//! let mut txn = conn.begin(TransactionMode::ReadWrite).unwrap();
//! txn.add("items", json!({"sku": "a-1", "qty": 3})).unwrap();
//! txn.commit().unwrap();
//!
//! let txn = conn.begin(TransactionMode::ReadOnly).unwrap();
//! assert_eq!(txn.count("items", None, &KeyRange::unbounded()).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod engine;
mod error;
mod index;
mod key;
mod range;
mod store;
mod txn;

pub use cursor::{Cursor, Direction};
pub use engine::{Connection, Engine};
pub use error::{EngineError, EngineResult};
pub use key::{extract_key, inject_key, resolve_path, Key, KeyPath};
pub use range::KeyRange;
pub use txn::{Transaction, TransactionMode};
