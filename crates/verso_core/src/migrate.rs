//! The schema migrator.
//!
//! When the engine reports a version change `(old, new)`, the migrator
//! steps through every unit increment `(v, v+1)` inside the same live
//! version-change transaction. The first step reconciles the declared
//! schema against the live one; every step invokes the caller's upgrade
//! callback with the step's version pair. After the upgrade commits, a
//! post-condition check verifies that everything declared actually
//! exists, failing the open with a [`DbError::Migration`] otherwise.

use crate::error::{DbError, DbResult};
use crate::schema::CollectionSchema;
use std::collections::HashSet;
use tracing::{debug, info};
use verso_engine::Transaction;

/// Drives schema reconciliation and stepped upgrade callbacks.
pub(crate) struct Migrator<'s> {
    collections: &'s [CollectionSchema],
}

impl<'s> Migrator<'s> {
    pub(crate) fn new(collections: &'s [CollectionSchema]) -> Self {
        Self { collections }
    }

    /// Runs the upgrade from `old_version` to `new_version` as unit steps.
    pub(crate) fn run<F>(
        &self,
        txn: &mut Transaction<'_>,
        old_version: u64,
        new_version: u64,
        mut on_upgrade: F,
    ) -> DbResult<()>
    where
        F: FnMut(u64, u64, &mut Transaction<'_>) -> DbResult<()>,
    {
        for version in old_version..new_version {
            debug!("migration step {} -> {}", version, version + 1);
            if version == old_version {
                self.reconcile(txn)?;
            }
            on_upgrade(version, version + 1, txn)?;
        }
        Ok(())
    }

    /// Brings the live schema in line with the declaration.
    ///
    /// Collections are created if absent and reused otherwise. Per
    /// collection, live indexes not in the declared set are removed first,
    /// then declared indexes not yet live are created — removals first so
    /// a renamed index frees its old name before the new definition
    /// claims it. The primary key index is never touched.
    fn reconcile(&self, txn: &mut Transaction<'_>) -> DbResult<()> {
        for schema in self.collections {
            if !txn.contains_store(&schema.name) {
                info!("creating collection {}", schema.name);
                txn.create_store(&schema.name, &schema.primary_key_path, schema.auto_increment)?;
            }

            let declared: HashSet<&str> =
                schema.indexes.iter().map(|index| index.name.as_str()).collect();
            for live in txn.index_names(&schema.name)? {
                if !declared.contains(live.as_str()) {
                    info!("dropping index {} on {}", live, schema.name);
                    txn.delete_index(&schema.name, &live)?;
                }
            }
            for index in &schema.indexes {
                if !txn.has_index(&schema.name, &index.name)? {
                    info!("creating index {} on {}", index.name, schema.name);
                    txn.create_index(
                        &schema.name,
                        &index.name,
                        index.key_path.clone(),
                        index.unique,
                        index.multi_entry,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Post-condition check: everything declared must exist.
    pub(crate) fn verify(&self, txn: &Transaction<'_>) -> DbResult<()> {
        for schema in self.collections {
            if !txn.contains_store(&schema.name) {
                return Err(DbError::migration(format!(
                    "collection {} does not exist; verify the declaration or raise the \
                     database version",
                    schema.name
                )));
            }
            for index in &schema.indexes {
                if !txn.has_index(&schema.name, &index.name)? {
                    return Err(DbError::migration(format!(
                        "index {} does not exist on collection {}; verify the declaration \
                         or raise the database version",
                        index.name, schema.name
                    )));
                }
            }
        }
        Ok(())
    }
}
