//! Secondary index state and maintenance.

use crate::cursor::Direction;
use crate::error::{EngineError, EngineResult};
use crate::key::{resolve_path, Key, KeyPath};
use crate::range::KeyRange;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A secondary index over one store.
///
/// Entries map an index key to the set of primary keys whose documents
/// produce that key. Documents from which no key can be extracted are
/// simply not indexed.
#[derive(Debug, Clone)]
pub(crate) struct Index {
    key_path: KeyPath,
    unique: bool,
    multi_entry: bool,
    entries: BTreeMap<Key, BTreeSet<Key>>,
}

impl Index {
    pub(crate) fn new(key_path: KeyPath, unique: bool, multi_entry: bool) -> Self {
        Self {
            key_path,
            unique,
            multi_entry,
            entries: BTreeMap::new(),
        }
    }

    /// An empty index with the same definition as `other`.
    pub(crate) fn new_like(other: &Index) -> Self {
        Self::new(other.key_path.clone(), other.unique, other.multi_entry)
    }

    /// Index keys a document contributes.
    ///
    /// A multi-entry index over an array value yields one deduplicated key
    /// per valid element; invalid elements are skipped.
    fn keys_for(&self, doc: &Value) -> Vec<Key> {
        if self.multi_entry {
            let path = match &self.key_path {
                KeyPath::Single(path) => path,
                // Normalization rejects multi-entry composites; treat as unindexed.
                KeyPath::Composite(_) => return Vec::new(),
            };
            match resolve_path(doc, path) {
                Some(Value::Array(items)) => {
                    let keys: BTreeSet<Key> =
                        items.iter().filter_map(Key::from_value).collect();
                    keys.into_iter().collect()
                }
                Some(value) => Key::from_value(value).into_iter().collect(),
                None => Vec::new(),
            }
        } else {
            self.key_path.extract(doc).into_iter().collect()
        }
    }

    /// Checks that inserting `doc` under `primary` would not violate
    /// uniqueness, without mutating anything.
    pub(crate) fn check_unique(
        &self,
        store: &str,
        name: &str,
        primary: &Key,
        doc: &Value,
    ) -> EngineResult<()> {
        if !self.unique {
            return Ok(());
        }
        for key in self.keys_for(doc) {
            if let Some(owners) = self.entries.get(&key) {
                if owners.iter().any(|owner| owner != primary) {
                    return Err(EngineError::constraint(format!(
                        "unique index {name} on store {store} already contains key {key}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn insert_doc(&mut self, primary: &Key, doc: &Value) {
        for key in self.keys_for(doc) {
            self.entries.entry(key).or_default().insert(primary.clone());
        }
    }

    pub(crate) fn remove_doc(&mut self, primary: &Key, doc: &Value) {
        for key in self.keys_for(doc) {
            if let Some(owners) = self.entries.get_mut(&key) {
                owners.remove(primary);
                if owners.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Builds the index over existing records, enforcing uniqueness.
    pub(crate) fn build<'a, I>(&mut self, store: &str, name: &str, records: I) -> EngineResult<()>
    where
        I: Iterator<Item = (&'a Key, &'a Value)>,
    {
        for (primary, doc) in records {
            self.check_unique(store, name, primary, doc)?;
            self.insert_doc(primary, doc);
        }
        Ok(())
    }

    /// Ordered `(index key, primary key)` pairs within the range.
    ///
    /// With `unique_keys`, duplicate index keys collapse to the entry with
    /// the lowest primary key.
    pub(crate) fn scan(
        &self,
        range: &KeyRange,
        direction: Direction,
        unique_keys: bool,
    ) -> Vec<(Key, Key)> {
        if range.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for (key, owners) in self.entries.range(range.to_bounds()) {
            if unique_keys {
                if let Some(primary) = owners.iter().next() {
                    out.push((key.clone(), primary.clone()));
                }
            } else {
                for primary in owners {
                    out.push((key.clone(), primary.clone()));
                }
            }
        }
        if direction == Direction::Descending {
            out.reverse();
        }
        out
    }
}
